mod bench;
mod common;
mod site;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

pub use bench::*;
pub use common::*;
pub use site::*;

pub const GROUP: &str = "vyogo.tech";

pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![FrappeBench::crd(), FrappeSite::crd()]
}
