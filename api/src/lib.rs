mod api;
mod client;
mod crd;
mod error;
mod filter_params;
pub mod label;
mod list_stream;
mod meta;
mod quantity;
mod validation;

pub use k8s_openapi;
pub use kube;

pub use api::{Api, Ensured};
pub use client::{Client, ClientBuilder};
pub use crd::*;
pub use error::{ClientBuildError, Error, Result};
pub use filter_params::FilterParams;
pub use label::{FrappeLabel, Labels};
pub use list_stream::{ApiListStreamExt, ListStream, ListStreamItem};
pub use meta::{ObjectMetaExt, ResourceNameExt, ResourceOwnerRefExt};
pub use quantity::{CpuQuantity, CpuUnit, Quantity, StorageQuantity, StorageUnit};

pub mod prelude {
    pub use super::{ApiListStreamExt, ObjectMetaExt, ResourceNameExt, ResourceOwnerRefExt};
    pub use kube::{Resource, ResourceExt};
}
