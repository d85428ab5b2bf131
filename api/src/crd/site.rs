use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::common::{NamespacedName, TlsConfig};
use crate::validation::{site_bench_ref_immutable, site_name_is_hostname};
use crate::{Quantity, StorageUnit};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[kube(
    group = "vyogo.tech",
    version = "v1alpha1",
    kind = "FrappeSite",
    status = "FrappeSiteStatus",
    shortname = "fs",
    selectable = ".spec.siteName",
    namespaced,
    validation = site_name_is_hostname(),
    validation = site_bench_ref_immutable(),
)]
#[serde(rename_all = "camelCase")]
pub struct FrappeSiteSpec {
    pub bench_ref: Option<NamespacedName>,
    /// Must match the host that will receive traffic.
    pub site_name: String,
    pub admin_password_secret_ref: Option<NamespacedName>,
    pub db_config: Option<DatabaseConfig>,
    /// Explicit external domain. Takes precedence over every derived domain.
    pub domain: Option<String>,
    pub tls: Option<TlsConfig>,
    pub ingress_class_name: Option<String>,
    pub ingress: Option<IngressConfig>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DatabaseMode {
    #[default]
    Shared,
    Dedicated,
    External,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// `mariadb` (default), `sqlite` or `postgres`.
    pub provider: Option<String>,
    pub mode: Option<DatabaseMode>,
    /// An existing MariaDB server. Overrides `mode`.
    pub mariadb_ref: Option<NamespacedName>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub storage_size: Option<Quantity<StorageUnit>>,
    /// Required in external mode. Keys: `host`, `port`, `username`, and one of
    /// `password`, `rootPassword` or `root-password`.
    pub connection_secret_ref: Option<NamespacedName>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    /// Defaults to `true`.
    pub enabled: Option<bool>,
    pub class_name: Option<String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub tls: Option<TlsConfig>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq, Display)]
pub enum SitePhase {
    #[default]
    Pending,
    Provisioning,
    Ready,
    Failed,
}

impl SitePhase {
    /// `Ready` is only reachable from `Provisioning` (or itself).
    pub fn can_transition_to(self, next: SitePhase) -> bool {
        match (self, next) {
            (_, SitePhase::Failed) => true,
            (SitePhase::Pending | SitePhase::Failed, SitePhase::Ready) => false,
            _ => true,
        }
    }
}

/// Which rule produced a site's domain.
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Display, EnumString,
)]
pub enum DomainSource {
    #[serde(rename = "explicit")]
    #[strum(serialize = "explicit")]
    Explicit,
    #[serde(rename = "bench-suffix")]
    #[strum(serialize = "bench-suffix")]
    BenchSuffix,
    #[serde(rename = "auto-detected")]
    #[strum(serialize = "auto-detected")]
    AutoDetected,
    #[serde(rename = "sitename-default")]
    #[strum(serialize = "sitename-default")]
    SiteNameDefault,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrappeSiteStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SitePhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bench_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_source: Option<DomainSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_connection_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl FrappeSite {
    pub fn phase(&self) -> SitePhase {
        self.status
            .as_ref()
            .and_then(|status| status.phase)
            .unwrap_or_default()
    }

    pub fn ingress_enabled(&self) -> bool {
        self.spec
            .ingress
            .as_ref()
            .and_then(|ingress| ingress.enabled)
            .unwrap_or(true)
    }

    /// TLS settings from the ingress block, falling back to the site-level block.
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.spec
            .ingress
            .as_ref()
            .and_then(|ingress| ingress.tls.as_ref())
            .or(self.spec.tls.as_ref())
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls().is_some_and(|tls| tls.enabled)
    }
}
