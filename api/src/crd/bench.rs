use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::common::{NamespacedName, ResourceBounds};
use crate::validation::worker_replica_bounds;
use crate::{Quantity, StorageUnit};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[kube(
    group = "vyogo.tech",
    version = "v1alpha1",
    kind = "FrappeBench",
    status = "FrappeBenchStatus",
    shortname = "fb",
    namespaced,
    validation = worker_replica_bounds("default"),
    validation = worker_replica_bounds("long"),
    validation = worker_replica_bounds("short"),
)]
#[serde(rename_all = "camelCase")]
pub struct FrappeBenchSpec {
    pub frappe_version: String,
    #[serde(default)]
    pub apps: Vec<AppSource>,
    /// Deprecated JSON array of app names, e.g. `["erpnext", "hrms"]`.
    #[serde(rename = "appsJSON")]
    pub apps_json: Option<String>,
    pub image_config: Option<ImageConfig>,
    /// Legacy static replica counts.
    pub component_replicas: Option<ComponentReplicas>,
    pub component_resources: Option<ComponentResources>,
    pub redis_config: Option<RedisConfig>,
    pub storage_class_name: Option<String>,
    pub storage_size: Option<Quantity<StorageUnit>>,
    pub domain_config: Option<DomainConfig>,
    pub fpm_config: Option<FpmConfig>,
    pub git_config: Option<GitConfig>,
    pub worker_autoscaling: Option<WorkerAutoscalingConfig>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppSourceKind {
    Fpm,
    Git,
    #[default]
    Image,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppSource {
    pub name: String,
    pub source: AppSourceKind,
    pub version: Option<String>,
    pub org: Option<String>,
    pub git_url: Option<String>,
    pub git_branch: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub repository: Option<String>,
    pub tag: Option<String>,
    pub pull_policy: Option<String>,
    #[serde(default)]
    pub pull_secrets: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReplicas {
    pub gunicorn: Option<i32>,
    pub nginx: Option<i32>,
    pub socketio: Option<i32>,
    pub worker_default: Option<i32>,
    pub worker_long: Option<i32>,
    pub worker_short: Option<i32>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResources {
    pub gunicorn: Option<ResourceBounds>,
    pub nginx: Option<ResourceBounds>,
    pub scheduler: Option<ResourceBounds>,
    pub socketio: Option<ResourceBounds>,
    pub worker_default: Option<ResourceBounds>,
    pub worker_long: Option<ResourceBounds>,
    pub worker_short: Option<ResourceBounds>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RedisKind {
    #[default]
    Redis,
    Dragonfly,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    #[serde(rename = "type", default)]
    pub kind: RedisKind,
    pub image: Option<String>,
    pub max_memory: Option<Quantity<StorageUnit>>,
    pub resources: Option<ResourceBounds>,
    pub storage_size: Option<Quantity<StorageUnit>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    /// Appended to site names, e.g. `.myplatform.com`.
    pub suffix: Option<String>,
    /// Defaults to `true`.
    pub auto_detect: Option<bool>,
    pub ingress_controller_ref: Option<NamespacedName>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct FpmConfig {
    #[serde(default)]
    pub repositories: Vec<FpmRepository>,
    pub default_repo: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FpmRepository {
    pub name: String,
    pub url: String,
    /// Lower is searched first. Defaults to 50.
    pub priority: Option<i32>,
    pub auth_secret_ref: Option<NamespacedName>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GitConfig {
    pub enabled: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkerAutoscalingConfig {
    pub default: Option<WorkerAutoscaling>,
    pub long: Option<WorkerAutoscaling>,
    pub short: Option<WorkerAutoscaling>,
}

/// Scaling settings of one worker pool. Unset fields take the pool's defaults.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerAutoscaling {
    pub enabled: Option<bool>,
    pub static_replicas: Option<i32>,
    pub min_replicas: Option<i32>,
    pub max_replicas: Option<i32>,
    /// Queue length per replica that triggers a scale up.
    pub queue_length: Option<i32>,
    /// Seconds.
    pub cooldown_period: Option<i32>,
    /// Seconds.
    pub polling_interval: Option<i32>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq, Display)]
pub enum BenchPhase {
    #[default]
    Pending,
    Provisioning,
    Ready,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Display, EnumString,
)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadWriteMany,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScalingMode {
    Static,
    Autoscaled,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerScalingStatus {
    pub mode: ScalingMode,
    pub current_replicas: i32,
    pub desired_replicas: i32,
    pub controller_managed: bool,
}

/// Sticky storage decisions for the bench's shared volume.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<AccessMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrappeBenchStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<BenchPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_apps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fpm_repositories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_scaling: Option<BTreeMap<String, WorkerScalingStatus>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl FrappeBench {
    pub fn storage_status(&self) -> Option<&StorageStatus> {
        self.status.as_ref().and_then(|status| status.storage.as_ref())
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| status.phase == Some(BenchPhase::Ready))
    }

    /// App names from `apps`, falling back to the legacy `appsJSON` list.
    pub fn app_names(&self) -> Vec<String> {
        if !self.spec.apps.is_empty() {
            return self.spec.apps.iter().map(|app| app.name.clone()).collect();
        }
        self.spec
            .apps_json
            .as_deref()
            .and_then(|json| serde_json::from_str::<Vec<String>>(json).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench(spec: FrappeBenchSpec) -> FrappeBench {
        FrappeBench::new("erp", spec)
    }

    #[test]
    fn test_app_names_prefers_apps() {
        let bench = bench(FrappeBenchSpec {
            apps: vec![AppSource {
                name: "hrms".into(),
                source: AppSourceKind::Fpm,
                ..Default::default()
            }],
            apps_json: Some(r#"["erpnext"]"#.into()),
            ..Default::default()
        });
        assert_eq!(bench.app_names(), vec!["hrms".to_string()]);
    }

    #[test]
    fn test_app_names_legacy_json() {
        let legacy = bench(FrappeBenchSpec {
            apps_json: Some(r#"["erpnext", "hrms"]"#.into()),
            ..Default::default()
        });
        assert_eq!(legacy.app_names(), vec!["erpnext", "hrms"]);
        let broken = bench(FrappeBenchSpec {
            apps_json: Some("erpnext".into()),
            ..Default::default()
        });
        assert!(broken.app_names().is_empty());
    }

    #[test]
    fn test_status_serialization_omits_unset_fields() {
        let status = FrappeBenchStatus {
            storage: Some(StorageStatus {
                access_mode: Some(AccessMode::ReadWriteMany),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"storage": {"accessMode": "ReadWriteMany"}})
        );
    }

    #[test]
    fn test_wire_names() {
        let spec: FrappeBenchSpec = serde_json::from_value(serde_json::json!({
            "frappeVersion": "version-15",
            "appsJSON": "[]",
            "redisConfig": {"type": "dragonfly"},
            "workerAutoscaling": {"short": {"enabled": true, "maxReplicas": 4}},
        }))
        .unwrap();
        assert_eq!(spec.apps_json.as_deref(), Some("[]"));
        assert_eq!(spec.redis_config.map(|r| r.kind), Some(RedisKind::Dragonfly));
        let short = spec.worker_autoscaling.and_then(|w| w.short).unwrap();
        assert_eq!(short.enabled, Some(true));
        assert_eq!(short.max_replicas, Some(4));
    }
}
