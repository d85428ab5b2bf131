//! Worker pool scaling: merges the per-pool configuration tiers and manages
//! the KEDA `ScaledObject` that takes over a pool's replica count.

use frappe_operator::k8s_openapi::api::apps::v1::Deployment;
use frappe_operator::kube::api::{ApiResource, DynamicObject, ListParams};
use frappe_operator::kube::core::GroupVersionKind;
use frappe_operator::prelude::*;
use frappe_operator::{FrappeBench, Labels, ScalingMode, WorkerAutoscaling, WorkerScalingStatus};
use json_patch_macros::{add, patch, put};
use strum::{Display, EnumIter};

use crate::context::Context;
use crate::error::{Error, Result};

const KEDA_GROUP: &str = "keda.sh";
const KEDA_VERSION: &str = "v1alpha1";
const SCALED_OBJECT_KIND: &str = "ScaledObject";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum WorkerType {
    Default,
    Long,
    Short,
}

impl WorkerType {
    /// Replicas when the legacy `componentReplicas` block is present but
    /// leaves this pool unset.
    fn legacy_replicas(self) -> i32 {
        match self {
            Self::Short => 2,
            Self::Long | Self::Default => 1,
        }
    }

    fn defaults(self) -> ResolvedAutoscaling {
        match self {
            Self::Short => ResolvedAutoscaling {
                enabled: true,
                static_replicas: 1,
                min_replicas: 0,
                max_replicas: 10,
                queue_length: 5,
                cooldown_period: 60,
                polling_interval: 15,
            },
            Self::Long => ResolvedAutoscaling {
                enabled: true,
                static_replicas: 1,
                min_replicas: 0,
                max_replicas: 5,
                queue_length: 2,
                cooldown_period: 300,
                polling_interval: 30,
            },
            Self::Default => ResolvedAutoscaling {
                enabled: false,
                static_replicas: 1,
                min_replicas: 1,
                max_replicas: 3,
                queue_length: 5,
                cooldown_period: 300,
                polling_interval: 30,
            },
        }
    }

    pub fn deployment_name(self, bench: &str) -> String {
        format!("{bench}-worker-{self}")
    }
}

/// A pool's scaling configuration with every tier merged in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedAutoscaling {
    pub enabled: bool,
    pub static_replicas: i32,
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub queue_length: i32,
    pub cooldown_period: i32,
    pub polling_interval: i32,
}

impl ResolvedAutoscaling {
    fn fill(defaults: Self, config: &WorkerAutoscaling) -> Self {
        Self {
            enabled: config.enabled.unwrap_or(defaults.enabled),
            static_replicas: config.static_replicas.unwrap_or(defaults.static_replicas),
            min_replicas: config.min_replicas.unwrap_or(defaults.min_replicas),
            max_replicas: config.max_replicas.unwrap_or(defaults.max_replicas),
            queue_length: config.queue_length.unwrap_or(defaults.queue_length),
            cooldown_period: config.cooldown_period.unwrap_or(defaults.cooldown_period),
            polling_interval: config.polling_interval.unwrap_or(defaults.polling_interval),
        }
    }

    pub fn replica_count(&self, controller_available: bool) -> i32 {
        if self.is_controller_managed(controller_available) {
            self.min_replicas
        } else {
            self.static_replicas
        }
    }

    pub fn is_controller_managed(&self, controller_available: bool) -> bool {
        self.enabled && controller_available
    }

    pub fn mode(&self, controller_available: bool) -> ScalingMode {
        if self.is_controller_managed(controller_available) {
            ScalingMode::Autoscaled
        } else {
            ScalingMode::Static
        }
    }
}

fn explicit_config(bench: &FrappeBench, worker: WorkerType) -> Option<&WorkerAutoscaling> {
    let config = bench.spec.worker_autoscaling.as_ref()?;
    match worker {
        WorkerType::Default => config.default.as_ref(),
        WorkerType::Long => config.long.as_ref(),
        WorkerType::Short => config.short.as_ref(),
    }
}

fn legacy_config(bench: &FrappeBench, worker: WorkerType) -> Option<WorkerAutoscaling> {
    let replicas = bench.spec.component_replicas.as_ref()?;
    let configured = match worker {
        WorkerType::Default => replicas.worker_default,
        WorkerType::Long => replicas.worker_long,
        WorkerType::Short => replicas.worker_short,
    };
    Some(WorkerAutoscaling {
        enabled: Some(false),
        static_replicas: Some(
            configured
                .filter(|replicas| *replicas > 0)
                .unwrap_or(worker.legacy_replicas()),
        ),
        ..Default::default()
    })
}

/// Explicit `workerAutoscaling` beats legacy `componentReplicas`, which beats
/// the pool defaults. Unset fields are filled from the pool defaults.
pub fn resolve(bench: &FrappeBench, worker: WorkerType) -> ResolvedAutoscaling {
    let defaults = worker.defaults();
    if let Some(config) = explicit_config(bench, worker) {
        return ResolvedAutoscaling::fill(defaults, config);
    }
    if let Some(config) = legacy_config(bench, worker) {
        return ResolvedAutoscaling::fill(defaults, &config);
    }
    defaults
}

pub fn scaling_status(
    config: &ResolvedAutoscaling,
    controller_available: bool,
    deployment: Option<&Deployment>,
) -> WorkerScalingStatus {
    let managed = config.is_controller_managed(controller_available);
    // The autoscaler owns the replica count of a managed pool.
    let desired = match deployment
        .and_then(|deployment| deployment.spec.as_ref())
        .and_then(|spec| spec.replicas)
    {
        Some(replicas) if managed => replicas,
        _ => config.replica_count(controller_available),
    };
    let current = deployment
        .and_then(|deployment| deployment.status.as_ref())
        .and_then(|status| status.replicas)
        .unwrap_or(0);
    WorkerScalingStatus {
        mode: config.mode(controller_available),
        current_replicas: current,
        desired_replicas: desired,
        controller_managed: managed,
    }
}

/// The patch that brings a live deployment to `desired` replicas, or `None`
/// when nothing should change. Managed deployments are never touched.
pub fn replica_patch(
    deployment: &Deployment,
    desired: i32,
    controller_managed: bool,
) -> Option<json_patch::Patch> {
    if controller_managed {
        return None;
    }
    match deployment.spec.as_ref().and_then(|spec| spec.replicas) {
        Some(live) if live == desired => None,
        Some(live) => Some(patch![
            json_patch_macros::test!(["spec", "replicas"] => live),
            put!(["spec", "replicas"] => desired),
        ]),
        None => Some(patch![add!(["spec", "replicas"] => desired)]),
    }
}

pub fn scaled_object_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(KEDA_GROUP, KEDA_VERSION, SCALED_OBJECT_KIND),
        "scaledobjects",
    )
}

pub fn scaled_object(
    bench: &FrappeBench,
    worker: WorkerType,
    config: &ResolvedAutoscaling,
    labels: Labels,
) -> Result<DynamicObject> {
    let bench_name = bench.name()?;
    let namespace = bench.require_namespace()?;
    let name = worker.deployment_name(bench_name);
    let mut object = DynamicObject::new(&name, &scaled_object_resource())
        .within(namespace)
        .data(serde_json::json!({
            "spec": {
                "scaleTargetRef": {
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "name": name,
                },
                "minReplicaCount": config.min_replicas,
                "maxReplicaCount": config.max_replicas,
                "cooldownPeriod": config.cooldown_period,
                "pollingInterval": config.polling_interval,
                "triggers": [{
                    "type": "redis",
                    "metadata": {
                        "address": format!(
                            "{bench_name}-redis-queue.{namespace}.svc.cluster.local:6379"
                        ),
                        "listName": format!("rq:queue:{worker}"),
                        "listLength": config.queue_length.to_string(),
                        "activationListLength": "1",
                        "databaseIndex": "0",
                        "enableTLS": "false",
                    },
                }],
            },
        }));
    object.metadata.labels = Some(labels.into());
    object.metadata.owner_references = Some(vec![bench.static_controller_owner_ref()?]);
    Ok(object)
}

/// Lists at most one `ScaledObject`. Only a missing CRD counts as
/// unavailable; a later create may still fail for other reasons.
pub async fn is_controller_available(ctx: &Context, namespace: &str) -> bool {
    let api = ctx.api_dynamic(namespace, &scaled_object_resource());
    match api.kube().list(&ListParams::default().limit(1)).await {
        Ok(_) => true,
        Err(frappe_operator::kube::Error::Api(response)) if response.code == 404 => {
            tracing::info!("KEDA is not installed, workers use static replicas");
            false
        }
        Err(err) => {
            tracing::debug!("Assuming KEDA is available after lookup error: {err}");
            true
        }
    }
}

/// Creates or replaces the pool's `ScaledObject` when managed, and deletes
/// it otherwise.
pub async fn ensure_scaled_object(
    ctx: &Context,
    bench: &FrappeBench,
    worker: WorkerType,
    config: &ResolvedAutoscaling,
    controller_managed: bool,
    labels: Labels,
) -> Result<()> {
    let namespace = bench.require_namespace()?;
    let api = ctx.api_dynamic(namespace, &scaled_object_resource());
    let name = worker.deployment_name(bench.name()?);
    let resource = format!("scaledobject/{name}");
    if !controller_managed {
        if api
            .delete_opt(&name)
            .await
            .map_err(Error::context(resource, "delete"))?
        {
            tracing::info!("Deleted ScaledObject {name}");
        }
        return Ok(());
    }
    let mut desired = scaled_object(bench, worker, config, labels)?;
    match api
        .get_opt(&name)
        .await
        .map_err(Error::context(resource.clone(), "get"))?
    {
        Some(existing) => {
            desired.metadata.resource_version = existing.metadata.resource_version;
            api.replace(&name, &desired)
                .await
                .map_err(Error::context(resource, "replace"))?;
        }
        None => {
            api.create(&desired)
                .await
                .map_err(Error::context(resource, "create"))?;
            tracing::info!("Created ScaledObject {name}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappe_operator::k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use frappe_operator::{ComponentReplicas, FrappeBenchSpec, WorkerAutoscalingConfig};
    use json_patch::PatchOperation;
    use strum::IntoEnumIterator;

    fn bench(spec: FrappeBenchSpec) -> FrappeBench {
        let mut bench = FrappeBench::new("erp", spec);
        bench.metadata.namespace = Some("tenants".into());
        bench.metadata.uid = Some("bench-uid".into());
        bench
    }

    fn deployment(replicas: Option<i32>) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas,
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                replicas: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_short_defaults_scale_to_zero() {
        let config = resolve(&bench(FrappeBenchSpec::default()), WorkerType::Short);
        assert_eq!(config, WorkerType::Short.defaults());
        assert_eq!(config.replica_count(true), 0);
        assert!(config.is_controller_managed(true));
        assert_eq!(config.replica_count(false), 1);
        assert!(!config.is_controller_managed(false));
    }

    #[test]
    fn test_default_pool_always_runs() {
        let config = resolve(&bench(FrappeBenchSpec::default()), WorkerType::Default);
        assert!(!config.enabled);
        assert_eq!(config.replica_count(true), 1);
        assert_eq!(config.mode(true), ScalingMode::Static);
    }

    #[test]
    fn test_legacy_replicas_beat_pool_defaults() {
        let legacy = bench(FrappeBenchSpec {
            component_replicas: Some(ComponentReplicas {
                worker_long: Some(3),
                worker_default: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        });
        let short = resolve(&legacy, WorkerType::Short);
        assert!(!short.enabled);
        assert_eq!(short.replica_count(true), 2);
        assert_eq!(resolve(&legacy, WorkerType::Long).replica_count(true), 3);
        assert_eq!(resolve(&legacy, WorkerType::Default).replica_count(true), 1);
    }

    #[test]
    fn test_explicit_config_is_filled_per_field() {
        let explicit = bench(FrappeBenchSpec {
            component_replicas: Some(ComponentReplicas {
                worker_short: Some(4),
                ..Default::default()
            }),
            worker_autoscaling: Some(WorkerAutoscalingConfig {
                short: Some(WorkerAutoscaling {
                    max_replicas: Some(20),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let config = resolve(&explicit, WorkerType::Short);
        assert!(config.enabled);
        assert_eq!(config.max_replicas, 20);
        assert_eq!(config.min_replicas, 0);
        assert_eq!(config.queue_length, 5);
        assert_eq!(config.cooldown_period, 60);
    }

    #[test]
    fn test_every_pool_resolves() {
        let bench = bench(FrappeBenchSpec::default());
        for worker in WorkerType::iter() {
            let config = resolve(&bench, worker);
            assert!(config.min_replicas <= config.max_replicas, "{worker}");
            assert!(config.static_replicas >= 1, "{worker}");
        }
    }

    #[test]
    fn test_managed_deployment_is_never_patched() {
        assert!(replica_patch(&deployment(Some(7)), 0, true).is_none());
        assert!(replica_patch(&deployment(None), 0, true).is_none());
    }

    #[test]
    fn test_static_replica_patch() {
        assert!(replica_patch(&deployment(Some(2)), 2, false).is_none());
        let patch = replica_patch(&deployment(Some(1)), 2, false).unwrap();
        assert!(matches!(&patch.0[..], [PatchOperation::Test(_), PatchOperation::Replace(_)]));
        let patch = replica_patch(&deployment(None), 2, false).unwrap();
        assert!(matches!(&patch.0[..], [PatchOperation::Add(_)]));
    }

    #[test]
    fn test_scaling_status() {
        let config = WorkerType::Long.defaults();
        let status = scaling_status(&config, true, Some(&deployment(None)));
        assert_eq!(status.mode, ScalingMode::Autoscaled);
        assert_eq!(status.current_replicas, 2);
        assert_eq!(status.desired_replicas, 0);
        assert!(status.controller_managed);
        let status = scaling_status(&config, false, None);
        assert_eq!(status.current_replicas, 0);
        assert_eq!(status.desired_replicas, 1);
    }

    #[test]
    fn test_managed_status_reports_live_replicas() {
        let config = WorkerType::Short.defaults();
        let scaled_up = deployment(Some(5));
        let status = scaling_status(&config, true, Some(&scaled_up));
        assert_eq!(status.desired_replicas, 5);
        assert!(status.controller_managed);
        let status = scaling_status(&config, false, Some(&scaled_up));
        assert_eq!(status.desired_replicas, 1);
        assert_eq!(status.mode, ScalingMode::Static);
    }

    #[test]
    fn test_scaled_object_shape() {
        let bench = bench(FrappeBenchSpec::default());
        let object = scaled_object(
            &bench,
            WorkerType::Short,
            &WorkerType::Short.defaults(),
            Labels::new(),
        )
        .unwrap();
        assert_eq!(object.metadata.name.as_deref(), Some("erp-worker-short"));
        assert_eq!(object.metadata.namespace.as_deref(), Some("tenants"));
        let spec = &object.data["spec"];
        assert_eq!(spec["scaleTargetRef"]["name"], "erp-worker-short");
        assert_eq!(spec["maxReplicaCount"], 10);
        let trigger = &spec["triggers"][0];
        assert_eq!(trigger["type"], "redis");
        assert_eq!(
            trigger["metadata"]["address"],
            "erp-redis-queue.tenants.svc.cluster.local:6379"
        );
        assert_eq!(trigger["metadata"]["listName"], "rq:queue:short");
        assert_eq!(trigger["metadata"]["listLength"], "5");
        let owner = &object.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.kind, "FrappeBench");
        assert_eq!(owner.controller, Some(true));
    }
}
