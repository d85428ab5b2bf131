use std::collections::BTreeMap;

use frappe_operator::k8s_openapi::api::apps::v1::Deployment;
use frappe_operator::label::FrappeLabel;
use frappe_operator::prelude::*;
use frappe_operator::{FrappeBench, ScalingMode, WorkerScalingStatus};
use strum::IntoEnumIterator;

use crate::autoscaling::{self, ResolvedAutoscaling, WorkerType};
use crate::command::cmd;
use crate::context::Context;
use crate::error::{Error, Result};

use super::BenchReconciler;
use super::template::{self, Component};

const KEDA_MANAGED_BY: &str = "keda.sh/managed-by";

fn scaling_annotations(mode: ScalingMode, controller_managed: bool) -> BTreeMap<String, String> {
    let mut annotations =
        BTreeMap::from([(FrappeLabel::new("scaling-mode").to_string(), mode.to_string())]);
    if controller_managed {
        annotations.insert(KEDA_MANAGED_BY.to_string(), "keda".to_string());
    }
    annotations
}

/// Merge patch bringing a live deployment's scaling annotations in line with
/// `mode`, or `None` when they already match.
fn annotation_patch(
    deployment: &Deployment,
    mode: ScalingMode,
    controller_managed: bool,
) -> Option<serde_json::Value> {
    let live = deployment.metadata.annotations.clone().unwrap_or_default();
    let mut changes = serde_json::Map::new();
    for (key, value) in scaling_annotations(mode, controller_managed) {
        if live.get(&key) != Some(&value) {
            changes.insert(key, value.into());
        }
    }
    if !controller_managed && live.contains_key(KEDA_MANAGED_BY) {
        changes.insert(KEDA_MANAGED_BY.into(), serde_json::Value::Null);
    }
    if changes.is_empty() {
        return None;
    }
    Some(serde_json::json!({ "metadata": { "annotations": changes } }))
}

pub(crate) fn worker_deployment(
    bench: &FrappeBench,
    config: &crate::Config,
    worker: WorkerType,
    scaling: &ResolvedAutoscaling,
    controller_available: bool,
) -> frappe_operator::Result<Deployment> {
    let component = Component::Worker(worker);
    let mut container = template::bench_container(bench, config, "worker", component);
    container.args = Some(cmd!["bench", "worker", "--queue", worker]);
    template::deployment(
        bench,
        component,
        scaling.replica_count(controller_available),
        container,
        Some(scaling_annotations(
            scaling.mode(controller_available),
            scaling.is_controller_managed(controller_available),
        )),
    )
}

impl BenchReconciler {
    async fn apply_worker(
        &self,
        ctx: &Context,
        bench: &FrappeBench,
        worker: WorkerType,
        controller_available: bool,
    ) -> Result<WorkerScalingStatus> {
        let namespace = bench.require_namespace()?;
        let name = worker.deployment_name(bench.name()?);
        let scaling = autoscaling::resolve(bench, worker);
        let desired = scaling.replica_count(controller_available);
        let managed = scaling.is_controller_managed(controller_available);
        let api = ctx.api_namespaced::<Deployment>(namespace);
        let mut existing = api
            .get_opt(&name)
            .await
            .map_err(Error::context(format!("deployment/{name}"), "get"))?;
        let mode = scaling.mode(controller_available);
        if let Some(patch) = existing
            .as_ref()
            .and_then(|deployment| annotation_patch(deployment, mode, managed))
        {
            let patched = api
                .patch_merge(&name, &patch)
                .await
                .map_err(Error::context(format!("deployment/{name}"), "patch"))?;
            tracing::info!("Deployment {name} switched to {mode} scaling");
            existing = Some(patched);
        }
        let live = match existing {
            Some(existing) => match autoscaling::replica_patch(&existing, desired, managed) {
                Some(patch) => match api.patch_json(&name, patch).await {
                    Ok(patched) => {
                        tracing::info!("Scaled deployment {name} to {desired} replicas");
                        patched
                    }
                    Err(err) if err.is_unprocessable() || err.is_conflict() => {
                        tracing::info!("Deployment {name} changed while scaling, retrying next pass");
                        existing
                    }
                    Err(err) => {
                        return Err(Error::context(format!("deployment/{name}"), "patch")(err));
                    }
                },
                None => existing,
            },
            None => {
                let deployment =
                    worker_deployment(bench, &ctx.config, worker, &scaling, controller_available)?;
                let created = api
                    .get_or_create(&deployment)
                    .await
                    .map_err(Error::context(format!("deployment/{name}"), "create"))?;
                tracing::info!("Created worker deployment {name} with {desired} replicas");
                created.into_inner()
            }
        };
        let labels = template::component_labels(bench, Component::Worker(worker));
        if let Err(err) =
            autoscaling::ensure_scaled_object(ctx, bench, worker, &scaling, managed, labels).await
        {
            tracing::warn!("Failed to ensure ScaledObject for {name}: {err}");
        }
        Ok(autoscaling::scaling_status(
            &scaling,
            controller_available,
            Some(&live),
        ))
    }

    /// Reconciles every worker pool and returns the scaling snapshot keyed by
    /// pool name.
    pub(crate) async fn apply_workers(
        &self,
        ctx: &Context,
        bench: &FrappeBench,
    ) -> Result<BTreeMap<String, WorkerScalingStatus>> {
        let available = autoscaling::is_controller_available(ctx, bench.require_namespace()?).await;
        let mut statuses = BTreeMap::new();
        for worker in WorkerType::iter() {
            let status = self.apply_worker(ctx, bench, worker, available).await?;
            statuses.insert(worker.to_string(), status);
        }
        Ok(statuses)
    }
}
