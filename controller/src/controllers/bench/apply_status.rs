use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use frappe_operator::k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use frappe_operator::prelude::*;
use frappe_operator::{BenchPhase, FrappeBench, WorkerScalingStatus};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::operator_config::OperatorConfig;
use crate::utils::to_kube_time;

use super::BenchReconciler;

fn ready_condition(bench: &FrappeBench, now: DateTime<Utc>) -> serde_json::Result<Condition> {
    let previous = bench
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|cond| cond.type_ == "Ready"));
    let last_transition_time = match previous {
        Some(previous) if previous.status == "True" => previous.last_transition_time.clone(),
        _ => to_kube_time(now)?,
    };
    Ok(Condition {
        last_transition_time,
        observed_generation: bench.metadata.generation,
        message: "All bench components are deployed".into(),
        reason: "ComponentsReady".into(),
        status: "True".into(),
        type_: "Ready".into(),
    })
}

pub(crate) fn status_patch(
    bench: &FrappeBench,
    operator_config: &OperatorConfig,
    worker_scaling: &BTreeMap<String, WorkerScalingStatus>,
    now: DateTime<Utc>,
) -> serde_json::Result<serde_json::Value> {
    let repositories = operator_config
        .repositories(bench)
        .into_iter()
        .map(|repository| repository.name.as_str())
        .collect::<Vec<_>>();
    Ok(serde_json::json!({
        "phase": BenchPhase::Ready,
        "conditions": [ready_condition(bench, now)?],
        "installedApps": bench.app_names(),
        "gitEnabled": operator_config.git_enabled(bench),
        "fpmRepositories": repositories,
        "workerScaling": worker_scaling,
        "observedGeneration": bench.metadata.generation,
    }))
}

impl BenchReconciler {
    pub(crate) async fn apply_status(
        &self,
        ctx: &Context,
        bench: &FrappeBench,
        operator_config: &OperatorConfig,
        worker_scaling: &BTreeMap<String, WorkerScalingStatus>,
    ) -> Result<()> {
        let name = bench.name()?;
        let patch = status_patch(bench, operator_config, worker_scaling, Utc::now())
            .map_err(frappe_operator::Error::from)?;
        ctx.api_namespaced::<FrappeBench>(bench.require_namespace()?)
            .patch_status_merge(name, &patch)
            .await
            .map_err(Error::context(format!("frappebench/{name}"), "patch status"))?;
        Ok(())
    }
}
