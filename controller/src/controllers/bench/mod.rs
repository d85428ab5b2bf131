mod apply_init_job;
mod apply_redis;
mod apply_status;
mod apply_storage;
mod apply_web;
mod apply_workers;
pub(crate) mod template;

use std::sync::Arc;

use frappe_operator::FrappeBench;
use frappe_operator::k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use frappe_operator::k8s_openapi::api::batch::v1::Job;
use frappe_operator::k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use frappe_operator::kube::runtime::{Controller, controller::Action};
use futures::prelude::*;

use crate::backoff::default_error_policy;
use crate::context::Context;
use crate::error::{ControllerResult, Error};
use crate::operator_config::OperatorConfig;
use crate::reconciler::{ReconcileError, Reconciler, ReconcilerExt};

pub(crate) use apply_web::NGINX_PORT;

#[derive(Debug, Clone, Copy)]
pub(crate) struct BenchReconciler;

#[async_trait::async_trait]
impl Reconciler for BenchReconciler {
    type Resource = FrappeBench;
    type Error = Error;

    async fn apply(&self, ctx: &Context, bench: &FrappeBench) -> Result<Action, Self::Error> {
        let operator_config = OperatorConfig::load(ctx).await;
        if let Some(action) = self.apply_storage(ctx, bench).await?.action() {
            return Ok(action);
        }
        self.apply_init_job(ctx, bench).await?;
        self.apply_redis(ctx, bench).await?;
        self.apply_web(ctx, bench).await?;
        self.apply_scheduler(ctx, bench).await?;
        let worker_scaling = self.apply_workers(ctx, bench).await?;
        self.apply_status(ctx, bench, &operator_config, &worker_scaling)
            .await?;
        Ok(Action::await_change())
    }
}

pub async fn run(
    ctx: Arc<Context>,
    shutdown_signal: impl Future<Output = ()> + Send + Sync + 'static,
) -> Result<
    impl Stream<Item = ControllerResult<FrappeBench, ReconcileError<Error>>>,
    ReconcileError<Error>,
> {
    let benches = ctx.watched::<FrappeBench>().kube().clone();
    let claims = ctx.watched::<PersistentVolumeClaim>().kube().clone();
    let jobs = ctx.watched::<Job>().kube().clone();
    let services = ctx.watched::<Service>().kube().clone();
    let stateful_sets = ctx.watched::<StatefulSet>().kube().clone();
    let deployments = ctx.watched::<Deployment>().kube().clone();
    Ok(Controller::new(benches, Default::default())
        .owns(claims, Default::default())
        .owns(jobs, Default::default())
        .owns(services, Default::default())
        .owns(stateful_sets, Default::default())
        .owns(deployments, Default::default())
        .graceful_shutdown_on(shutdown_signal)
        .run(
            BenchReconciler.reconcile_without_finalizer().await?,
            default_error_policy,
            ctx,
        ))
}
