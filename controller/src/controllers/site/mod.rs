mod admin_secret;
mod cluster;
mod flow;
mod ingress;
mod init_job;

use std::sync::Arc;

use frappe_operator::FrappeSite;
use frappe_operator::k8s_openapi::api::batch::v1::Job;
use frappe_operator::k8s_openapi::api::core::v1::Secret;
use frappe_operator::k8s_openapi::api::networking::v1::Ingress;
use frappe_operator::kube::runtime::{Controller, controller::Action};
use futures::prelude::*;

use crate::backoff::default_error_policy;
use crate::context::Context;
use crate::error::{ControllerResult, Error};
use crate::reconciler::{ReconcileError, Reconciler, ReconcilerExt};

pub use cluster::{ContextCluster, SiteCluster};

pub const FINALIZER: &str = "vyogo.tech/site-finalizer";

#[derive(Debug, Clone, Copy)]
struct SiteReconciler;

#[async_trait::async_trait]
impl Reconciler for SiteReconciler {
    type Resource = FrappeSite;
    type Error = Error;

    async fn apply(&self, ctx: &Context, site: &FrappeSite) -> Result<Action, Self::Error> {
        flow::apply(&ContextCluster::new(ctx), &ctx.config, site).await
    }

    async fn cleanup(&self, ctx: &Context, site: &FrappeSite) -> Result<Action, Self::Error> {
        flow::cleanup(&ContextCluster::new(ctx), site).await
    }
}

pub async fn run(
    ctx: Arc<Context>,
    shutdown_signal: impl Future<Output = ()> + Send + Sync + 'static,
) -> Result<
    impl Stream<Item = ControllerResult<FrappeSite, ReconcileError<Error>>>,
    ReconcileError<Error>,
> {
    let sites = ctx.watched::<FrappeSite>().kube().clone();
    let jobs = ctx.watched::<Job>().kube().clone();
    let secrets = ctx.watched::<Secret>().kube().clone();
    let ingresses = ctx.watched::<Ingress>().kube().clone();
    Ok(Controller::new(sites, Default::default())
        .owns(jobs, Default::default())
        .owns(secrets, Default::default())
        .owns(ingresses, Default::default())
        .graceful_shutdown_on(shutdown_signal)
        .run(
            SiteReconciler.reconcile(FINALIZER).await?,
            default_error_policy,
            ctx,
        ))
}
