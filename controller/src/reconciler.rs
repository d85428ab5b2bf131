use std::fmt::Debug;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use frappe_operator::k8s_openapi::NamespaceResourceScope;
use frappe_operator::kube::{Resource, runtime::controller::Action};
use serde::{Serialize, de::DeserializeOwned};
use tower::{Service, ServiceBuilder};

use crate::backoff::{BackoffError, DefaultBackoffLayer};
use crate::context::Context;
use crate::service::{FinalizerError, ReconcileService, reconcile};
use crate::trace::TraceLayer;

#[async_trait::async_trait]
pub trait Reconciler {
    type Resource: Send + Sync;
    type Error;

    async fn apply(&self, ctx: &Context, resource: &Self::Resource)
    -> Result<Action, Self::Error>;

    async fn cleanup(
        &self,
        _ctx: &Context,
        _resource: &Self::Resource,
    ) -> Result<Action, Self::Error> {
        Ok(Action::await_change())
    }
}

pub type ReconcileError<E> = BackoffError<FinalizerError<E>>;
type ReconcileFuture<E> = BoxFuture<'static, Result<Action, ReconcileError<E>>>;
type ReconcileFn<R, E> = Box<dyn FnMut(Arc<R>, Arc<Context>) -> ReconcileFuture<E> + Send>;

#[allow(clippy::type_complexity)]
pub trait ReconcilerExt: Reconciler {
    /// With a `finalizer`, it is added to every object on first reconcile and
    /// removed once [`Reconciler::cleanup`] succeeds.
    fn service(
        self,
        finalizer: Option<String>,
    ) -> impl Service<
        (Arc<Self::Resource>, Arc<Context>),
        Response = Action,
        Error = ReconcileError<Self::Error>,
        Future = ReconcileFuture<Self::Error>,
    > + Send
    + Sync
    + 'static
    where
        Self: Sized + Send + Sync + 'static,
        Self::Resource: Resource<Scope = NamespaceResourceScope>
            + Serialize
            + DeserializeOwned
            + Clone
            + Debug
            + Send
            + Sync
            + 'static,
        <Self::Resource as Resource>::DynamicType: Default,
        Self::Error: std::error::Error + Send + 'static,
    {
        ServiceBuilder::new()
            .layer(DefaultBackoffLayer::default())
            .layer(TraceLayer)
            .service(ReconcileService::new(finalizer, self))
    }

    fn reconcile(
        self,
        finalizer: impl ToString,
    ) -> BoxFuture<
        'static,
        Result<ReconcileFn<Self::Resource, Self::Error>, ReconcileError<Self::Error>>,
    >
    where
        Self: Sized + Send + Sync + 'static,
        Self::Resource: Resource<Scope = NamespaceResourceScope>
            + Serialize
            + DeserializeOwned
            + Clone
            + Debug
            + Send
            + Sync
            + 'static,
        <Self::Resource as Resource>::DynamicType: Default,
        Self::Error: std::error::Error + Send + 'static,
    {
        reconcile(self.service(Some(finalizer.to_string()))).boxed()
    }

    /// For resources whose children are all removed through owner references.
    fn reconcile_without_finalizer(
        self,
    ) -> BoxFuture<
        'static,
        Result<ReconcileFn<Self::Resource, Self::Error>, ReconcileError<Self::Error>>,
    >
    where
        Self: Sized + Send + Sync + 'static,
        Self::Resource: Resource<Scope = NamespaceResourceScope>
            + Serialize
            + DeserializeOwned
            + Clone
            + Debug
            + Send
            + Sync
            + 'static,
        <Self::Resource as Resource>::DynamicType: Default,
        Self::Error: std::error::Error + Send + 'static,
    {
        reconcile(self.service(None)).boxed()
    }
}

impl<T> ReconcilerExt for T where T: Reconciler {}
