use std::fmt::Debug;
use std::sync::Arc;

use frappe_operator::k8s_openapi::NamespaceResourceScope;
use frappe_operator::kube::{
    Resource,
    runtime::{
        controller::Action,
        finalizer::{Event, finalizer},
    },
};
use frappe_operator::prelude::*;
use futures::future::{BoxFuture, FutureExt};
use serde::{Serialize, de::DeserializeOwned};
use tower::{Service, ServiceExt};

use crate::context::Context;
use crate::reconciler::Reconciler;

pub use frappe_operator::kube::runtime::finalizer::Error as FinalizerError;

/// Routes apply and cleanup events through the kube finalizer helper. Without
/// a finalizer name, live objects go straight to apply and deleted ones are
/// left to owner-reference garbage collection.
pub struct ReconcileService<T> {
    finalizer: Option<String>,
    reconciler: Arc<T>,
}

impl<T> ReconcileService<T> {
    pub fn new(finalizer: Option<String>, reconciler: T) -> Self {
        Self {
            finalizer,
            reconciler: Arc::new(reconciler),
        }
    }
}

impl<T, R> Service<(Arc<R>, Arc<Context>)> for ReconcileService<T>
where
    T: Reconciler<Resource = R> + Send + Sync + 'static,
    R: Resource<Scope = NamespaceResourceScope>
        + Serialize
        + DeserializeOwned
        + Clone
        + Debug
        + Send
        + Sync
        + 'static,
    <R as Resource>::DynamicType: Default,
    T::Error: std::error::Error + Send + 'static,
{
    type Response = Action;
    type Error = FinalizerError<T::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, (resource, ctx): (Arc<R>, Arc<Context>)) -> Self::Future {
        let finalizer_name = self.finalizer.clone();
        let reconciler = self.reconciler.clone();
        async move {
            let Some(finalizer_name) = finalizer_name else {
                if resource.meta().deletion_timestamp.is_some() {
                    return Ok(Action::await_change());
                }
                return reconciler
                    .apply(&ctx, &resource)
                    .await
                    .map_err(FinalizerError::ApplyFailed);
            };
            let namespace = resource.require_namespace().map_err(|err| {
                FinalizerError::AddFinalizer(frappe_operator::kube::Error::Service(err.into()))
            })?;
            let api = ctx.api_namespaced::<R>(namespace);
            finalizer(api.kube(), &finalizer_name, resource, |event| async move {
                match event {
                    Event::Apply(r) => reconciler.apply(&ctx, &r).await,
                    Event::Cleanup(r) => reconciler.cleanup(&ctx, &r).await,
                }
            })
            .await
        }
        .boxed()
    }
}

pub async fn reconcile<S, T>(
    mut service: S,
) -> Result<Box<dyn FnMut(Arc<T>, Arc<Context>) -> S::Future + Send>, S::Error>
where
    S: Service<(Arc<T>, Arc<Context>)> + Send + 'static,
{
    service.ready().await?;
    Ok(Box::new(move |resource: Arc<T>, ctx: Arc<Context>| {
        service.call((resource, ctx))
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::utils::to_kube_time;
    use frappe_operator::{FrappeBench, FrappeBenchSpec};

    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Reconciler for Counting {
        type Resource = FrappeBench;
        type Error = crate::Error;

        async fn apply(&self, _ctx: &Context, _bench: &FrappeBench) -> crate::Result<Action> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Action::requeue(Duration::from_secs(5)))
        }
    }

    /// A client pointed at a closed port; any API call fails.
    async fn offline_context() -> Arc<Context> {
        let client = frappe_operator::Client::builder()
            .config(frappe_operator::kube::Config::new(
                "http://127.0.0.1:9".parse().unwrap(),
            ))
            .build()
            .await
            .unwrap();
        Arc::new(Context::new(client, crate::Config::default()))
    }

    fn bench() -> FrappeBench {
        let mut bench = FrappeBench::new("erp", FrappeBenchSpec::default());
        bench.metadata.namespace = Some("tenants".into());
        bench
    }

    #[tokio::test]
    async fn test_without_finalizer_applies_directly() {
        let reconciler = Counting::default();
        let mut service = ReconcileService::new(None, reconciler.clone());
        let ctx = offline_context().await;

        let action = service
            .call((Arc::new(bench()), ctx.clone()))
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
        assert_eq!(reconciler.0.load(Ordering::SeqCst), 1);

        let mut deleting = bench();
        deleting.metadata.deletion_timestamp = Some(to_kube_time(chrono::Utc::now()).unwrap());
        let action = service.call((Arc::new(deleting), ctx)).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(reconciler.0.load(Ordering::SeqCst), 1);
    }
}
