use std::fmt::Debug;
use std::sync::Arc;

use frappe_operator::prelude::*;
use futures::future::{BoxFuture, FutureExt};
use tower::{Layer, Service};
use tracing::{Instrument, Level};

use crate::context::Context;

pub struct TraceService<S> {
    inner: S,
}

impl<S, T> Service<(Arc<T>, Arc<Context>)> for TraceService<S>
where
    S: Service<(Arc<T>, Arc<Context>)> + Send,
    T: Resource + Send + Sync,
    S::Future: Send + 'static,
    S::Error: Debug + Send,
    S::Response: Debug + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: (Arc<T>, Arc<Context>)) -> Self::Future {
        let span = tracing::span!(
            Level::INFO,
            "reconciler",
            name = %req.0.name_any(),
            namespace = ?req.0.namespace(),
            generation = ?req.0.meta().generation,
        );
        let fut = span.in_scope(|| self.inner.call(req));
        async move {
            match fut.await {
                Ok(ret) => {
                    tracing::info!("Reconciled {ret:?}");
                    Ok(ret)
                }
                Err(err) => {
                    tracing::error!("Error {err:?}");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .boxed()
    }
}

/// Wraps every reconcile in a `reconciler` span and logs its outcome.
pub struct TraceLayer;

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> TraceService<S> {
        TraceService { inner }
    }
}
