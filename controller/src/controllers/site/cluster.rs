//! The cluster operations a site pass needs, behind a seam so the flow can
//! run against an in-memory cluster in tests.

use async_trait::async_trait;
use frappe_operator::k8s_openapi::api::batch::v1::Job;
use frappe_operator::k8s_openapi::api::core::v1::{Secret, Service};
use frappe_operator::k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use frappe_operator::prelude::*;
use frappe_operator::{FrappeBench, FrappeSite};

use crate::context::Context;
use crate::database::{DatabaseProvider, Provider, ProviderError};
use crate::domain::ServiceLookup;

#[async_trait]
pub trait SiteCluster: ServiceLookup {
    async fn get_bench(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<FrappeBench>>;

    /// JSON merge patch against the site's status subresource.
    async fn patch_site_status(
        &self,
        site: &FrappeSite,
        status: &serde_json::Value,
    ) -> frappe_operator::Result<()>;

    fn database(&self, site: &FrappeSite) -> Result<Box<dyn DatabaseProvider>, ProviderError>;

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<Secret>>;

    async fn get_or_create_secret(&self, secret: &Secret) -> frappe_operator::Result<Secret>;

    async fn get_or_create_job(&self, job: &Job) -> frappe_operator::Result<Job>;

    async fn ingress_class_exists(&self, name: &str) -> frappe_operator::Result<bool>;

    async fn get_or_create_ingress(&self, ingress: &Ingress) -> frappe_operator::Result<Ingress>;
}

/// [`SiteCluster`] backed by the API server.
pub struct ContextCluster<'a> {
    ctx: &'a Context,
}

impl<'a> ContextCluster<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ServiceLookup for ContextCluster<'_> {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<Service>> {
        self.ctx.api_namespaced::<Service>(namespace).get_opt(name).await
    }
}

#[async_trait]
impl SiteCluster for ContextCluster<'_> {
    async fn get_bench(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<FrappeBench>> {
        self.ctx
            .api_namespaced::<FrappeBench>(namespace)
            .get_opt(name)
            .await
    }

    async fn patch_site_status(
        &self,
        site: &FrappeSite,
        status: &serde_json::Value,
    ) -> frappe_operator::Result<()> {
        self.ctx
            .api_namespaced::<FrappeSite>(site.require_namespace()?)
            .patch_status_merge(site.name()?, status)
            .await?;
        Ok(())
    }

    fn database(&self, site: &FrappeSite) -> Result<Box<dyn DatabaseProvider>, ProviderError> {
        Ok(Box::new(Provider::for_site(site, self.ctx.client.clone())?))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<Secret>> {
        self.ctx.api_namespaced::<Secret>(namespace).get_opt(name).await
    }

    async fn get_or_create_secret(&self, secret: &Secret) -> frappe_operator::Result<Secret> {
        let ensured = self
            .ctx
            .api_namespaced::<Secret>(secret.require_namespace()?)
            .get_or_create(secret)
            .await?;
        if ensured.created() {
            tracing::info!("Created secret {}", secret.name_any());
        }
        Ok(ensured.into_inner())
    }

    async fn get_or_create_job(&self, job: &Job) -> frappe_operator::Result<Job> {
        let ensured = self
            .ctx
            .api_namespaced::<Job>(job.require_namespace()?)
            .get_or_create(job)
            .await?;
        if ensured.created() {
            tracing::info!("Created job {}", job.name_any());
        }
        Ok(ensured.into_inner())
    }

    async fn ingress_class_exists(&self, name: &str) -> frappe_operator::Result<bool> {
        Ok(self
            .ctx
            .api_global::<IngressClass>()
            .get_opt(name)
            .await?
            .is_some())
    }

    async fn get_or_create_ingress(&self, ingress: &Ingress) -> frappe_operator::Result<Ingress> {
        let ensured = self
            .ctx
            .api_namespaced::<Ingress>(ingress.require_namespace()?)
            .get_or_create(ingress)
            .await?;
        if ensured.created() {
            tracing::info!("Created ingress {}", ingress.name_any());
        }
        Ok(ensured.into_inner())
    }
}
