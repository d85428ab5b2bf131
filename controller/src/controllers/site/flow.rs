//! One pass over a site: bench → domain → database → admin password → init
//! job → ingress, with the phase recorded along the way.

use std::time::Duration;

use frappe_operator::kube::runtime::controller::Action;
use frappe_operator::prelude::*;
use frappe_operator::{FrappeBench, FrappeSite, FrappeSiteStatus, SitePhase};

use crate::database::ProviderError;
use crate::domain::{self, ResolvedDomain};
use crate::error::{Error, Result};
use crate::job::JobState;

use super::admin_secret::admin_password;
use super::cluster::SiteCluster;
use super::init_job::{self, SiteInit};
use super::ingress;

pub(crate) const BENCH_REQUEUE: Duration = Duration::from_secs(30);
pub(crate) const PROVISION_REQUEUE: Duration = Duration::from_secs(10);

/// Writes the site's status, diffing every update against what this pass
/// has already persisted rather than the snapshot the pass started from.
struct StatusWriter<'a, C: ?Sized> {
    cluster: &'a C,
    site: &'a FrappeSite,
    current: Option<FrappeSiteStatus>,
}

impl<'a, C> StatusWriter<'a, C>
where
    C: SiteCluster + ?Sized,
{
    fn new(cluster: &'a C, site: &'a FrappeSite) -> Self {
        Self {
            cluster,
            site,
            current: site.status.clone(),
        }
    }

    /// Merge-patches the status when `update` changes it. `message` is cleared
    /// unless the update sets one.
    async fn write(&mut self, update: impl FnOnce(&mut FrappeSiteStatus)) -> Result<()> {
        let mut status = self.current.clone().unwrap_or_default();
        status.message = None;
        update(&mut status);
        if self.current.as_ref() == Some(&status) {
            return Ok(());
        }
        let mut patch = serde_json::to_value(&status).map_err(frappe_operator::Error::from)?;
        if status.message.is_none() {
            patch["message"] = serde_json::Value::Null;
        }
        self.cluster
            .patch_site_status(self.site, &patch)
            .await
            .map_err(Error::context(
                format!("frappesite/{}", self.site.name_any()),
                "patch status",
            ))?;
        self.current = Some(status);
        Ok(())
    }

    /// Records `error` as the failure of the current generation.
    async fn fail(&mut self, error: Error) -> Error {
        tracing::warn!("Site {} failed: {error}", self.site.name_any());
        let message = error.to_string();
        let generation = self.site.metadata.generation;
        if let Err(err) = self
            .write(|status| {
                status.phase = Some(SitePhase::Failed);
                status.message = Some(message);
                status.observed_generation = generation;
            })
            .await
        {
            tracing::warn!(
                "Could not record failure of site {}: {err}",
                self.site.name_any()
            );
        }
        error
    }

    /// Permanent errors mark the site failed before they are returned.
    async fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Err(err) if err.is_permanent() => Err(self.fail(err).await),
            result => result,
        }
    }

    async fn check_provider<T>(&mut self, result: Result<T, ProviderError>) -> Result<T> {
        self.check(result.map_err(Error::from)).await
    }
}

/// Failed is terminal until the site is edited.
fn failed_at_current_generation(site: &FrappeSite) -> bool {
    site.status.as_ref().is_some_and(|status| {
        status.phase == Some(SitePhase::Failed)
            && status.observed_generation.is_some()
            && status.observed_generation == site.metadata.generation
    })
}

async fn ready_bench<C>(status: &mut StatusWriter<'_, C>) -> Result<Option<FrappeBench>>
where
    C: SiteCluster + ?Sized,
{
    let site = status.site;
    let Some(bench_ref) = site.spec.bench_ref.as_ref() else {
        return Err(status.fail(Error::MissingBenchRef).await);
    };
    let namespace = bench_ref.namespace_or(site.require_namespace()?);
    let bench = status
        .cluster
        .get_bench(namespace, &bench_ref.name)
        .await
        .map_err(Error::context(format!("frappebench/{}", bench_ref.name), "get"))?;
    match bench {
        Some(bench) if bench.is_ready() => Ok(Some(bench)),
        bench => {
            let reason = if bench.is_some() { "not ready" } else { "not found" };
            tracing::info!("Bench {namespace}/{} is {reason}, waiting", bench_ref.name);
            status
                .write(|status| {
                    status.phase = Some(SitePhase::Pending);
                    status.bench_ready = Some(false);
                    status.message =
                        Some(format!("Waiting for bench {}: {reason}", bench_ref.name));
                })
                .await?;
            Ok(None)
        }
    }
}

fn site_url(site: &FrappeSite, domain: &str) -> String {
    let scheme = if site.tls_enabled() { "https" } else { "http" };
    format!("{scheme}://{domain}")
}

pub(crate) async fn apply<C>(cluster: &C, config: &crate::Config, site: &FrappeSite) -> Result<Action>
where
    C: SiteCluster + ?Sized,
{
    if failed_at_current_generation(site) {
        tracing::info!(
            "Site {} failed at generation {:?}, waiting for a change",
            site.name_any(),
            site.metadata.generation
        );
        return Ok(Action::await_change());
    }
    let mut status = StatusWriter::new(cluster, site);
    let err = match provision(&mut status, config).await {
        Ok(action) => return Ok(action),
        Err(err) => err,
    };
    let Some(secret) = err.missing_secret().map(String::from) else {
        return Err(err);
    };
    tracing::info!("Secret {secret} for site {} not found, waiting", site.name_any());
    status
        .write(|status| {
            status.phase = Some(SitePhase::Provisioning);
            status.message = Some(format!("Waiting for secret {secret}"));
        })
        .await?;
    Ok(Action::requeue(PROVISION_REQUEUE))
}

async fn provision<C>(status: &mut StatusWriter<'_, C>, config: &crate::Config) -> Result<Action>
where
    C: SiteCluster + ?Sized,
{
    let cluster = status.cluster;
    let site = status.site;
    let Some(bench) = ready_bench(status).await? else {
        return Ok(Action::requeue(BENCH_REQUEUE));
    };

    let recorded = ResolvedDomain::recorded(site);
    let ready = recorded.is_some();
    let resolved = match recorded {
        Some(resolved) => resolved,
        None => domain::resolve(site, &bench, cluster).await,
    };
    if !ready {
        tracing::info!(
            "Provisioning site {} on {} ({})",
            site.name_any(),
            resolved.domain,
            resolved.source
        );
        status
            .write(|status| {
                status.phase = Some(SitePhase::Provisioning);
                status.bench_ready = Some(true);
                status.resolved_domain = Some(resolved.domain.clone());
                status.domain_source = Some(resolved.source);
            })
            .await?;
    }

    let provider = status.check_provider(cluster.database(site)).await?;
    let database = status
        .check_provider(provider.ensure_database(site).await)
        .await?;
    if !status.check_provider(provider.is_ready(site).await).await? {
        tracing::info!("Database {} is not ready yet", database.name);
        status
            .write(|status| {
                status.database_ready = Some(false);
                status.database_name = Some(database.name.clone());
            })
            .await?;
        return Ok(Action::requeue(PROVISION_REQUEUE));
    }
    let credentials = status
        .check_provider(provider.get_credentials(site).await)
        .await?;
    let admin_password = status.check(admin_password(cluster, site).await).await?;

    let job = SiteInit {
        site,
        bench: &bench,
        domain: &resolved.domain,
        database: &database,
        credentials: &credentials,
        admin_password: &admin_password,
    }
    .job(config)?;
    let job_name = init_job::job_name(site)?;
    let job = cluster
        .get_or_create_job(&job)
        .await
        .map_err(Error::context(format!("job/{job_name}"), "create"))?;
    match JobState::of(&job) {
        JobState::Succeeded => {}
        JobState::Running => {
            tracing::info!("Waiting for init job {job_name}");
            return Ok(Action::requeue(PROVISION_REQUEUE));
        }
        JobState::Failed => {
            return Err(status.fail(Error::InitJobFailed(job_name)).await);
        }
    }

    if site.ingress_enabled() {
        let class = ingress::ingress_class(site, &config.ingress_class);
        match cluster.ingress_class_exists(class).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("IngressClass {class} not found, creating ingress anyway"),
            Err(err) => tracing::debug!("Could not look up IngressClass {class}: {err}"),
        }
        let ingress = ingress::ingress(site, &bench, &resolved.domain, class)?;
        cluster
            .get_or_create_ingress(&ingress)
            .await
            .map_err(Error::context(format!("ingress/{}", ingress.name_any()), "create"))?;
    }

    status
        .write(|status| {
            status.phase = Some(SitePhase::Ready);
            status.bench_ready = Some(true);
            status.site_url = Some(site_url(site, &resolved.domain));
            status.resolved_domain = Some(resolved.domain.clone());
            status.domain_source = Some(resolved.source);
            status.database_ready = Some(true);
            status.database_name = Some(database.name.clone());
            status.db_connection_secret = credentials.secret_name.clone();
            status.observed_generation = site.metadata.generation;
        })
        .await?;
    Ok(Action::await_change())
}

/// Drops the site's database resources. Providers that cannot manage the
/// site's database have nothing to clean.
pub(crate) async fn cleanup<C>(cluster: &C, site: &FrappeSite) -> Result<Action>
where
    C: SiteCluster + ?Sized,
{
    let provider = match cluster.database(site) {
        Ok(provider) => provider,
        Err(err) if err.is_permanent() => {
            tracing::info!("Nothing to clean up for site {}: {err}", site.name_any());
            return Ok(Action::await_change());
        }
        Err(err) => return Err(err.into()),
    };
    match provider.cleanup(site).await {
        Ok(()) => {}
        Err(ProviderError::Unsupported(kind)) => {
            tracing::info!("No {kind} cleanup for site {}", site.name_any());
        }
        Err(err) => return Err(err.into()),
    }
    Ok(Action::await_change())
}
