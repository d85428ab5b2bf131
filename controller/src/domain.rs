//! Picks the external hostname a site is served on.
//!
//! Priority, first match wins: the site's explicit `domain`, the bench's
//! domain suffix, a suffix detected from the cluster's ingress controller,
//! and finally the bare site name.

use frappe_operator::k8s_openapi::api::core::v1::Service;
use frappe_operator::{DomainSource, FrappeBench, FrappeSite, NamespacedName, SitePhase};

const EXTERNAL_DNS_HOSTNAME: &str = "external-dns.alpha.kubernetes.io/hostname";

/// Well-known ingress controller services, checked in order.
pub const INGRESS_CONTROLLER_SERVICES: [(&str, &str); 4] = [
    ("ingress-nginx", "ingress-nginx-controller"),
    ("ingress-nginx", "nginx-ingress-controller"),
    ("traefik", "traefik"),
    ("kube-system", "traefik"),
];

#[async_trait::async_trait]
pub trait ServiceLookup: Send + Sync {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<Service>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDomain {
    pub domain: String,
    pub source: DomainSource,
}

impl ResolvedDomain {
    fn new(domain: impl Into<String>, source: DomainSource) -> Self {
        Self {
            domain: domain.into(),
            source,
        }
    }

    /// The domain recorded by a completed pass over the current generation.
    pub fn recorded(site: &FrappeSite) -> Option<Self> {
        let status = site.status.as_ref()?;
        if status.phase != Some(SitePhase::Ready)
            || status.observed_generation != site.metadata.generation
        {
            return None;
        }
        Some(Self::new(
            status.resolved_domain.clone()?,
            status.domain_source?,
        ))
    }
}

pub async fn resolve(
    site: &FrappeSite,
    bench: &FrappeBench,
    services: &(impl ServiceLookup + ?Sized),
) -> ResolvedDomain {
    let site_name = site.spec.site_name.as_str();
    if let Some(domain) = site.spec.domain.as_deref().filter(|domain| !domain.is_empty()) {
        return ResolvedDomain::new(domain, DomainSource::Explicit);
    }
    let domain_config = bench.spec.domain_config.as_ref();
    if let Some(suffix) = domain_config
        .and_then(|config| config.suffix.as_deref())
        .filter(|suffix| !suffix.is_empty())
    {
        return ResolvedDomain::new(format!("{site_name}{suffix}"), DomainSource::BenchSuffix);
    }
    let auto_detect = domain_config
        .and_then(|config| config.auto_detect)
        .unwrap_or(true);
    if auto_detect && !is_local_domain(site_name) {
        let preferred = domain_config.and_then(|config| config.ingress_controller_ref.as_ref());
        if let Some(suffix) = detect_suffix(services, preferred).await {
            return ResolvedDomain::new(format!("{site_name}{suffix}"), DomainSource::AutoDetected);
        }
    }
    ResolvedDomain::new(site_name, DomainSource::SiteNameDefault)
}

async fn detect_suffix(
    services: &(impl ServiceLookup + ?Sized),
    preferred: Option<&NamespacedName>,
) -> Option<String> {
    let candidates = preferred
        .map(|reference| {
            (
                reference.namespace_or("ingress-nginx").to_string(),
                reference.name.clone(),
            )
        })
        .into_iter()
        .chain(
            INGRESS_CONTROLLER_SERVICES
                .iter()
                .map(|(namespace, name)| (namespace.to_string(), name.to_string())),
        );
    for (namespace, name) in candidates {
        let service = match services.get_service(&namespace, &name).await {
            Ok(Some(service)) => service,
            Ok(None) => continue,
            Err(err) => {
                tracing::debug!("Skipping ingress controller {namespace}/{name}: {err}");
                continue;
            }
        };
        tracing::debug!("Found ingress controller service {namespace}/{name}");
        // The first controller found decides, even when it yields nothing.
        return suffix_from_service(&service);
    }
    tracing::debug!("No ingress controller service found");
    None
}

fn suffix_from_service(service: &Service) -> Option<String> {
    let annotated = service
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(EXTERNAL_DNS_HOSTNAME))
        .and_then(|hostname| extract_suffix(hostname));
    if annotated.is_some() {
        return annotated;
    }
    let is_load_balancer = service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        == Some("LoadBalancer");
    if !is_load_balancer {
        return None;
    }
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?
        .hostname
        .as_deref()
        .and_then(extract_suffix)
}

/// `*.prod.example.com` → `.example.com`. IP addresses yield nothing.
pub fn extract_suffix(hostname: &str) -> Option<String> {
    let hostname = hostname.strip_prefix('*').unwrap_or(hostname);
    let hostname = hostname.strip_prefix('.').unwrap_or(hostname);
    if hostname.is_empty() || hostname.contains(':') || is_ipv4_like(hostname) {
        return None;
    }
    let labels: Vec<&str> = hostname.split('.').collect();
    let [.., domain, tld] = labels.as_slice() else {
        return None;
    };
    Some(format!(".{domain}.{tld}"))
}

fn is_ipv4_like(hostname: &str) -> bool {
    let octets: Vec<&str> = hostname.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            (1..=3).contains(&octet.len()) && octet.bytes().all(|byte| byte.is_ascii_digit())
        })
}

pub fn is_local_domain(name: &str) -> bool {
    name == "localhost" || name.ends_with(".local") || name.ends_with(".localhost")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use frappe_operator::k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, ServiceSpec, ServiceStatus,
    };
    use frappe_operator::kube::api::ObjectMeta;
    use frappe_operator::{DomainConfig, FrappeBenchSpec, FrappeSiteSpec, FrappeSiteStatus};

    #[derive(Default)]
    pub(crate) struct StaticServices(pub BTreeMap<(String, String), Service>);

    impl StaticServices {
        pub(crate) fn with(mut self, namespace: &str, name: &str, service: Service) -> Self {
            self.0
                .insert((namespace.to_string(), name.to_string()), service);
            self
        }
    }

    #[async_trait::async_trait]
    impl ServiceLookup for StaticServices {
        async fn get_service(
            &self,
            namespace: &str,
            name: &str,
        ) -> frappe_operator::Result<Option<Service>> {
            Ok(self
                .0
                .get(&(namespace.to_string(), name.to_string()))
                .cloned())
        }
    }

    pub(crate) fn external_dns_service(hostname: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                annotations: Some(
                    [(EXTERNAL_DNS_HOSTNAME.to_string(), hostname.to_string())].into(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn load_balancer_service(hostname: &str) -> Service {
        Service {
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".into()),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        hostname: Some(hostname.into()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn site(site_name: &str, domain: Option<&str>) -> FrappeSite {
        FrappeSite::new(
            "shop",
            FrappeSiteSpec {
                site_name: site_name.into(),
                domain: domain.map(Into::into),
                ..Default::default()
            },
        )
    }

    fn bench(domain_config: Option<DomainConfig>) -> FrappeBench {
        FrappeBench::new(
            "erp",
            FrappeBenchSpec {
                frappe_version: "version-15".into(),
                domain_config,
                ..Default::default()
            },
        )
    }

    fn suffix(suffix: &str) -> Option<DomainConfig> {
        Some(DomainConfig {
            suffix: Some(suffix.into()),
            ..Default::default()
        })
    }

    fn nginx_with(hostname: &str) -> StaticServices {
        StaticServices::default().with(
            "ingress-nginx",
            "ingress-nginx-controller",
            external_dns_service(hostname),
        )
    }

    #[tokio::test]
    async fn test_explicit_domain_wins() {
        let resolved = resolve(
            &site("shop1", Some("shop.customer.com")),
            &bench(suffix(".acme.io")),
            &nginx_with("*.example.com"),
        )
        .await;
        assert_eq!(
            resolved,
            ResolvedDomain::new("shop.customer.com", DomainSource::Explicit)
        );
    }

    #[tokio::test]
    async fn test_bench_suffix_beats_detection() {
        let resolved = resolve(
            &site("shop1", Some("")),
            &bench(suffix(".acme.io")),
            &nginx_with("*.example.com"),
        )
        .await;
        assert_eq!(
            resolved,
            ResolvedDomain::new("shop1.acme.io", DomainSource::BenchSuffix)
        );
    }

    #[tokio::test]
    async fn test_auto_detect_from_external_dns() {
        let resolved = resolve(
            &site("shop1", None),
            &bench(None),
            &nginx_with("*.prod.example.com"),
        )
        .await;
        assert_eq!(
            resolved,
            ResolvedDomain::new("shop1.example.com", DomainSource::AutoDetected)
        );
    }

    #[tokio::test]
    async fn test_auto_detect_from_load_balancer() {
        let services = StaticServices::default().with(
            "kube-system",
            "traefik",
            load_balancer_service("a1b2.us-west-2.elb.amazonaws.com"),
        );
        let resolved = resolve(&site("shop1", None), &bench(None), &services).await;
        assert_eq!(resolved.domain, "shop1.amazonaws.com");
        assert_eq!(resolved.source, DomainSource::AutoDetected);
    }

    #[tokio::test]
    async fn test_ingress_controller_ref_checked_first() {
        let services = nginx_with("*.example.com").with(
            "edge",
            "contour",
            external_dns_service("*.edge.net"),
        );
        let bench = bench(Some(DomainConfig {
            ingress_controller_ref: Some(NamespacedName::new("contour").within("edge")),
            ..Default::default()
        }));
        let resolved = resolve(&site("shop1", None), &bench, &services).await;
        assert_eq!(resolved.domain, "shop1.edge.net");
    }

    #[tokio::test]
    async fn test_fallbacks_to_site_name() {
        let services = nginx_with("*.example.com");
        let local = resolve(&site("shop1.localhost", None), &bench(None), &services).await;
        assert_eq!(
            local,
            ResolvedDomain::new("shop1.localhost", DomainSource::SiteNameDefault)
        );
        let disabled = bench(Some(DomainConfig {
            auto_detect: Some(false),
            ..Default::default()
        }));
        let resolved = resolve(&site("shop1", None), &disabled, &services).await;
        assert_eq!(resolved.source, DomainSource::SiteNameDefault);
        let nothing = resolve(&site("shop1", None), &bench(None), &StaticServices::default()).await;
        assert_eq!(nothing.domain, "shop1");
        let ip_only = resolve(&site("shop1", None), &bench(None), &nginx_with("10.0.0.5")).await;
        assert_eq!(ip_only.source, DomainSource::SiteNameDefault);
    }

    #[test]
    fn test_extract_suffix() {
        assert_eq!(extract_suffix("*.prod.example.com").as_deref(), Some(".example.com"));
        assert_eq!(extract_suffix("ingress.example.com").as_deref(), Some(".example.com"));
        assert_eq!(extract_suffix("example.com").as_deref(), Some(".example.com"));
        assert_eq!(extract_suffix(".example.com").as_deref(), Some(".example.com"));
        assert_eq!(extract_suffix("10.0.0.5"), None);
        assert_eq!(extract_suffix("fe80::1"), None);
        assert_eq!(extract_suffix("localhost"), None);
        assert_eq!(extract_suffix(""), None);
        let once = extract_suffix("*.prod.example.com").unwrap();
        assert_eq!(extract_suffix(&once), Some(once));
    }

    #[test]
    fn test_local_domains() {
        assert!(is_local_domain("localhost"));
        assert!(is_local_domain("shop.local"));
        assert!(is_local_domain("shop.localhost"));
        assert!(!is_local_domain("shop.locality.com"));
    }

    #[test]
    fn test_recorded_domain_requires_current_generation() {
        let mut site = site("shop1", None);
        site.metadata.generation = Some(3);
        site.status = Some(FrappeSiteStatus {
            phase: Some(SitePhase::Ready),
            resolved_domain: Some("shop1.example.com".into()),
            domain_source: Some(DomainSource::AutoDetected),
            observed_generation: Some(3),
            ..Default::default()
        });
        assert_eq!(
            ResolvedDomain::recorded(&site),
            Some(ResolvedDomain::new(
                "shop1.example.com",
                DomainSource::AutoDetected
            ))
        );
        site.metadata.generation = Some(4);
        assert_eq!(ResolvedDomain::recorded(&site), None);
    }
}
