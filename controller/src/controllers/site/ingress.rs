use std::collections::BTreeMap;

use frappe_operator::k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use frappe_operator::label::{BENCH, SITE};
use frappe_operator::prelude::*;
use frappe_operator::{FrappeBench, FrappeSite, Labels};

use crate::controllers::bench::NGINX_PORT;
use crate::controllers::bench::template::Component;

const BODY_SIZE_ANNOTATION: &str = "nginx.ingress.kubernetes.io/proxy-body-size";
const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";

pub(crate) fn ingress_name(site: &FrappeSite) -> frappe_operator::Result<String> {
    Ok(format!("{}-ingress", site.name()?))
}

/// `ingressClassName` wins over `ingress.className`, which wins over the
/// operator default.
pub(crate) fn ingress_class<'a>(site: &'a FrappeSite, default: &'a str) -> &'a str {
    site.spec
        .ingress_class_name
        .as_deref()
        .or_else(|| {
            site.spec
                .ingress
                .as_ref()
                .and_then(|ingress| ingress.class_name.as_deref())
        })
        .filter(|class| !class.is_empty())
        .unwrap_or(default)
}

fn annotations(site: &FrappeSite) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([(BODY_SIZE_ANNOTATION.to_string(), "100m".to_string())]);
    if let Some(issuer) = site
        .tls()
        .filter(|tls| tls.enabled)
        .and_then(|tls| tls.issuer.as_deref())
        .filter(|issuer| !issuer.is_empty())
    {
        annotations.insert(CLUSTER_ISSUER_ANNOTATION.to_string(), issuer.to_string());
    }
    if let Some(ingress) = site.spec.ingress.as_ref() {
        annotations.extend(ingress.annotations.clone());
    }
    annotations
}

fn tls(site: &FrappeSite, domain: &str) -> frappe_operator::Result<Option<Vec<IngressTLS>>> {
    let Some(tls) = site.tls().filter(|tls| tls.enabled) else {
        return Ok(None);
    };
    let secret_name = match tls.secret_name.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("{}-tls", site.name()?),
    };
    Ok(Some(vec![IngressTLS {
        hosts: Some(vec![domain.to_string()]),
        secret_name: Some(secret_name),
    }]))
}

pub(crate) fn ingress(
    site: &FrappeSite,
    bench: &FrappeBench,
    domain: &str,
    class: &str,
) -> frappe_operator::Result<Ingress> {
    let labels = Labels::new()
        .with(SITE, site.name()?)
        .with(BENCH, bench.name()?);
    let mut metadata = site.owned_meta(ingress_name(site)?, labels.into())?;
    metadata.annotations = Some(annotations(site));
    Ok(Ingress {
        metadata,
        spec: Some(IngressSpec {
            ingress_class_name: Some(class.to_string()),
            rules: Some(vec![IngressRule {
                host: Some(domain.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".into()),
                        path_type: "Prefix".into(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: Component::Nginx.object_name(bench.name()?),
                                port: Some(ServiceBackendPort {
                                    number: Some(NGINX_PORT),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: tls(site, domain)?,
            ..Default::default()
        }),
        ..Default::default()
    })
}
