use frappe_operator::k8s_openapi::api::apps::v1::Deployment;
use frappe_operator::k8s_openapi::api::core::v1::{Container, EnvVar, Service};
use frappe_operator::prelude::*;
use frappe_operator::{ComponentReplicas, FrappeBench};

use crate::command::cmd;
use crate::context::Context;
use crate::error::{Error, Result};

use super::BenchReconciler;
use super::template::{self, Component};

pub(crate) const GUNICORN_PORT: i32 = 8000;
pub(crate) const NGINX_PORT: i32 = 8080;
pub(crate) const SOCKETIO_PORT: i32 = 9000;

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Replicas of a web component: the legacy count when positive, else one.
fn web_replicas(bench: &FrappeBench, component: Component) -> i32 {
    let replicas = bench.spec.component_replicas.as_ref();
    let configured = replicas.and_then(|replicas: &ComponentReplicas| match component {
        Component::Gunicorn => replicas.gunicorn,
        Component::Nginx => replicas.nginx,
        Component::Socketio => replicas.socketio,
        _ => None,
    });
    configured.filter(|replicas| *replicas > 0).unwrap_or(1)
}

pub(crate) fn web_container(
    bench: &FrappeBench,
    config: &crate::Config,
    component: Component,
) -> frappe_operator::Result<Container> {
    let name = bench.name()?;
    let mut container = template::bench_container(bench, config, &component.label(), component);
    match component {
        Component::Gunicorn => {
            container.ports = Some(vec![template::container_port("http", GUNICORN_PORT)]);
        }
        Component::Nginx => {
            container.args = Some(cmd!["nginx-entrypoint.sh"]);
            container.ports = Some(vec![template::container_port("http", NGINX_PORT)]);
            container.env = Some(vec![
                env(
                    "BACKEND",
                    format!("{}:{GUNICORN_PORT}", Component::Gunicorn.object_name(name)),
                ),
                env(
                    "SOCKETIO",
                    format!("{}:{SOCKETIO_PORT}", Component::Socketio.object_name(name)),
                ),
                env("UPSTREAM_REAL_IP_ADDRESS", "127.0.0.1"),
                env("UPSTREAM_REAL_IP_RECURSIVE", "off"),
                env("UPSTREAM_REAL_IP_HEADER", "X-Forwarded-For"),
                env("FRAPPE_SITE_NAME_HEADER", "$host"),
            ]);
        }
        Component::Socketio => {
            container.args = Some(cmd![
                "node",
                format!("{}/apps/frappe/socketio.js", template::BENCH_PATH)
            ]);
            container.ports = Some(vec![template::container_port("socketio", SOCKETIO_PORT)]);
        }
        Component::Scheduler => {
            container.args = Some(cmd!["bench", "schedule"]);
        }
        _ => {}
    }
    Ok(container)
}

impl BenchReconciler {
    async fn apply_component(
        &self,
        ctx: &Context,
        bench: &FrappeBench,
        component: Component,
        replicas: i32,
        port: Option<(&str, i32)>,
    ) -> Result<()> {
        let namespace = bench.require_namespace()?;
        let name = component.object_name(bench.name()?);
        if let Some((port_name, port)) = port {
            let service = template::service(bench, component, port_name, port)?;
            ctx.api_namespaced::<Service>(namespace)
                .get_or_create(&service)
                .await
                .map_err(Error::context(format!("service/{name}"), "create"))?;
        }
        let container = web_container(bench, &ctx.config, component)?;
        let deployment = template::deployment(bench, component, replicas, container, None)?;
        let ensured = ctx
            .api_namespaced::<Deployment>(namespace)
            .get_or_create(&deployment)
            .await
            .map_err(Error::context(format!("deployment/{name}"), "create"))?;
        if ensured.created() {
            tracing::info!("Created deployment {name} with {replicas} replicas");
        }
        Ok(())
    }

    pub(crate) async fn apply_web(&self, ctx: &Context, bench: &FrappeBench) -> Result<()> {
        for (component, port) in [
            (Component::Gunicorn, ("http", GUNICORN_PORT)),
            (Component::Nginx, ("http", NGINX_PORT)),
            (Component::Socketio, ("socketio", SOCKETIO_PORT)),
        ] {
            let replicas = web_replicas(bench, component);
            self.apply_component(ctx, bench, component, replicas, Some(port))
                .await?;
        }
        Ok(())
    }

    pub(crate) async fn apply_scheduler(&self, ctx: &Context, bench: &FrappeBench) -> Result<()> {
        self.apply_component(ctx, bench, Component::Scheduler, 1, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappe_operator::FrappeBenchSpec;

    fn bench(component_replicas: Option<ComponentReplicas>) -> FrappeBench {
        let mut bench = FrappeBench::new(
            "erp",
            FrappeBenchSpec {
                frappe_version: "version-15".into(),
                component_replicas,
                ..Default::default()
            },
        );
        bench.metadata.namespace = Some("tenants".into());
        bench.metadata.uid = Some("bench-uid".into());
        bench
    }

    fn env_value<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
        container
            .env
            .as_ref()?
            .iter()
            .find(|var| var.name == name)?
            .value
            .as_deref()
    }

    #[test]
    fn test_web_replicas() {
        assert_eq!(web_replicas(&bench(None), Component::Gunicorn), 1);
        let scaled = bench(Some(ComponentReplicas {
            gunicorn: Some(3),
            nginx: Some(0),
            ..Default::default()
        }));
        assert_eq!(web_replicas(&scaled, Component::Gunicorn), 3);
        assert_eq!(web_replicas(&scaled, Component::Nginx), 1);
        assert_eq!(web_replicas(&scaled, Component::Socketio), 1);
    }

    #[test]
    fn test_nginx_points_at_backends() {
        let container =
            web_container(&bench(None), &crate::Config::default(), Component::Nginx).unwrap();
        assert_eq!(container.name, "nginx");
        assert_eq!(container.args, Some(cmd!["nginx-entrypoint.sh"]));
        assert_eq!(env_value(&container, "BACKEND"), Some("erp-gunicorn:8000"));
        assert_eq!(env_value(&container, "SOCKETIO"), Some("erp-socketio:9000"));
        assert_eq!(env_value(&container, "FRAPPE_SITE_NAME_HEADER"), Some("$host"));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, NGINX_PORT);
    }

    #[test]
    fn test_process_commands() {
        let config = crate::Config::default();
        let socketio = web_container(&bench(None), &config, Component::Socketio).unwrap();
        assert_eq!(
            socketio.args,
            Some(cmd!["node", "/home/frappe/frappe-bench/apps/frappe/socketio.js"])
        );
        let scheduler = web_container(&bench(None), &config, Component::Scheduler).unwrap();
        assert_eq!(scheduler.args, Some(cmd!["bench", "schedule"]));
        assert!(scheduler.ports.is_none());
        let gunicorn = web_container(&bench(None), &config, Component::Gunicorn).unwrap();
        assert!(gunicorn.args.is_none());
    }
}
