use std::collections::BTreeMap;

use frappe_operator::k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use frappe_operator::k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Service};
use frappe_operator::k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use frappe_operator::kube::api::ObjectMeta;
use frappe_operator::prelude::*;
use frappe_operator::{FrappeBench, RedisKind};

use crate::command::cmd;
use crate::context::Context;
use crate::error::{Error, Result};

use super::BenchReconciler;
use super::template::{self, Component};

const REDIS_PORT: i32 = 6379;
const DRAGONFLY_IMAGE: &str = "docker.dragonflydb.io/dragonflydb/dragonfly";

fn redis_image(bench: &FrappeBench, config: &crate::Config) -> String {
    let redis = bench.spec.redis_config.as_ref();
    if let Some(image) = redis
        .and_then(|redis| redis.image.as_deref())
        .filter(|image| !image.is_empty())
    {
        return image.to_string();
    }
    match redis.map(|redis| redis.kind).unwrap_or_default() {
        RedisKind::Redis => config.redis_image.clone(),
        RedisKind::Dragonfly => DRAGONFLY_IMAGE.to_string(),
    }
}

fn redis_args(bench: &FrappeBench) -> Vec<String> {
    let redis = bench.spec.redis_config.as_ref();
    let max_memory = redis.and_then(|redis| redis.max_memory.as_ref());
    match redis.map(|redis| redis.kind).unwrap_or_default() {
        RedisKind::Redis => {
            let mut args = cmd!["redis-server"];
            if let Some(bytes) = max_memory.and_then(|memory| memory.as_bytes()) {
                args.extend(cmd!["--maxmemory", bytes]);
            }
            args
        }
        RedisKind::Dragonfly => {
            let mut args = cmd!["--logtostderr"];
            if let Some(memory) = max_memory {
                args.push(format!("--maxmemory={memory}"));
            }
            args
        }
    }
}

pub(crate) fn stateful_set(
    bench: &FrappeBench,
    config: &crate::Config,
    component: Component,
) -> frappe_operator::Result<StatefulSet> {
    let name = component.object_name(bench.name()?);
    let labels: BTreeMap<String, String> = template::component_labels(bench, component).into();
    Ok(StatefulSet {
        metadata: bench.owned_meta(&name, labels.clone())?,
        spec: Some(StatefulSetSpec {
            service_name: Some(name),
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "redis".into(),
                        image: Some(redis_image(bench, config)),
                        args: Some(redis_args(bench)),
                        ports: Some(vec![template::container_port("redis", REDIS_PORT)]),
                        resources: component.resources(bench).into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

impl BenchReconciler {
    pub(crate) async fn apply_redis(&self, ctx: &Context, bench: &FrappeBench) -> Result<()> {
        let namespace = bench.require_namespace()?;
        for component in [Component::RedisCache, Component::RedisQueue] {
            let service = template::service(bench, component, "redis", REDIS_PORT)?;
            let name = service.name()?.to_string();
            ctx.api_namespaced::<Service>(namespace)
                .get_or_create(&service)
                .await
                .map_err(Error::context(format!("service/{name}"), "create"))?;
            let stateful_set = stateful_set(bench, &ctx.config, component)?;
            ctx.api_namespaced::<StatefulSet>(namespace)
                .get_or_create(&stateful_set)
                .await
                .map_err(Error::context(format!("statefulset/{name}"), "create"))?;
        }
        Ok(())
    }
}
