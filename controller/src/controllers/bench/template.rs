//! Object templates shared by the bench components.

use std::collections::BTreeMap;

use frappe_operator::k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use frappe_operator::k8s_openapi::api::core::v1::{
    Container, ContainerPort, LocalObjectReference, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use frappe_operator::k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use frappe_operator::k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use frappe_operator::kube::api::ObjectMeta;
use frappe_operator::label::{BENCH, COMPONENT};
use frappe_operator::prelude::*;
use frappe_operator::{
    ComponentResources, CpuUnit, FrappeBench, Labels, Quantity, ResourceBounds, StorageUnit,
};

use crate::autoscaling::WorkerType;
use crate::config::Config;
use crate::resources::{ResourceRequirement, Resources};

pub const SITES_VOLUME: &str = "sites";
pub const SITES_PATH: &str = "/home/frappe/frappe-bench/sites";
pub const BENCH_PATH: &str = "/home/frappe/frappe-bench";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    RedisCache,
    RedisQueue,
    Gunicorn,
    Nginx,
    Socketio,
    Scheduler,
    Worker(WorkerType),
}

impl Component {
    /// Value of the component label, also the suffix of the object names.
    pub fn label(self) -> String {
        match self {
            Self::RedisCache => "redis-cache".into(),
            Self::RedisQueue => "redis-queue".into(),
            Self::Gunicorn => "gunicorn".into(),
            Self::Nginx => "nginx".into(),
            Self::Socketio => "socketio".into(),
            Self::Scheduler => "scheduler".into(),
            Self::Worker(worker) => format!("worker-{worker}"),
        }
    }

    pub fn object_name(self, bench: &str) -> String {
        format!("{bench}-{}", self.label())
    }

    fn default_resources(self) -> Resources {
        let (request_cpu, request_memory, limit_cpu, limit_memory) = match self {
            Self::RedisCache | Self::RedisQueue | Self::Socketio | Self::Scheduler => (
                Quantity::new(200, CpuUnit::Milli),
                Quantity::new(512, StorageUnit::Mi),
                Quantity::new(1, CpuUnit::Core),
                Quantity::new(2, StorageUnit::Gi),
            ),
            Self::Gunicorn | Self::Worker(_) => (
                Quantity::new(500, CpuUnit::Milli),
                Quantity::new(1, StorageUnit::Gi),
                Quantity::new(2, CpuUnit::Core),
                Quantity::new(4, StorageUnit::Gi),
            ),
            Self::Nginx => (
                Quantity::new(200, CpuUnit::Milli),
                Quantity::new(256, StorageUnit::Mi),
                Quantity::new(1, CpuUnit::Core),
                Quantity::new(512, StorageUnit::Mi),
            ),
        };
        Resources {
            requests: ResourceRequirement::compute(request_cpu, request_memory),
            limits: ResourceRequirement::compute(limit_cpu, limit_memory),
        }
    }

    fn bounds(self, bench: &FrappeBench) -> Option<&ResourceBounds> {
        if let Self::RedisCache | Self::RedisQueue = self {
            return bench
                .spec
                .redis_config
                .as_ref()
                .and_then(|redis| redis.resources.as_ref());
        }
        let ComponentResources {
            gunicorn,
            nginx,
            scheduler,
            socketio,
            worker_default,
            worker_long,
            worker_short,
        } = bench.spec.component_resources.as_ref()?;
        match self {
            Self::Gunicorn => gunicorn.as_ref(),
            Self::Nginx => nginx.as_ref(),
            Self::Socketio => socketio.as_ref(),
            Self::Scheduler => scheduler.as_ref(),
            Self::Worker(WorkerType::Default) => worker_default.as_ref(),
            Self::Worker(WorkerType::Long) => worker_long.as_ref(),
            Self::Worker(WorkerType::Short) => worker_short.as_ref(),
            Self::RedisCache | Self::RedisQueue => None,
        }
    }

    pub fn resources(self, bench: &FrappeBench) -> Resources {
        self.default_resources().with_bounds(self.bounds(bench))
    }
}

pub fn bench_labels(bench: &FrappeBench) -> Labels {
    Labels::new().with(BENCH, bench.name_any())
}

pub fn component_labels(bench: &FrappeBench, component: Component) -> Labels {
    bench_labels(bench).with(COMPONENT, component.label())
}

/// `repository[:tag]` from the bench's image config, otherwise the default
/// image tagged with the Frappe version.
pub fn image(bench: &FrappeBench, config: &Config) -> String {
    let image_config = bench.spec.image_config.as_ref();
    match image_config.and_then(|image| image.repository.as_deref()) {
        Some(repository) if !repository.is_empty() => {
            match image_config.and_then(|image| image.tag.as_deref()) {
                Some(tag) if !tag.is_empty() => format!("{repository}:{tag}"),
                _ => repository.to_string(),
            }
        }
        _ => format!("{}:{}", config.default_image, bench.spec.frappe_version),
    }
}

pub fn pull_policy(bench: &FrappeBench) -> Option<String> {
    bench
        .spec
        .image_config
        .as_ref()
        .and_then(|image| image.pull_policy.clone())
}

pub fn pull_secrets(bench: &FrappeBench) -> Option<Vec<LocalObjectReference>> {
    let secrets = &bench.spec.image_config.as_ref()?.pull_secrets;
    if secrets.is_empty() {
        return None;
    }
    Some(
        secrets
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect(),
    )
}

pub fn sites_claim(bench: &str) -> String {
    format!("{bench}-sites")
}

pub fn sites_volume(bench: &str) -> Volume {
    Volume {
        name: SITES_VOLUME.into(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: sites_claim(bench),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn sites_mount() -> VolumeMount {
    VolumeMount {
        name: SITES_VOLUME.into(),
        mount_path: SITES_PATH.into(),
        ..Default::default()
    }
}

pub fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.into()),
        container_port: port,
        ..Default::default()
    }
}

/// A container running the bench image with the sites volume mounted.
pub fn bench_container(
    bench: &FrappeBench,
    config: &Config,
    name: &str,
    component: Component,
) -> Container {
    Container {
        name: name.into(),
        image: Some(image(bench, config)),
        image_pull_policy: pull_policy(bench),
        resources: component.resources(bench).into(),
        volume_mounts: Some(vec![sites_mount()]),
        ..Default::default()
    }
}

pub fn service(
    bench: &FrappeBench,
    component: Component,
    port_name: &str,
    port: i32,
) -> frappe_operator::Result<Service> {
    let labels: BTreeMap<String, String> = component_labels(bench, component).into();
    Ok(Service {
        metadata: bench.owned_meta(component.object_name(bench.name()?), labels.clone())?,
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some(port_name.into()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub fn deployment(
    bench: &FrappeBench,
    component: Component,
    replicas: i32,
    container: Container,
    annotations: Option<BTreeMap<String, String>>,
) -> frappe_operator::Result<Deployment> {
    let labels: BTreeMap<String, String> = component_labels(bench, component).into();
    let mut metadata = bench.owned_meta(component.object_name(bench.name()?), labels.clone())?;
    metadata.annotations = annotations;
    Ok(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
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
                    containers: vec![container],
                    image_pull_secrets: pull_secrets(bench),
                    volumes: Some(vec![sites_volume(bench.name()?)]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}
