use frappe_operator::k8s_openapi::api::batch::v1::{Job, JobSpec};
use frappe_operator::k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use frappe_operator::prelude::*;
use frappe_operator::FrappeBench;

use crate::command::cmd;
use crate::context::Context;
use crate::error::{Error, Result};

use super::BenchReconciler;
use super::template::{self, BENCH_PATH, Component};

fn common_site_config(bench: &str) -> serde_json::Value {
    serde_json::json!({
        "redis_cache": format!("redis://{}:6379", Component::RedisCache.object_name(bench)),
        "redis_queue": format!("redis://{}:6379", Component::RedisQueue.object_name(bench)),
        "socketio_port": 9000,
    })
}

fn init_script(bench: &str) -> Result<String> {
    let config = serde_json::to_string_pretty(&common_site_config(bench))
        .map_err(frappe_operator::Error::from)?;
    Ok(format!(
        r#"set -e
cd {path}
echo "Configuring bench"
ls -1 apps > sites/apps.txt
cat > sites/common_site_config.json <<'EOF'
{config}
EOF
echo "Building assets"
bench build --production
"#,
        path = shlex::try_quote(BENCH_PATH)?,
    ))
}

pub(crate) fn init_job(bench: &FrappeBench, config: &crate::Config) -> Result<Job> {
    let name = bench.name()?;
    let mut container = template::bench_container(bench, config, "bench-init", Component::Gunicorn);
    container.resources = None;
    container.command = Some(cmd!["bash", "-c"]);
    container.args = Some(vec![init_script(name)?]);
    Ok(Job {
        metadata: bench.owned_meta(format!("{name}-init"), template::bench_labels(bench).into())?,
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![container],
                    image_pull_secrets: template::pull_secrets(bench),
                    volumes: Some(vec![template::sites_volume(name)]),
                    restart_policy: Some("Never".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

impl BenchReconciler {
    pub(crate) async fn apply_init_job(&self, ctx: &Context, bench: &FrappeBench) -> Result<()> {
        let job = init_job(bench, &ctx.config)?;
        let name = job.name()?.to_string();
        let ensured = ctx
            .api_namespaced::<Job>(bench.require_namespace()?)
            .get_or_create(&job)
            .await
            .map_err(Error::context(format!("job/{name}"), "create"))?;
        if ensured.created() {
            tracing::info!("Created bench init job {name}");
        }
        Ok(())
    }
}
