use frappe_operator::k8s_openapi::api::batch::v1::{Job, JobSpec};
use frappe_operator::k8s_openapi::api::core::v1::{EnvVar, PodSpec, PodTemplateSpec};
use frappe_operator::label::{BENCH, SITE};
use frappe_operator::prelude::*;
use frappe_operator::{FrappeBench, FrappeSite, Labels};

use crate::command::cmd;
use crate::controllers::bench::template::{self, Component};
use crate::database::{DatabaseCredentials, DatabaseInfo};

/// Values reach the script only through the environment, never through
/// string interpolation.
const INIT_SCRIPT: &str = r#"set -e
cd /home/frappe/frappe-bench

for var in SITE_NAME DOMAIN ADMIN_PASSWORD BENCH_NAME DB_PROVIDER; do
    if [[ -z "${!var}" ]]; then
        echo "ERROR: $var is not set"
        exit 1
    fi
done

echo "Creating site $SITE_NAME for $DOMAIN"
case "$DB_PROVIDER" in
    mariadb|postgres)
        for var in DB_HOST DB_PORT DB_NAME DB_USER DB_PASSWORD; do
            if [[ -z "${!var}" ]]; then
                echo "ERROR: $var is not set for $DB_PROVIDER"
                exit 1
            fi
        done
        bench new-site "$SITE_NAME" \
            --db-type="$DB_PROVIDER" \
            --db-name="$DB_NAME" \
            --db-host="$DB_HOST" \
            --db-port="$DB_PORT" \
            --db-user="$DB_USER" \
            --db-password="$DB_PASSWORD" \
            --no-setup-db \
            --admin-password="$ADMIN_PASSWORD" \
            --verbose
        ;;
    sqlite)
        bench new-site "$SITE_NAME" \
            --db-type=sqlite \
            --admin-password="$ADMIN_PASSWORD" \
            --verbose
        ;;
    *)
        echo "ERROR: unsupported database provider $DB_PROVIDER"
        exit 1
        ;;
esac

for app in $APPS; do
    if [[ "$app" != "frappe" ]]; then
        bench --site "$SITE_NAME" install-app "$app"
    fi
done

python3 <<'EOF'
import json
import os

site_name = os.environ["SITE_NAME"]
bench_name = os.environ["BENCH_NAME"]
path = f"/home/frappe/frappe-bench/sites/{site_name}/site_config.json"
with open(path) as f:
    config = json.load(f)
config["host_name"] = os.environ["DOMAIN"]
config["redis_cache"] = f"redis://{bench_name}-redis-cache:6379"
config["redis_queue"] = f"redis://{bench_name}-redis-queue:6379"
with open(path, "w") as f:
    json.dump(config, f, indent=2)
EOF

echo "Site $SITE_NAME initialized"
"#;

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub(crate) fn job_name(site: &FrappeSite) -> frappe_operator::Result<String> {
    Ok(format!("{}-init", site.name()?))
}

pub(crate) struct SiteInit<'a> {
    pub site: &'a FrappeSite,
    pub bench: &'a FrappeBench,
    pub domain: &'a str,
    pub database: &'a DatabaseInfo,
    pub credentials: &'a DatabaseCredentials,
    pub admin_password: &'a str,
}

impl SiteInit<'_> {
    fn env(&self) -> frappe_operator::Result<Vec<EnvVar>> {
        Ok(vec![
            env("SITE_NAME", &self.site.spec.site_name),
            env("DOMAIN", self.domain),
            env("BENCH_NAME", self.bench.name()?),
            env("APPS", self.bench.app_names().join(" ")),
            env("DB_PROVIDER", self.database.provider.to_string()),
            env("DB_HOST", &self.database.host),
            env("DB_PORT", &self.database.port),
            env("DB_NAME", &self.database.name),
            env("DB_USER", &self.credentials.username),
            env("DB_PASSWORD", &self.credentials.password),
            env("ADMIN_PASSWORD", self.admin_password),
        ])
    }

    pub(crate) fn job(&self, config: &crate::Config) -> frappe_operator::Result<Job> {
        let bench_name = self.bench.name()?;
        let labels = Labels::new()
            .with(SITE, self.site.name()?)
            .with(BENCH, bench_name);
        let mut container =
            template::bench_container(self.bench, config, "site-init", Component::Gunicorn);
        container.resources = None;
        container.command = Some(cmd!["bash", "-c"]);
        container.args = Some(vec![INIT_SCRIPT.to_string()]);
        container.env = Some(self.env()?);
        Ok(Job {
            metadata: self.site.owned_meta(job_name(self.site)?, labels.into())?,
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![container],
                        image_pull_secrets: template::pull_secrets(self.bench),
                        volumes: Some(vec![template::sites_volume(bench_name)]),
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
}
