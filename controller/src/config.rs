use serde::{Deserialize, Serialize};

fn default_manager_name() -> String {
    "frappe-operator".to_string()
}

fn default_operator_namespace() -> String {
    "frappe-operator-system".to_string()
}

fn default_operator_config_map() -> String {
    "frappe-operator-config".to_string()
}

fn default_image() -> String {
    "frappe/erpnext".to_string()
}

fn default_redis_image() -> String {
    "redis:7-alpine".to_string()
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

fn default_storage_fallback_grace_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub namespace: Option<String>,
    /// Also used as the field manager for every write.
    #[serde(default = "default_manager_name")]
    pub name: String,
    #[serde(default = "default_operator_namespace")]
    pub operator_namespace: String,
    #[serde(default = "default_operator_config_map")]
    pub operator_config_map: String,
    /// Repository used when a bench has no `imageConfig`; tagged with the bench's frappe version.
    #[serde(default = "default_image")]
    pub default_image: String,
    #[serde(default = "default_redis_image")]
    pub redis_image: String,
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,
    /// How long a ReadWriteMany claim may stay pending before falling back to ReadWriteOnce.
    #[serde(default = "default_storage_fallback_grace_secs")]
    pub storage_fallback_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            name: default_manager_name(),
            operator_namespace: default_operator_namespace(),
            operator_config_map: default_operator_config_map(),
            default_image: default_image(),
            redis_image: default_redis_image(),
            ingress_class: default_ingress_class(),
            storage_fallback_grace_secs: default_storage_fallback_grace_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, config::ConfigError> {
        Self::from_env(config::Environment::with_prefix("FRAPPE"))
    }

    fn from_env(env: config::Environment) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
