//! Cluster-wide bench defaults kept in the operator's ConfigMap.

use frappe_operator::k8s_openapi::api::core::v1::ConfigMap;
use frappe_operator::{FpmRepository, FrappeBench};

use crate::context::Context;

const GIT_ENABLED_KEY: &str = "gitEnabled";
const FPM_REPOSITORIES_KEY: &str = "fpmRepositories";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatorConfig {
    pub git_enabled: Option<bool>,
    pub fpm_repositories: Vec<FpmRepository>,
}

impl OperatorConfig {
    pub fn from_config_map(config_map: &ConfigMap) -> Self {
        let Some(data) = config_map.data.as_ref() else {
            return Self::default();
        };
        let git_enabled = data
            .get(GIT_ENABLED_KEY)
            .map(|value| value.trim().eq_ignore_ascii_case("true"));
        let fpm_repositories = match data.get(FPM_REPOSITORIES_KEY) {
            Some(json) => serde_json::from_str(json).unwrap_or_else(|err| {
                tracing::warn!("Ignoring malformed {FPM_REPOSITORIES_KEY} in operator config: {err}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self {
            git_enabled,
            fpm_repositories,
        }
    }

    /// Reads the operator ConfigMap. A missing or unreadable map yields the
    /// defaults.
    pub async fn load(ctx: &Context) -> Self {
        let api = ctx.api_namespaced::<ConfigMap>(&ctx.config.operator_namespace);
        match api.get_opt(&ctx.config.operator_config_map).await {
            Ok(Some(config_map)) => Self::from_config_map(&config_map),
            Ok(None) => {
                tracing::debug!(
                    "Operator config {}/{} not found, using defaults",
                    ctx.config.operator_namespace,
                    ctx.config.operator_config_map
                );
                Self::default()
            }
            Err(err) => {
                tracing::warn!("Could not read operator config, using defaults: {err}");
                Self::default()
            }
        }
    }

    /// The bench's own setting wins over the operator-wide one.
    pub fn git_enabled(&self, bench: &FrappeBench) -> bool {
        bench
            .spec
            .git_config
            .as_ref()
            .and_then(|git| git.enabled)
            .or(self.git_enabled)
            .unwrap_or(false)
    }

    /// Operator repositories first, then the bench's.
    pub fn repositories<'a>(&'a self, bench: &'a FrappeBench) -> Vec<&'a FpmRepository> {
        let bench_repositories = bench
            .spec
            .fpm_config
            .iter()
            .flat_map(|fpm| fpm.repositories.iter());
        self.fpm_repositories.iter().chain(bench_repositories).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappe_operator::{FpmConfig, FrappeBenchSpec, GitConfig};

    fn config_map(entries: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            data: Some(
                entries
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn bench(git: Option<bool>, repositories: Vec<FpmRepository>) -> FrappeBench {
        FrappeBench::new(
            "erp",
            FrappeBenchSpec {
                frappe_version: "version-15".into(),
                git_config: git.map(|enabled| GitConfig {
                    enabled: Some(enabled),
                }),
                fpm_config: Some(FpmConfig {
                    repositories,
                    default_repo: None,
                }),
                ..Default::default()
            },
        )
    }

    fn repository(name: &str) -> FpmRepository {
        FpmRepository {
            name: name.into(),
            url: format!("https://{name}.example.com"),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_config_map() {
        assert_eq!(
            OperatorConfig::from_config_map(&ConfigMap::default()),
            OperatorConfig::default()
        );
    }

    #[test]
    fn test_parse_config_map() {
        let config = OperatorConfig::from_config_map(&config_map(&[
            ("gitEnabled", "True"),
            (
                "fpmRepositories",
                r#"[{"name": "central", "url": "https://fpm.example.com", "priority": 10}]"#,
            ),
        ]));
        assert_eq!(config.git_enabled, Some(true));
        assert_eq!(config.fpm_repositories.len(), 1);
        assert_eq!(config.fpm_repositories[0].priority, Some(10));
    }

    #[test]
    fn test_malformed_repositories_are_ignored() {
        let config = OperatorConfig::from_config_map(&config_map(&[
            ("gitEnabled", "no"),
            ("fpmRepositories", "not json"),
        ]));
        assert_eq!(config.git_enabled, Some(false));
        assert!(config.fpm_repositories.is_empty());
    }

    #[test]
    fn test_git_enabled_precedence() {
        let operator = OperatorConfig {
            git_enabled: Some(true),
            ..Default::default()
        };
        assert!(operator.git_enabled(&bench(None, vec![])));
        assert!(!operator.git_enabled(&bench(Some(false), vec![])));
        assert!(!OperatorConfig::default().git_enabled(&bench(None, vec![])));
    }

    #[test]
    fn test_repositories_operator_first() {
        let operator = OperatorConfig {
            fpm_repositories: vec![repository("central")],
            ..Default::default()
        };
        let bench = bench(None, vec![repository("private")]);
        let names: Vec<_> = operator
            .repositories(&bench)
            .into_iter()
            .map(|repository| repository.name.as_str())
            .collect();
        assert_eq!(names, vec!["central", "private"]);
    }
}
