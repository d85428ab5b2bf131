//! MariaDB through the mariadb-operator `Database`, `User` and `Grant`
//! resources, or an external server reached with a connection secret.

use std::collections::BTreeMap;

use async_trait::async_trait;
use frappe_operator::k8s_openapi::api::core::v1::Secret;
use frappe_operator::kube::api::{ApiResource, DynamicObject};
use frappe_operator::kube::core::GroupVersionKind;
use frappe_operator::label::SITE;
use frappe_operator::prelude::*;
use frappe_operator::{DatabaseMode, FrappeSite, Labels, NamespacedName, Quantity, StorageUnit};
use serde_json::{Value, json};

use super::naming::{database_name, database_user};
use super::{DatabaseCredentials, DatabaseInfo, DatabaseKind, DatabaseProvider, ProviderError};
use crate::password;

const GROUP: &str = "k8s.mariadb.com";
const VERSION: &str = "v1alpha1";
const SHARED_SERVER: &str = "frappe-mariadb";
const PORT: u16 = 3306;
const PASSWORD_KEY: &str = "password";
const EXTERNAL_PASSWORD_KEYS: [&str; 3] = ["password", "rootPassword", "root-password"];

#[derive(Clone, Copy, Debug)]
enum Kind {
    MariaDb,
    Database,
    User,
    Grant,
}

impl Kind {
    fn resource(self) -> ApiResource {
        let (kind, plural) = match self {
            Self::MariaDb => ("MariaDB", "mariadbs"),
            Self::Database => ("Database", "databases"),
            Self::User => ("User", "users"),
            Self::Grant => ("Grant", "grants"),
        };
        ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(GROUP, VERSION, kind), plural)
    }
}

fn database_object(site: &FrappeSite) -> String {
    format!("{}-db", site.name_any())
}

fn user_object(site: &FrappeSite) -> String {
    format!("{}-user", site.name_any())
}

fn grant_object(site: &FrappeSite) -> String {
    format!("{}-grant", site.name_any())
}

fn password_secret(site: &FrappeSite) -> String {
    format!("{}-db-password", site.name_any())
}

/// Where the site's database lives.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Server {
    Operator { name: String, namespace: String },
    External(ExternalConnection),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ExternalConnection {
    host: String,
    port: String,
    username: String,
    password: String,
    secret_name: String,
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    let value = secret.data.as_ref()?.get(key)?;
    String::from_utf8(value.0.clone())
        .ok()
        .filter(|value| !value.is_empty())
}

impl ExternalConnection {
    fn from_secret(site: &FrappeSite, secret: &Secret) -> Result<Self, ProviderError> {
        let config = site.spec.db_config.clone().unwrap_or_default();
        let secret_name = secret.name_any();
        let host = config
            .host
            .filter(|host| !host.is_empty())
            .or_else(|| secret_value(secret, "host"))
            .ok_or_else(|| {
                ProviderError::Config(format!(
                    "connection secret {secret_name} has no host and dbConfig.host is unset"
                ))
            })?;
        let port = config
            .port
            .map(|port| port.to_string())
            .or_else(|| secret_value(secret, "port"))
            .unwrap_or_else(|| PORT.to_string());
        let password = EXTERNAL_PASSWORD_KEYS
            .iter()
            .find_map(|key| secret_value(secret, key))
            .ok_or_else(|| {
                ProviderError::Config(format!(
                    "connection secret {secret_name} needs one of {}",
                    EXTERNAL_PASSWORD_KEYS.join(", ")
                ))
            })?;
        Ok(Self {
            host,
            port,
            username: secret_value(secret, "username").unwrap_or_else(|| "root".into()),
            password,
            secret_name,
        })
    }
}

fn is_condition_ready(object: &DynamicObject) -> bool {
    object.data["status"]["conditions"]
        .as_array()
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition["type"] == "Ready" && condition["status"] == "True")
        })
}

fn server_ref(name: &str, namespace: &str) -> Value {
    json!({ "name": name, "namespace": namespace })
}

pub struct MariaDbProvider {
    client: frappe_operator::Client,
}

impl MariaDbProvider {
    pub fn new(client: frappe_operator::Client) -> Self {
        Self { client }
    }

    fn labels(site: &FrappeSite) -> BTreeMap<String, String> {
        Labels::new().with(SITE, site.name_any()).into()
    }

    fn owned_object(
        site: &FrappeSite,
        kind: Kind,
        name: String,
        spec: Value,
    ) -> Result<DynamicObject, ProviderError> {
        let mut object = DynamicObject::new(&name, &kind.resource()).data(json!({ "spec": spec }));
        object.metadata = site.owned_meta(name, Self::labels(site))?;
        Ok(object)
    }

    /// Creates `desired`, or replaces the live object when its spec drifted.
    async fn ensure_object(
        &self,
        namespace: &str,
        kind: Kind,
        mut desired: DynamicObject,
    ) -> Result<(), ProviderError> {
        let api = self.client.api_dynamic(namespace, &kind.resource());
        let name = desired.name()?.to_string();
        match api.get_opt(&name).await? {
            None => {
                api.create(&desired).await?;
                tracing::info!("Created {kind:?} {name}");
            }
            Some(existing) if existing.data["spec"] != desired.data["spec"] => {
                desired.metadata.resource_version = existing.metadata.resource_version;
                api.replace(&name, &desired).await?;
                tracing::info!("Updated {kind:?} {name}");
            }
            Some(_) => {}
        }
        Ok(())
    }

    async fn ensure_secret(
        &self,
        site: &FrappeSite,
        name: String,
        password: impl FnOnce() -> String,
    ) -> Result<(), ProviderError> {
        let api = self.client.api_namespaced::<Secret>(site.require_namespace()?);
        if api.get_opt(&name).await?.is_some() {
            return Ok(());
        }
        let secret = Secret {
            metadata: site.owned_meta(name, Self::labels(site))?,
            string_data: Some([(PASSWORD_KEY.to_string(), password())].into()),
            ..Default::default()
        };
        api.get_or_create(&secret).await?;
        Ok(())
    }

    async fn server(&self, site: &FrappeSite) -> Result<Server, ProviderError> {
        let namespace = site.require_namespace()?;
        let config = site.spec.db_config.clone().unwrap_or_default();
        if let Some(reference) = config.mariadb_ref.as_ref() {
            return Ok(Server::Operator {
                name: reference.name.clone(),
                namespace: reference.namespace_or(namespace).to_string(),
            });
        }
        match config.mode.unwrap_or_default() {
            DatabaseMode::Shared => {
                let api = self.client.api_dynamic(namespace, &Kind::MariaDb.resource());
                if api.get_opt(SHARED_SERVER).await?.is_none() {
                    return Err(ProviderError::Config(format!(
                        "shared MariaDB {SHARED_SERVER:?} not found in namespace {namespace:?}; \
                         create it or set dbConfig.mariadbRef"
                    )));
                }
                Ok(Server::Operator {
                    name: SHARED_SERVER.into(),
                    namespace: namespace.into(),
                })
            }
            DatabaseMode::Dedicated => self.dedicated_server(site).await,
            DatabaseMode::External => {
                let reference = config.connection_secret_ref.as_ref().ok_or_else(|| {
                    ProviderError::Config(
                        "external mode requires dbConfig.connectionSecretRef".into(),
                    )
                })?;
                let secret = self.connection_secret(reference, namespace).await?;
                Ok(Server::External(ExternalConnection::from_secret(site, &secret)?))
            }
        }
    }

    async fn connection_secret(
        &self,
        reference: &NamespacedName,
        namespace: &str,
    ) -> Result<Secret, ProviderError> {
        let namespace = reference.namespace_or(namespace);
        self.client
            .api_namespaced::<Secret>(namespace)
            .get_opt(&reference.name)
            .await?
            .ok_or_else(|| {
                ProviderError::SecretNotFound(format!("{namespace}/{}", reference.name))
            })
    }

    async fn dedicated_server(&self, site: &FrappeSite) -> Result<Server, ProviderError> {
        let namespace = site.require_namespace()?;
        let name = format!("{}-mariadb", site.name_any());
        let root_secret = format!("{name}-root");
        self.ensure_secret(site, root_secret.clone(), || password::alphanumeric(32))
            .await?;
        let storage = site
            .spec
            .db_config
            .as_ref()
            .and_then(|config| config.storage_size.clone())
            .unwrap_or_else(|| Quantity::new(10, StorageUnit::Gi));
        let server = Self::owned_object(
            site,
            Kind::MariaDb,
            name.clone(),
            json!({
                "rootPasswordSecretKeyRef": { "name": root_secret, "key": PASSWORD_KEY },
                "storage": { "size": storage.to_string() },
                "replicas": 1,
            }),
        )?;
        let api = self.client.api_dynamic(namespace, &Kind::MariaDb.resource());
        if api.get_or_create(&server).await?.created() {
            tracing::info!("Created dedicated MariaDB {name}");
        }
        Ok(Server::Operator {
            name,
            namespace: namespace.into(),
        })
    }
}

#[async_trait]
impl DatabaseProvider for MariaDbProvider {
    async fn ensure_database(&self, site: &FrappeSite) -> Result<DatabaseInfo, ProviderError> {
        let namespace = site.require_namespace()?;
        let name = database_name(namespace, site.name()?, &site.spec.site_name);
        let (server, server_namespace) = match self.server(site).await? {
            Server::External(connection) => {
                return Ok(DatabaseInfo {
                    host: connection.host,
                    port: connection.port,
                    name,
                    provider: DatabaseKind::MariaDb,
                });
            }
            Server::Operator { name, namespace } => (name, namespace),
        };
        let user = database_user(site.name()?);
        tracing::info!("Using MariaDB {server_namespace}/{server} for database {name}");
        let mariadb_ref = server_ref(&server, &server_namespace);

        let database = Self::owned_object(
            site,
            Kind::Database,
            database_object(site),
            json!({
                "mariaDbRef": mariadb_ref,
                "name": name,
                "characterSet": "utf8mb4",
                "collate": "utf8mb4_unicode_ci",
            }),
        )?;
        self.ensure_object(namespace, Kind::Database, database).await?;

        let secret = password_secret(site);
        self.ensure_secret(site, secret.clone(), || password::hex_token(16))
            .await?;
        let user_object = Self::owned_object(
            site,
            Kind::User,
            user_object(site),
            json!({
                "mariaDbRef": mariadb_ref,
                "name": user,
                "passwordSecretKeyRef": { "name": secret, "key": PASSWORD_KEY },
                "maxUserConnections": 100,
            }),
        )?;
        self.ensure_object(namespace, Kind::User, user_object).await?;

        let grant = Self::owned_object(
            site,
            Kind::Grant,
            grant_object(site),
            json!({
                "mariaDbRef": mariadb_ref,
                "privileges": ["ALL PRIVILEGES"],
                "database": name,
                "table": "*",
                "username": user,
                "grantOption": true,
            }),
        )?;
        self.ensure_object(namespace, Kind::Grant, grant).await?;

        Ok(DatabaseInfo {
            host: format!("{server}.{server_namespace}.svc.cluster.local"),
            port: PORT.to_string(),
            name,
            provider: DatabaseKind::MariaDb,
        })
    }

    async fn is_ready(&self, site: &FrappeSite) -> Result<bool, ProviderError> {
        if let Server::External(_) = self.server(site).await? {
            return Ok(true);
        }
        let namespace = site.require_namespace()?;
        for (kind, name) in [
            (Kind::Database, database_object(site)),
            (Kind::User, user_object(site)),
            (Kind::Grant, grant_object(site)),
        ] {
            let api = self.client.api_dynamic(namespace, &kind.resource());
            let Some(object) = api.get_opt(&name).await? else {
                return Ok(false);
            };
            if !is_condition_ready(&object) {
                tracing::info!("{kind:?} {name} is not ready yet");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn get_credentials(
        &self,
        site: &FrappeSite,
    ) -> Result<DatabaseCredentials, ProviderError> {
        if let Server::External(connection) = self.server(site).await? {
            return Ok(DatabaseCredentials {
                username: connection.username,
                password: connection.password,
                secret_name: Some(connection.secret_name),
            });
        }
        let namespace = site.require_namespace()?;
        let user = self
            .client
            .api_dynamic(namespace, &Kind::User.resource())
            .get(&user_object(site))
            .await?;
        let spec = &user.data["spec"];
        let (Some(username), Some(secret_name), Some(key)) = (
            spec["name"].as_str(),
            spec["passwordSecretKeyRef"]["name"].as_str(),
            spec["passwordSecretKeyRef"]["key"].as_str(),
        ) else {
            return Err(ProviderError::Config(format!(
                "user {} has no password secret reference",
                user.name_any()
            )));
        };
        let secret = self
            .client
            .api_namespaced::<Secret>(namespace)
            .get(secret_name)
            .await?;
        let password = secret_value(&secret, key).ok_or_else(|| {
            ProviderError::Config(format!("key {key:?} not found in secret {secret_name}"))
        })?;
        Ok(DatabaseCredentials {
            username: username.to_string(),
            password,
            secret_name: Some(secret_name.to_string()),
        })
    }

    /// Owner references remove everything the provider created.
    async fn cleanup(&self, _site: &FrappeSite) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappe_operator::k8s_openapi::ByteString;
    use frappe_operator::{DatabaseConfig, FrappeSiteSpec};

    fn site(config: DatabaseConfig) -> FrappeSite {
        let mut site = FrappeSite::new(
            "acct",
            FrappeSiteSpec {
                site_name: "acct.example.com".into(),
                db_config: Some(config),
                ..Default::default()
            },
        );
        site.metadata.namespace = Some("tenants".into());
        site.metadata.uid = Some("site-uid".into());
        site
    }

    fn secret(entries: &[(&str, &str)]) -> Secret {
        let mut secret = Secret {
            data: Some(
                entries
                    .iter()
                    .map(|(key, value)| (key.to_string(), ByteString(value.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        secret.metadata.name = Some("external-db".into());
        secret
    }

    #[test]
    fn test_external_connection_from_secret() {
        let site = site(DatabaseConfig::default());
        let connection = ExternalConnection::from_secret(
            &site,
            &secret(&[("host", "db.example.com"), ("root-password", "hunter2")]),
        )
        .unwrap();
        assert_eq!(
            connection,
            ExternalConnection {
                host: "db.example.com".into(),
                port: "3306".into(),
                username: "root".into(),
                password: "hunter2".into(),
                secret_name: "external-db".into(),
            }
        );
    }

    #[test]
    fn test_external_connection_prefers_spec_host() {
        let site = site(DatabaseConfig {
            host: Some("mysql.internal".into()),
            port: Some(3307),
            ..Default::default()
        });
        let connection = ExternalConnection::from_secret(
            &site,
            &secret(&[("username", "frappe"), ("password", "pw"), ("rootPassword", "other")]),
        )
        .unwrap();
        assert_eq!(connection.host, "mysql.internal");
        assert_eq!(connection.port, "3307");
        assert_eq!(connection.username, "frappe");
        assert_eq!(connection.password, "pw");
    }

    #[test]
    fn test_external_connection_missing_keys() {
        let site = site(DatabaseConfig::default());
        let err = ExternalConnection::from_secret(&site, &secret(&[("password", "pw")]));
        assert!(matches!(err, Err(ProviderError::Config(message)) if message.contains("host")));
        let err = ExternalConnection::from_secret(&site, &secret(&[("host", "db")]));
        assert!(matches!(err, Err(ProviderError::Config(message)) if message.contains("rootPassword")));
    }

    #[test]
    fn test_ready_condition() {
        let mut object = DynamicObject::new("acct-db", &Kind::Database.resource());
        assert!(!is_condition_ready(&object));
        object.data = json!({"status": {"conditions": [
            {"type": "Synced", "status": "True"},
            {"type": "Ready", "status": "False"},
        ]}});
        assert!(!is_condition_ready(&object));
        object.data["status"]["conditions"][1]["status"] = json!("True");
        assert!(is_condition_ready(&object));
    }

    #[test]
    fn test_owned_object() {
        let site = site(DatabaseConfig::default());
        let object = MariaDbProvider::owned_object(
            &site,
            Kind::Grant,
            grant_object(&site),
            json!({"table": "*"}),
        )
        .unwrap();
        assert_eq!(object.metadata.name.as_deref(), Some("acct-grant"));
        assert_eq!(object.metadata.namespace.as_deref(), Some("tenants"));
        assert_eq!(object.types.as_ref().map(|t| t.kind.as_str()), Some("Grant"));
        assert_eq!(
            object.types.as_ref().map(|t| t.api_version.as_str()),
            Some("k8s.mariadb.com/v1alpha1")
        );
        assert_eq!(object.data["spec"]["table"], "*");
        let owner = &object.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.kind, "FrappeSite");
    }
}
