//! Database backends a site can be provisioned on.

mod mariadb;
mod naming;
mod postgres;
mod sqlite;

use std::str::FromStr;

use async_trait::async_trait;
use frappe_operator::FrappeSite;
use strum::Display;
use thiserror::Error;

pub use mariadb::MariaDbProvider;
pub use naming::{database_name, database_user, sanitize};
pub use postgres::PostgresProvider;
pub use sqlite::SqliteProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DatabaseKind {
    MariaDb,
    Sqlite,
    Postgres,
}

impl FromStr for DatabaseKind {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" | "mariadb" => Ok(Self::MariaDb),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" => Ok(Self::Postgres),
            other => Err(ProviderError::Config(format!(
                "unsupported database provider {other:?} (supported: mariadb, postgres, sqlite)"
            ))),
        }
    }
}

impl DatabaseKind {
    pub fn for_site(site: &FrappeSite) -> Result<Self, ProviderError> {
        site.spec
            .db_config
            .as_ref()
            .and_then(|config| config.provider.as_deref())
            .unwrap_or_default()
            .parse()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub host: String,
    pub port: String,
    pub name: String,
    pub provider: DatabaseKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub secret_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} databases are not supported yet")]
    Unsupported(DatabaseKind),
    #[error("invalid database configuration: {0}")]
    Config(String),
    #[error("secret {0} not found")]
    SecretNotFound(String),
    #[error(transparent)]
    Api(#[from] frappe_operator::Error),
}

impl ProviderError {
    /// Configuration problems and missing capabilities need the site to be edited.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::Config(_))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    /// Creates whatever the site's database needs and reports where it lives.
    async fn ensure_database(&self, site: &FrappeSite) -> Result<DatabaseInfo, ProviderError>;

    async fn is_ready(&self, site: &FrappeSite) -> Result<bool, ProviderError>;

    async fn get_credentials(&self, site: &FrappeSite)
    -> Result<DatabaseCredentials, ProviderError>;

    async fn cleanup(&self, site: &FrappeSite) -> Result<(), ProviderError>;
}

pub enum Provider {
    MariaDb(MariaDbProvider),
    Sqlite(SqliteProvider),
    Postgres(PostgresProvider),
}

impl Provider {
    pub fn new(kind: DatabaseKind, client: frappe_operator::Client) -> Self {
        match kind {
            DatabaseKind::MariaDb => Self::MariaDb(MariaDbProvider::new(client)),
            DatabaseKind::Sqlite => Self::Sqlite(SqliteProvider),
            DatabaseKind::Postgres => Self::Postgres(PostgresProvider),
        }
    }

    pub fn for_site(
        site: &FrappeSite,
        client: frappe_operator::Client,
    ) -> Result<Self, ProviderError> {
        Ok(Self::new(DatabaseKind::for_site(site)?, client))
    }

    fn inner(&self) -> &dyn DatabaseProvider {
        match self {
            Self::MariaDb(provider) => provider,
            Self::Sqlite(provider) => provider,
            Self::Postgres(provider) => provider,
        }
    }
}

#[async_trait]
impl DatabaseProvider for Provider {
    async fn ensure_database(&self, site: &FrappeSite) -> Result<DatabaseInfo, ProviderError> {
        self.inner().ensure_database(site).await
    }

    async fn is_ready(&self, site: &FrappeSite) -> Result<bool, ProviderError> {
        self.inner().is_ready(site).await
    }

    async fn get_credentials(
        &self,
        site: &FrappeSite,
    ) -> Result<DatabaseCredentials, ProviderError> {
        self.inner().get_credentials(site).await
    }

    async fn cleanup(&self, site: &FrappeSite) -> Result<(), ProviderError> {
        self.inner().cleanup(site).await
    }
}
