use async_trait::async_trait;
use frappe_operator::FrappeSite;

use super::{DatabaseCredentials, DatabaseInfo, DatabaseKind, DatabaseProvider, ProviderError};

pub struct PostgresProvider;

#[async_trait]
impl DatabaseProvider for PostgresProvider {
    async fn ensure_database(&self, _site: &FrappeSite) -> Result<DatabaseInfo, ProviderError> {
        Err(ProviderError::Unsupported(DatabaseKind::Postgres))
    }

    async fn is_ready(&self, _site: &FrappeSite) -> Result<bool, ProviderError> {
        Err(ProviderError::Unsupported(DatabaseKind::Postgres))
    }

    async fn get_credentials(
        &self,
        _site: &FrappeSite,
    ) -> Result<DatabaseCredentials, ProviderError> {
        Err(ProviderError::Unsupported(DatabaseKind::Postgres))
    }

    async fn cleanup(&self, _site: &FrappeSite) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported(DatabaseKind::Postgres))
    }
}
