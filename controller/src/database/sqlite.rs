use async_trait::async_trait;
use frappe_operator::FrappeSite;

use super::{DatabaseCredentials, DatabaseInfo, DatabaseKind, DatabaseProvider, ProviderError};

/// File-backed databases living on the bench's sites volume. Needs nothing
/// from the cluster.
pub struct SqliteProvider;

#[async_trait]
impl DatabaseProvider for SqliteProvider {
    async fn ensure_database(&self, _site: &FrappeSite) -> Result<DatabaseInfo, ProviderError> {
        Ok(DatabaseInfo {
            host: String::new(),
            port: String::new(),
            name: "site".into(),
            provider: DatabaseKind::Sqlite,
        })
    }

    async fn is_ready(&self, _site: &FrappeSite) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn get_credentials(
        &self,
        _site: &FrappeSite,
    ) -> Result<DatabaseCredentials, ProviderError> {
        Ok(DatabaseCredentials::default())
    }

    async fn cleanup(&self, _site: &FrappeSite) -> Result<(), ProviderError> {
        Ok(())
    }
}
