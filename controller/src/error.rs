use frappe_operator::kube::runtime;
use thiserror::Error;

use crate::database::ProviderError;
use crate::storage::StorageError;

pub type ControllerError<E> = runtime::controller::Error<E, runtime::watcher::Error>;
pub type ControllerResult<T, E> = Result<
    (
        runtime::reflector::ObjectRef<T>,
        runtime::controller::Action,
    ),
    ControllerError<E>,
>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{operation} {resource}: {source}")]
    Api {
        resource: String,
        operation: &'static str,
        #[source]
        source: frappe_operator::Error,
    },
    #[error(transparent)]
    Frappe(#[from] frappe_operator::Error),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("benchRef is required")]
    MissingBenchRef,
    #[error("init job {0} failed")]
    InitJobFailed(String),
    #[error("secret {secret}: {reason}")]
    InvalidSecret { secret: String, reason: String },
    #[error("secret {0} not found")]
    SecretNotFound(String),
    #[error("cannot quote script value: {0}")]
    Script(#[from] shlex::QuoteError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wraps an API error with the sub-resource and operation it came from.
    ///
    /// ```ignore
    /// api.create(&pvc).await.map_err(Error::context("pvc/erp-sites", "create"))?;
    /// ```
    pub fn context(
        resource: impl Into<String>,
        operation: &'static str,
    ) -> impl FnOnce(frappe_operator::Error) -> Error {
        let resource = resource.into();
        move |source| Error::Api {
            resource,
            operation,
            source,
        }
    }

    fn api_error(&self) -> Option<&frappe_operator::Error> {
        match self {
            Self::Api { source, .. } | Self::Frappe(source) => Some(source),
            Self::Provider(ProviderError::Api(source)) => Some(source),
            _ => None,
        }
    }

    /// The referenced secret that does not exist yet, if that is what failed.
    pub fn missing_secret(&self) -> Option<&str> {
        match self {
            Self::SecretNotFound(secret) | Self::Provider(ProviderError::SecretNotFound(secret)) => {
                Some(secret)
            }
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_error().is_some_and(frappe_operator::Error::is_not_found)
    }

    /// Errors that no amount of retrying will fix without an edit to the resource.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_permanent(),
            Self::Storage(_) | Self::MissingBenchRef | Self::InitJobFailed(_) => true,
            Self::InvalidSecret { .. } | Self::Script(_) => true,
            Self::Api { .. } | Self::Frappe(_) | Self::SecretNotFound(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappe_operator::kube::core::ErrorResponse;

    fn api_error(code: u16) -> frappe_operator::Error {
        frappe_operator::Error::Kube(frappe_operator::kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "boom".into(),
            reason: "NotFound".into(),
            code,
        }))
    }

    #[test]
    fn test_context_names_resource() {
        let err = Error::context("job/erp-init", "create")(api_error(404));
        assert!(err.to_string().starts_with("create job/erp-init: "));
        assert!(err.is_not_found());
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(Error::MissingBenchRef.is_permanent());
        assert!(Error::InitJobFailed("acct-init".into()).is_permanent());
        assert!(!Error::from(api_error(409)).is_permanent());
    }

    #[test]
    fn test_missing_secret_is_transient() {
        let err = Error::SecretNotFound("tenants/acct-custom".into());
        assert!(!err.is_permanent());
        assert_eq!(err.missing_secret(), Some("tenants/acct-custom"));

        let err = Error::from(ProviderError::SecretNotFound("tenants/external-db".into()));
        assert!(!err.is_permanent());
        assert_eq!(err.missing_secret(), Some("tenants/external-db"));

        let err = Error::InvalidSecret {
            secret: "tenants/acct-custom".into(),
            reason: "missing key \"password\"".into(),
        };
        assert!(err.is_permanent());
        assert_eq!(err.missing_secret(), None);
    }
}
