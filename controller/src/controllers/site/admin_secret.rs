use frappe_operator::k8s_openapi::ByteString;
use frappe_operator::k8s_openapi::api::core::v1::Secret;
use frappe_operator::label::SITE;
use frappe_operator::prelude::*;
use frappe_operator::{FrappeSite, Labels};

use crate::error::{Error, Result};
use crate::password;

use super::cluster::SiteCluster;

pub(crate) const PASSWORD_KEY: &str = "password";
const GENERATED_LENGTH: usize = 16;

pub(crate) fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(ByteString(bytes)) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return String::from_utf8(bytes.clone()).ok();
    }
    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .cloned()
}

pub(crate) fn generated_secret_name(site: &FrappeSite) -> Result<String> {
    Ok(format!("{}-admin", site.name()?))
}

fn generated_secret(site: &FrappeSite, password: String) -> Result<Secret> {
    let labels = Labels::new().with(SITE, site.name()?);
    Ok(Secret {
        metadata: site.owned_meta(generated_secret_name(site)?, labels.into())?,
        type_: Some("Opaque".into()),
        data: Some([(PASSWORD_KEY.to_string(), ByteString(password.into_bytes()))].into()),
        ..Default::default()
    })
}

/// The referenced secret's `password`, or the one kept in `<site>-admin`,
/// generated on first use.
pub(crate) async fn admin_password(
    cluster: &(impl SiteCluster + ?Sized),
    site: &FrappeSite,
) -> Result<String> {
    if let Some(reference) = site.spec.admin_password_secret_ref.as_ref() {
        let namespace = reference.namespace_or(site.require_namespace()?);
        let secret_ref = format!("{namespace}/{}", reference.name);
        let secret = cluster
            .get_secret(namespace, &reference.name)
            .await
            .map_err(Error::context(format!("secret/{}", reference.name), "get"))?
            .ok_or_else(|| Error::SecretNotFound(secret_ref.clone()))?;
        return secret_value(&secret, PASSWORD_KEY).ok_or(Error::InvalidSecret {
            secret: secret_ref,
            reason: format!("missing key {PASSWORD_KEY:?}"),
        });
    }
    let name = generated_secret_name(site)?;
    let secret = cluster
        .get_or_create_secret(&generated_secret(site, password::alphanumeric(GENERATED_LENGTH))?)
        .await
        .map_err(Error::context(format!("secret/{name}"), "create"))?;
    secret_value(&secret, PASSWORD_KEY).ok_or(Error::InvalidSecret {
        secret: name,
        reason: format!("missing key {PASSWORD_KEY:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_value_reads_data_then_string_data() {
        let secret = Secret {
            data: Some([("password".to_string(), ByteString(b"s3cret".to_vec()))].into()),
            ..Default::default()
        };
        assert_eq!(secret_value(&secret, "password").as_deref(), Some("s3cret"));
        let pending = Secret {
            string_data: Some([("password".to_string(), "typed".to_string())].into()),
            ..Default::default()
        };
        assert_eq!(secret_value(&pending, "password").as_deref(), Some("typed"));
        assert_eq!(secret_value(&Secret::default(), "password"), None);
    }

    #[test]
    fn test_generated_secret() {
        let mut site = FrappeSite::new("acct", Default::default());
        site.metadata.namespace = Some("tenants".into());
        site.metadata.uid = Some("site-uid".into());
        let secret = generated_secret(&site, password::alphanumeric(GENERATED_LENGTH)).unwrap();
        assert_eq!(secret.metadata.name.as_deref(), Some("acct-admin"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("tenants"));
        let password = secret_value(&secret, PASSWORD_KEY).unwrap();
        assert_eq!(password.len(), 16);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
