use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CpuUnit, Quantity, StorageUnit};

/// A reference to an object that may live in another namespace.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedName {
    pub name: String,
    pub namespace: Option<String>,
}

impl NamespacedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    pub fn within(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Namespace of the reference, defaulting to the referrer's.
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|namespace| !namespace.is_empty())
            .unwrap_or(default)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub secret_name: Option<String>,
    /// cert-manager cluster issuer
    pub issuer: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBounds {
    pub min_cpu: Option<Quantity<CpuUnit>>,
    pub max_cpu: Option<Quantity<CpuUnit>>,
    pub min_memory: Option<Quantity<StorageUnit>>,
    pub max_memory: Option<Quantity<StorageUnit>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_or() {
        assert_eq!(NamespacedName::new("erp").namespace_or("tenants"), "tenants");
        assert_eq!(
            NamespacedName::new("erp").within("shared").namespace_or("tenants"),
            "shared"
        );
        let empty = NamespacedName {
            name: "erp".into(),
            namespace: Some(String::new()),
        };
        assert_eq!(empty.namespace_or("tenants"), "tenants");
    }
}
