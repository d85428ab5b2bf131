use std::collections::BTreeMap;

use crate::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, api::ObjectMeta};

pub trait ResourceNameExt: Resource {
    fn name(&self) -> Result<&str> {
        self.meta()
            .name
            .as_deref()
            .ok_or(Error::ObjectMetaMissing("name"))
    }

    fn require_namespace(&self) -> Result<&str> {
        self.meta()
            .namespace
            .as_deref()
            .ok_or(Error::ObjectMetaMissing("namespace"))
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }
}

impl<T> ResourceNameExt for T where T: Resource {}

pub trait ResourceOwnerRefExt: Resource<DynamicType = ()> {
    fn static_controller_owner_ref(&self) -> Result<OwnerReference> {
        self.controller_owner_ref(&())
            .ok_or(Error::ObjectMetaMissing("controller_owner_ref"))
    }

    /// Metadata for a child object living next to `self` and owned by it.
    fn owned_meta(
        &self,
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Result<ObjectMeta> {
        Ok(ObjectMeta {
            name: Some(name.into()),
            namespace: self.meta().namespace.clone(),
            labels: Some(labels),
            owner_references: Some(vec![self.static_controller_owner_ref()?]),
            ..Default::default()
        })
    }
}

impl<T> ResourceOwnerRefExt for T where T: Resource<DynamicType = ()> {}

pub trait ObjectMetaExt {
    fn strip_system(&self) -> Self;
}

impl ObjectMetaExt for ObjectMeta {
    fn strip_system(&self) -> Self {
        ObjectMeta {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            annotations: self.annotations.clone(),
            labels: self.labels.clone(),
            finalizers: self.finalizers.clone(),
            owner_references: self.owner_references.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn test_strip_system() {
        let meta = ObjectMeta {
            name: Some("cm".into()),
            namespace: Some("ns".into()),
            resource_version: Some("42".into()),
            uid: Some("uid".into()),
            ..Default::default()
        };
        let stripped = meta.strip_system();
        assert_eq!(stripped.name.as_deref(), Some("cm"));
        assert_eq!(stripped.namespace.as_deref(), Some("ns"));
        assert!(stripped.resource_version.is_none());
        assert!(stripped.uid.is_none());
    }

    #[test]
    fn test_missing_metadata() {
        let cm = ConfigMap::default();
        assert!(matches!(cm.name(), Err(Error::ObjectMetaMissing("name"))));
        assert!(matches!(
            cm.require_namespace(),
            Err(Error::ObjectMetaMissing("namespace"))
        ));
        assert_eq!(cm.annotation("anything"), None);
    }
}
