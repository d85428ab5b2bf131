//! Storage class and access mode selection for a bench's shared sites volume.

use std::time::Duration;

use chrono::{DateTime, Utc};
use frappe_operator::k8s_openapi::api::core::v1::PersistentVolumeClaim;
use frappe_operator::k8s_openapi::api::storage::v1::StorageClass;
use frappe_operator::prelude::*;
use frappe_operator::{AccessMode, FrappeBench, FrappeLabel, StorageStatus};
use thiserror::Error;

use crate::utils::from_kube_time;

/// PVC annotation recording the access mode the claim was created with.
pub const REQUESTED_ACCESS: FrappeLabel<'static> = FrappeLabel::borrow("requested-access");

const DEFAULT_CLASS_ANNOTATIONS: [&str; 2] = [
    "storageclass.kubernetes.io/is-default-class",
    "storageclass.beta.kubernetes.io/is-default-class",
];

/// Provisioner name fragments of drivers known to support ReadWriteMany.
const RWX_PROVISIONERS: [&str; 7] = [
    "nfs",
    "ceph",
    "gluster",
    "netapp",
    "azurefile",
    "filestore",
    "portworx",
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage class {0:?} not found in cluster")]
    NotFound(String),
    #[error("storage class {0:?} has no provisioner configured")]
    MissingProvisioner(String),
    #[error("no storage classes available; create one or set storageClassName")]
    NoStorageClasses,
}

fn is_default_class(class: &StorageClass) -> bool {
    let Some(annotations) = class.metadata.annotations.as_ref() else {
        return false;
    };
    DEFAULT_CLASS_ANNOTATIONS
        .iter()
        .any(|key| annotations.get(*key).is_some_and(|value| value == "true"))
}

pub fn choose_storage_class<'a>(
    bench: &FrappeBench,
    classes: &'a [StorageClass],
) -> Result<&'a StorageClass, StorageError> {
    if let Some(name) = bench
        .spec
        .storage_class_name
        .as_deref()
        .filter(|name| !name.is_empty())
    {
        let class = classes
            .iter()
            .find(|class| class.metadata.name.as_deref() == Some(name))
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        if class.provisioner.is_empty() {
            return Err(StorageError::MissingProvisioner(name.to_string()));
        }
        tracing::info!("Using storage class {name} ({})", class.provisioner);
        return Ok(class);
    }
    if let Some(class) = classes.iter().find(|class| is_default_class(class)) {
        tracing::info!("Using default storage class {}", class.name_any());
        return Ok(class);
    }
    let class = classes.first().ok_or(StorageError::NoStorageClasses)?;
    tracing::warn!(
        "No default storage class found, using first available: {}. \
         Set a default storage class or storageClassName on the bench",
        class.name_any()
    );
    Ok(class)
}

pub fn supports_rwx(class: Option<&StorageClass>) -> bool {
    class.is_some_and(|class| {
        let provisioner = class.provisioner.to_lowercase();
        RWX_PROVISIONERS
            .iter()
            .any(|fragment| provisioner.contains(fragment))
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessDecision {
    pub mode: AccessMode,
    /// A fresh decision that still has to be recorded in status.
    pub persist: bool,
}

/// Fallback beats the recorded mode, which beats a fresh check of `class`.
pub fn determine_access_mode(bench: &FrappeBench, class: Option<&StorageClass>) -> AccessDecision {
    let storage = bench.storage_status();
    if storage.and_then(|storage| storage.fallback) == Some(true) {
        return AccessDecision {
            mode: AccessMode::ReadWriteOnce,
            persist: false,
        };
    }
    if let Some(mode) = storage.and_then(|storage| storage.access_mode) {
        tracing::debug!("Using recorded storage access mode {mode}");
        return AccessDecision {
            mode,
            persist: false,
        };
    }
    let mode = if supports_rwx(class) {
        AccessMode::ReadWriteMany
    } else {
        AccessMode::ReadWriteOnce
    };
    AccessDecision {
        mode,
        persist: true,
    }
}

/// Status recording a fresh access mode decision.
pub fn decision_status(decision: AccessDecision, class: Option<&StorageClass>) -> StorageStatus {
    StorageStatus {
        storage_class: class.and_then(|class| class.metadata.name.clone()),
        access_mode: Some(decision.mode),
        fallback: None,
    }
}

/// Status recording the one-time fallback to ReadWriteOnce.
pub fn fallback_status() -> StorageStatus {
    StorageStatus {
        storage_class: None,
        access_mode: Some(AccessMode::ReadWriteOnce),
        fallback: Some(true),
    }
}

pub fn should_fallback_storage(pvc: &PersistentVolumeClaim, bench: &FrappeBench) -> bool {
    let pending = pvc
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some("Pending");
    let requested_rwx =
        pvc.annotation(&REQUESTED_ACCESS.to_string()) == Some(AccessMode::ReadWriteMany.to_string().as_str());
    let already_fallen_back = bench
        .storage_status()
        .and_then(|storage| storage.fallback)
        == Some(true);
    pending && requested_rwx && !already_fallen_back
}

/// Whether the claim has been around longer than `grace`.
pub fn grace_elapsed(pvc: &PersistentVolumeClaim, grace: Duration, now: DateTime<Utc>) -> bool {
    let Some(created) = pvc
        .metadata
        .creation_timestamp
        .as_ref()
        .and_then(from_kube_time)
    else {
        return false;
    };
    let Ok(grace) = chrono::Duration::from_std(grace) else {
        return false;
    };
    now - created >= grace
}
