use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use frappe_operator::k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec};
use frappe_operator::k8s_openapi::api::storage::v1::StorageClass;
use frappe_operator::kube::runtime::controller::Action;
use frappe_operator::prelude::*;
use frappe_operator::{FilterParams, FrappeBench, Quantity, StorageStatus, StorageUnit};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::resources::{ResourceRequirement, Resources};
use crate::storage::{self, REQUESTED_ACCESS, StorageError};

use super::BenchReconciler;
use super::template::{bench_labels, sites_claim};

const STORAGE_REQUEUE: Duration = Duration::from_secs(30);

/// What the rest of the pass should do once the sites volume was looked at.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StorageOutcome {
    Ready,
    /// The storage class is not there yet, the claim is waiting on a
    /// ReadWriteMany provisioner, or it was just dropped to be recreated as
    /// ReadWriteOnce.
    Requeue,
}

impl StorageOutcome {
    /// The action that ends the pass early, if any.
    pub(crate) fn action(&self) -> Option<Action> {
        match self {
            Self::Ready => None,
            Self::Requeue => Some(Action::requeue(STORAGE_REQUEUE)),
        }
    }
}

/// The cluster operations the sites volume step needs.
#[async_trait]
pub(crate) trait StorageCluster: Send + Sync {
    async fn list_storage_classes(&self) -> frappe_operator::Result<Vec<StorageClass>>;

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<PersistentVolumeClaim>>;

    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> frappe_operator::Result<()>;

    async fn delete_claim(&self, namespace: &str, name: &str) -> frappe_operator::Result<()>;

    /// JSON merge patch against the bench's status subresource.
    async fn patch_bench_status(
        &self,
        bench: &FrappeBench,
        status: &serde_json::Value,
    ) -> frappe_operator::Result<()>;
}

#[async_trait]
impl StorageCluster for Context {
    async fn list_storage_classes(&self) -> frappe_operator::Result<Vec<StorageClass>> {
        self.api_global::<StorageClass>()
            .list_all(&FilterParams::default())
            .await
    }

    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> frappe_operator::Result<Option<PersistentVolumeClaim>> {
        self.api_namespaced::<PersistentVolumeClaim>(namespace)
            .get_opt(name)
            .await
    }

    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> frappe_operator::Result<()> {
        self.api_namespaced::<PersistentVolumeClaim>(claim.require_namespace()?)
            .get_or_create(claim)
            .await?;
        Ok(())
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> frappe_operator::Result<()> {
        self.api_namespaced::<PersistentVolumeClaim>(namespace)
            .delete_opt(name)
            .await?;
        Ok(())
    }

    async fn patch_bench_status(
        &self,
        bench: &FrappeBench,
        status: &serde_json::Value,
    ) -> frappe_operator::Result<()> {
        self.api_namespaced::<FrappeBench>(bench.require_namespace()?)
            .patch_status_merge(bench.name()?, status)
            .await?;
        Ok(())
    }
}

fn storage_status_patch(status: &StorageStatus) -> serde_json::Result<serde_json::Value> {
    Ok(serde_json::json!({ "storage": serde_json::to_value(status)? }))
}

async fn record_storage(
    cluster: &impl StorageCluster,
    bench: &FrappeBench,
    status: &StorageStatus,
) -> Result<()> {
    let name = bench.name()?;
    let patch = storage_status_patch(status).map_err(frappe_operator::Error::from)?;
    cluster
        .patch_bench_status(bench, &patch)
        .await
        .map_err(Error::context(format!("frappebench/{name}"), "patch status"))
}

/// Records the one-time fallback to ReadWriteOnce.
pub(crate) async fn mark_storage_fallback(
    cluster: &impl StorageCluster,
    bench: &FrappeBench,
) -> Result<()> {
    record_storage(cluster, bench, &storage::fallback_status()).await
}

fn claim(
    bench: &FrappeBench,
    class: &StorageClass,
    mode: frappe_operator::AccessMode,
) -> Result<PersistentVolumeClaim> {
    let mut metadata = bench.owned_meta(sites_claim(bench.name()?), bench_labels(bench).into())?;
    metadata.annotations = Some([(REQUESTED_ACCESS.to_string(), mode.to_string())].into());
    let size = bench
        .spec
        .storage_size
        .clone()
        .unwrap_or_else(|| Quantity::new(10, StorageUnit::Gi));
    Ok(PersistentVolumeClaim {
        metadata,
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![mode.to_string()]),
            storage_class_name: class.metadata.name.clone(),
            resources: Resources {
                requests: ResourceRequirement::storage(size),
                ..Default::default()
            }
            .into(),
            ..Default::default()
        }),
        ..Default::default()
    })
}

async fn create_claim(cluster: &impl StorageCluster, bench: &FrappeBench) -> Result<StorageOutcome> {
    let name = sites_claim(bench.name()?);
    let classes = cluster
        .list_storage_classes()
        .await
        .map_err(Error::context("storageclasses", "list"))?;
    let class = match storage::choose_storage_class(bench, &classes) {
        Ok(class) => class,
        Err(err @ (StorageError::NotFound(_) | StorageError::NoStorageClasses)) => {
            tracing::info!("Waiting to create PVC {name}: {err}");
            return Ok(StorageOutcome::Requeue);
        }
        Err(err) => return Err(err.into()),
    };
    let decision = storage::determine_access_mode(bench, Some(class));
    if decision.persist {
        record_storage(cluster, bench, &storage::decision_status(decision, Some(class))).await?;
    }
    tracing::info!("Creating PVC {name} with access mode {}", decision.mode);
    cluster
        .create_claim(&claim(bench, class, decision.mode)?)
        .await
        .map_err(Error::context(format!("pvc/{name}"), "create"))?;
    Ok(StorageOutcome::Ready)
}

/// Ensures the `<bench>-sites` claim. A claim stuck pending on ReadWriteMany
/// past `grace` is dropped so the next pass recreates it as ReadWriteOnce.
pub(crate) async fn sync_storage(
    cluster: &impl StorageCluster,
    bench: &FrappeBench,
    grace: Duration,
    now: DateTime<Utc>,
) -> Result<StorageOutcome> {
    let namespace = bench.require_namespace()?;
    let name = sites_claim(bench.name()?);
    let Some(claim) = cluster
        .get_claim(namespace, &name)
        .await
        .map_err(Error::context(format!("pvc/{name}"), "get"))?
    else {
        return create_claim(cluster, bench).await;
    };
    if !storage::should_fallback_storage(&claim, bench) {
        return Ok(StorageOutcome::Ready);
    }
    if !storage::grace_elapsed(&claim, grace, now) {
        tracing::info!("PVC {name} is pending with ReadWriteMany, waiting before fallback");
        return Ok(StorageOutcome::Requeue);
    }
    tracing::warn!("PVC {name} stayed pending with ReadWriteMany, falling back to ReadWriteOnce");
    mark_storage_fallback(cluster, bench).await?;
    cluster
        .delete_claim(namespace, &name)
        .await
        .map_err(Error::context(format!("pvc/{name}"), "delete"))?;
    Ok(StorageOutcome::Requeue)
}

impl BenchReconciler {
    pub(crate) async fn apply_storage(
        &self,
        ctx: &Context,
        bench: &FrappeBench,
    ) -> Result<StorageOutcome> {
        let grace = Duration::from_secs(ctx.config.storage_fallback_grace_secs);
        sync_storage(ctx, bench, grace, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::utils::to_kube_time;
    use frappe_operator::k8s_openapi::api::core::v1::PersistentVolumeClaimStatus;
    use frappe_operator::kube::api::ObjectMeta;
    use frappe_operator::{AccessMode, FrappeBenchSpec, FrappeBenchStatus};

    const GRACE: Duration = Duration::from_secs(120);

    #[derive(Default)]
    struct FakeStorage {
        classes: Vec<StorageClass>,
        claims: Mutex<BTreeMap<String, PersistentVolumeClaim>>,
        deleted: Mutex<Vec<String>>,
        patches: Mutex<Vec<serde_json::Value>>,
    }

    impl FakeStorage {
        fn with_class(mut self, name: &str, provisioner: &str) -> Self {
            self.classes.push(StorageClass {
                metadata: ObjectMeta {
                    name: Some(name.into()),
                    ..Default::default()
                },
                provisioner: provisioner.into(),
                ..Default::default()
            });
            self
        }

        fn with_pending_claim(self, requested: AccessMode, created: DateTime<Utc>) -> Self {
            let claim = PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some("erp-sites".into()),
                    namespace: Some("tenants".into()),
                    creation_timestamp: Some(to_kube_time(created).unwrap()),
                    annotations: Some(
                        [(REQUESTED_ACCESS.to_string(), requested.to_string())].into(),
                    ),
                    ..Default::default()
                },
                status: Some(PersistentVolumeClaimStatus {
                    phase: Some("Pending".into()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            self.claims
                .lock()
                .unwrap()
                .insert("erp-sites".into(), claim);
            self
        }

        fn claim(&self) -> Option<PersistentVolumeClaim> {
            self.claims.lock().unwrap().get("erp-sites").cloned()
        }
    }

    #[async_trait]
    impl StorageCluster for FakeStorage {
        async fn list_storage_classes(&self) -> frappe_operator::Result<Vec<StorageClass>> {
            Ok(self.classes.clone())
        }

        async fn get_claim(
            &self,
            _namespace: &str,
            name: &str,
        ) -> frappe_operator::Result<Option<PersistentVolumeClaim>> {
            Ok(self.claims.lock().unwrap().get(name).cloned())
        }

        async fn create_claim(
            &self,
            claim: &PersistentVolumeClaim,
        ) -> frappe_operator::Result<()> {
            self.claims
                .lock()
                .unwrap()
                .entry(claim.name_any())
                .or_insert_with(|| claim.clone());
            Ok(())
        }

        async fn delete_claim(&self, _namespace: &str, name: &str) -> frappe_operator::Result<()> {
            self.claims.lock().unwrap().remove(name);
            self.deleted.lock().unwrap().push(name.into());
            Ok(())
        }

        async fn patch_bench_status(
            &self,
            _bench: &FrappeBench,
            status: &serde_json::Value,
        ) -> frappe_operator::Result<()> {
            self.patches.lock().unwrap().push(status.clone());
            Ok(())
        }
    }

    fn bench(storage: Option<StorageStatus>) -> FrappeBench {
        let mut bench = FrappeBench::new(
            "erp",
            FrappeBenchSpec {
                frappe_version: "version-15".into(),
                ..Default::default()
            },
        );
        bench.metadata.namespace = Some("tenants".into());
        bench.metadata.uid = Some("bench-uid".into());
        bench.status = Some(FrappeBenchStatus {
            storage,
            ..Default::default()
        });
        bench
    }

    fn access_modes(claim: &PersistentVolumeClaim) -> Vec<String> {
        claim
            .spec
            .as_ref()
            .and_then(|spec| spec.access_modes.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_storage_status_patch() {
        assert_eq!(
            storage_status_patch(&storage::fallback_status()).unwrap(),
            serde_json::json!({"storage": {"accessMode": "ReadWriteOnce", "fallback": true}})
        );
        let decided = StorageStatus {
            storage_class: Some("files".into()),
            access_mode: Some(AccessMode::ReadWriteMany),
            fallback: None,
        };
        assert_eq!(
            storage_status_patch(&decided).unwrap(),
            serde_json::json!({"storage": {"storageClass": "files", "accessMode": "ReadWriteMany"}})
        );
    }

    #[test]
    fn test_requeue_ends_pass() {
        assert_eq!(StorageOutcome::Ready.action(), None);
        assert_eq!(
            StorageOutcome::Requeue.action(),
            Some(Action::requeue(Duration::from_secs(30)))
        );
    }

    #[tokio::test]
    async fn test_creates_rwx_claim_and_records_decision() {
        let cluster = FakeStorage::default().with_class("files", "nfs.csi.k8s.io");
        let outcome = sync_storage(&cluster, &bench(None), GRACE, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, StorageOutcome::Ready);
        let claim = cluster.claim().unwrap();
        assert_eq!(access_modes(&claim), vec!["ReadWriteMany"]);
        assert_eq!(
            claim.annotation(&REQUESTED_ACCESS.to_string()),
            Some("ReadWriteMany")
        );
        assert_eq!(
            cluster.patches.lock().unwrap().as_slice(),
            [serde_json::json!({
                "storage": {"storageClass": "files", "accessMode": "ReadWriteMany"}
            })]
        );
    }

    #[tokio::test]
    async fn test_missing_storage_class_requeues() {
        let cluster = FakeStorage::default();
        let outcome = sync_storage(&cluster, &bench(None), GRACE, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, StorageOutcome::Requeue);
        assert!(cluster.claim().is_none());

        let cluster = FakeStorage::default().with_class("files", "nfs.csi.k8s.io");
        let mut named = bench(None);
        named.spec.storage_class_name = Some("fast".into());
        let outcome = sync_storage(&cluster, &named, GRACE, Utc::now()).await.unwrap();
        assert_eq!(outcome, StorageOutcome::Requeue);
        assert!(cluster.claim().is_none());

        let cluster = FakeStorage::default().with_class("fast", "");
        let err = sync_storage(&cluster, &named, GRACE, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::MissingProvisioner(_))));
    }

    #[tokio::test]
    async fn test_pending_claim_waits_for_grace() {
        let now = Utc::now();
        let cluster = FakeStorage::default()
            .with_class("files", "nfs.csi.k8s.io")
            .with_pending_claim(AccessMode::ReadWriteMany, now - chrono::Duration::seconds(30));
        let outcome = sync_storage(&cluster, &bench(None), GRACE, now).await.unwrap();
        assert_eq!(outcome, StorageOutcome::Requeue);
        assert!(cluster.claim().is_some());
        assert!(cluster.deleted.lock().unwrap().is_empty());
        assert!(cluster.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_after_grace() {
        let now = Utc::now();
        let cluster = FakeStorage::default()
            .with_class("files", "nfs.csi.k8s.io")
            .with_pending_claim(AccessMode::ReadWriteMany, now - chrono::Duration::seconds(300));
        let outcome = sync_storage(&cluster, &bench(None), GRACE, now).await.unwrap();
        assert_eq!(outcome, StorageOutcome::Requeue);
        assert_eq!(cluster.deleted.lock().unwrap().as_slice(), ["erp-sites"]);
        assert_eq!(
            cluster.patches.lock().unwrap().as_slice(),
            [serde_json::json!({"storage": {"accessMode": "ReadWriteOnce", "fallback": true}})]
        );

        // The next pass sees the recorded fallback and recreates the claim.
        let fallen_back = bench(Some(storage::fallback_status()));
        let outcome = sync_storage(&cluster, &fallen_back, GRACE, now).await.unwrap();
        assert_eq!(outcome, StorageOutcome::Ready);
        assert_eq!(access_modes(&cluster.claim().unwrap()), vec!["ReadWriteOnce"]);
        assert_eq!(cluster.patches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_second_fallback() {
        let now = Utc::now();
        let cluster = FakeStorage::default()
            .with_class("files", "nfs.csi.k8s.io")
            .with_pending_claim(AccessMode::ReadWriteMany, now - chrono::Duration::seconds(300));
        let fallen_back = bench(Some(storage::fallback_status()));
        let outcome = sync_storage(&cluster, &fallen_back, GRACE, now).await.unwrap();
        assert_eq!(outcome, StorageOutcome::Ready);
        assert!(cluster.claim().is_some());
        assert!(cluster.deleted.lock().unwrap().is_empty());
        assert!(cluster.patches.lock().unwrap().is_empty());
    }
}
