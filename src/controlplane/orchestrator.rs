//! Orchestrator
//!
//! Coordinates reconciliation against one array:
//! - dispatch from a resource kind to its typed reconciler
//! - observed-state store keyed by `(kind, id)`, kept current across renames
//! - concurrent apply of independent resource instances
//! - read-only listing of masking views and snapshots

use crate::config::ProviderConfig;
use crate::controlplane::backends::BackendFactory;
use crate::controlplane::listing::{self, ListedViews, ListingConfig};
use crate::domain::ports::PowerMaxClientRef;
use crate::domain::value::AttributeValue;
use crate::error::{Error, Result};
use crate::mapping::map_record;
use crate::metrics::ReconcileMetrics;
use crate::reconcile::{FieldChange, ObservedState, Reconciler, Reconciliation, Resource};
use crate::resources::{
    snapshot, HostGroupResource, HostResource, PortGroupResource, ResourceKind,
    SnapshotPolicyResource, StorageGroupResource, VolumeResource,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Observed-state store key
pub type ResourceKey = (ResourceKind, String);

// =============================================================================
// Plan Entries
// =============================================================================

/// One resource instance and its desired configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub kind: ResourceKind,
    /// Identifier the instance currently has on the array
    pub id: String,
    /// Desired configuration; absent fields are left as they are
    pub desired: serde_json::Value,
}

/// Serializable outcome of applying one planned resource
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub kind: ResourceKind,
    pub previous_id: String,
    /// Identifier after the apply; differs from `previous_id` after a rename
    pub id: String,
    pub changes: Vec<FieldChange>,
    pub summary: String,
    /// Set when the instance could not be reconciled at all
    pub error: Option<String>,
    /// Whether re-running the apply can make progress
    pub retryable: bool,
    pub completed_at: DateTime<Utc>,
}

impl ApplyReport {
    pub fn from_result(planned: &PlannedResource, result: &Result<Reconciliation>) -> Self {
        match result {
            Ok(r) => Self {
                kind: r.kind,
                previous_id: r.previous_id.clone(),
                id: r.observed.id().unwrap_or(r.previous_id.as_str()).to_string(),
                changes: r.changes.clone(),
                summary: r.summary(),
                error: None,
                // field failures leave a partial update behind
                retryable: r.has_failures(),
                completed_at: Utc::now(),
            },
            Err(e) => Self {
                kind: planned.kind,
                previous_id: planned.id.clone(),
                id: planned.id.clone(),
                changes: Vec::new(),
                summary: "not reconciled".to_string(),
                error: Some(e.to_string()),
                retryable: e.is_retryable(),
                completed_at: Utc::now(),
            },
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.changes.iter().all(|c| !c.is_failed())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Per-array reconcile coordinator
pub struct Orchestrator {
    array_id: String,
    listing: ListingConfig,
    client: PowerMaxClientRef,
    /// Last observed state per resource instance
    store: DashMap<ResourceKey, ObservedState>,
    metrics: ReconcileMetrics,
}

impl Orchestrator {
    /// Create an orchestrator over an existing client
    pub fn new(config: &ProviderConfig, client: PowerMaxClientRef) -> Result<Arc<Self>> {
        config.validate()?;
        info!(
            "Orchestrator for array {} using backend {}",
            config.array_id,
            client.backend_name()
        );
        Ok(Arc::new(Self {
            array_id: config.array_id.clone(),
            listing: config.listing.clone(),
            client,
            store: DashMap::new(),
            metrics: ReconcileMetrics::new()?,
        }))
    }

    /// Create an orchestrator with the backend named in `config`
    pub fn from_config(config: &ProviderConfig) -> Result<Arc<Self>> {
        let client = BackendFactory::create(config)?;
        Self::new(config, client)
    }

    pub fn array_id(&self) -> &str {
        &self.array_id
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    fn reconciler<R: Resource>(&self, resource: R) -> Reconciler<R> {
        Reconciler::new(resource, self.client.clone(), self.array_id.clone())
    }

    /// Last observed state for an instance, if tracked
    pub fn observed(&self, kind: ResourceKind, id: &str) -> Option<ObservedState> {
        self.store.get(&(kind, id.to_string())).map(|s| s.value().clone())
    }

    // =========================================================================
    // Import
    // =========================================================================

    /// Refresh an instance from the array and start tracking it
    pub async fn import(&self, kind: ResourceKind, id: &str) -> Result<ObservedState> {
        let observed = match kind {
            ResourceKind::Host => self.reconciler(HostResource).read(id).await,
            ResourceKind::HostGroup => self.reconciler(HostGroupResource).read(id).await,
            ResourceKind::PortGroup => self.reconciler(PortGroupResource).read(id).await,
            ResourceKind::Volume => self.reconciler(VolumeResource).read(id).await,
            ResourceKind::StorageGroup => self.reconciler(StorageGroupResource).read(id).await,
            ResourceKind::SnapshotPolicy => self.reconciler(SnapshotPolicyResource).read(id).await,
            other => Err(read_only(other)),
        }?;

        self.metrics.record_skips(kind, observed.skipped());
        for skip in observed.skipped() {
            warn!("{}/{}: {}", kind, id, skip);
        }
        info!("Imported {}/{}", kind, id);
        self.store.insert((kind, id.to_string()), observed.clone());
        Ok(observed)
    }

    /// Tracked state, or a fresh read when the instance is not tracked yet
    async fn current(&self, kind: ResourceKind, id: &str) -> Result<ObservedState> {
        match self.observed(kind, id) {
            Some(observed) => Ok(observed),
            None => {
                debug!("{}/{} not tracked, importing", kind, id);
                self.import(kind, id).await
            }
        }
    }

    /// Stop tracking an instance, e.g. after it was deleted
    pub fn forget(&self, kind: ResourceKind, id: &str) -> Option<ObservedState> {
        let removed = self.store.remove(&(kind, id.to_string())).map(|(_, s)| s);
        if removed.is_some() {
            info!("Forgot {}/{}", kind, id);
        }
        removed
    }

    // =========================================================================
    // Plan / Apply
    // =========================================================================

    /// Changes that applying `desired` would attempt; no mutation is issued
    pub async fn plan(
        &self,
        kind: ResourceKind,
        id: &str,
        desired: &serde_json::Value,
    ) -> Result<Vec<FieldChange>> {
        let observed = self.current(kind, id).await?;
        match kind {
            ResourceKind::Host => plan_with(&self.reconciler(HostResource), desired, &observed),
            ResourceKind::HostGroup => {
                plan_with(&self.reconciler(HostGroupResource), desired, &observed)
            }
            ResourceKind::PortGroup => {
                plan_with(&self.reconciler(PortGroupResource), desired, &observed)
            }
            ResourceKind::Volume => plan_with(&self.reconciler(VolumeResource), desired, &observed),
            ResourceKind::StorageGroup => {
                plan_with(&self.reconciler(StorageGroupResource), desired, &observed)
            }
            ResourceKind::SnapshotPolicy => {
                plan_with(&self.reconciler(SnapshotPolicyResource), desired, &observed)
            }
            other => Err(read_only(other)),
        }
    }

    /// Reconcile one instance and track its refreshed state
    pub async fn apply(
        &self,
        kind: ResourceKind,
        id: &str,
        desired: &serde_json::Value,
    ) -> Result<Reconciliation> {
        let result = self.apply_inner(kind, id, desired).await;
        match &result {
            Ok(reconciliation) => {
                self.metrics.record_reconciliation(reconciliation);
                self.track(reconciliation);
            }
            Err(e) => {
                error!("Failed to reconcile {}/{}: {}", kind, id, e);
                self.metrics.record_error(kind);
            }
        }
        result
    }

    async fn apply_inner(
        &self,
        kind: ResourceKind,
        id: &str,
        desired: &serde_json::Value,
    ) -> Result<Reconciliation> {
        let observed = self.current(kind, id).await?;
        match kind {
            ResourceKind::Host => {
                apply_with(&self.reconciler(HostResource), desired, &observed).await
            }
            ResourceKind::HostGroup => {
                apply_with(&self.reconciler(HostGroupResource), desired, &observed).await
            }
            ResourceKind::PortGroup => {
                apply_with(&self.reconciler(PortGroupResource), desired, &observed).await
            }
            ResourceKind::Volume => {
                apply_with(&self.reconciler(VolumeResource), desired, &observed).await
            }
            ResourceKind::StorageGroup => {
                apply_with(&self.reconciler(StorageGroupResource), desired, &observed).await
            }
            ResourceKind::SnapshotPolicy => {
                apply_with(&self.reconciler(SnapshotPolicyResource), desired, &observed).await
            }
            other => Err(read_only(other)),
        }
    }

    /// Store the refreshed state under the current id
    fn track(&self, reconciliation: &Reconciliation) {
        let kind = reconciliation.kind;
        let previous = (kind, reconciliation.previous_id.clone());
        match reconciliation.observed.id() {
            Some(current) => {
                if reconciliation.renamed() {
                    self.store.remove(&previous);
                    debug!("{}: store key moved {} -> {}", kind, previous.1, current);
                }
                self.store
                    .insert((kind, current.to_string()), reconciliation.observed.clone());
            }
            None => {
                self.store.remove(&previous);
            }
        }
    }

    /// Apply independent instances concurrently.
    ///
    /// Results come back in input order; one failure does not stop the rest.
    pub async fn apply_all(
        &self,
        planned: Vec<PlannedResource>,
    ) -> Vec<(PlannedResource, Result<Reconciliation>)> {
        info!("Applying {} resource(s) on {}", planned.len(), self.array_id);
        let results = join_all(
            planned
                .iter()
                .map(|p| self.apply(p.kind, &p.id, &p.desired)),
        )
        .await;
        planned.into_iter().zip(results).collect()
    }

    // =========================================================================
    // Read-only Listings
    // =========================================================================

    /// List every masking view with bounded concurrency
    pub async fn list_masking_views(&self, cancel: &CancellationToken) -> Result<ListedViews> {
        let listed =
            listing::list_masking_views(&self.client, &self.array_id, &self.listing, cancel).await?;
        self.metrics.record_skips(ResourceKind::MaskingView, &listed.skipped);
        Ok(listed)
    }

    /// Snapshot generations of a storage group, mapped onto the snapshot shape
    pub async fn list_snapshots(&self, storage_group: &str) -> Result<Vec<AttributeValue>> {
        let records = self.client.list_snapshots(&self.array_id, storage_group).await?;
        let mut snapshots = Vec::with_capacity(records.len());
        for record in &records {
            let mapped = map_record(Some(record), snapshot::shape())?;
            for skip in &mapped.skipped {
                warn!("snapshot {}/{}: {}", storage_group, record.name, skip);
            }
            self.metrics.record_skips(ResourceKind::Snapshot, &mapped.skipped);
            snapshots.push(mapped.value);
        }
        debug!("Listed {} snapshot(s) of {}", snapshots.len(), storage_group);
        Ok(snapshots)
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn status(&self) -> OrchestratorStatus {
        let mut tracked: BTreeMap<String, u64> = BTreeMap::new();
        for entry in self.store.iter() {
            *tracked.entry(entry.key().0.to_string()).or_default() += 1;
        }
        OrchestratorStatus {
            array_id: self.array_id.clone(),
            backend: self.client.backend_name().to_string(),
            tracked_total: self.store.len() as u64,
            tracked,
        }
    }
}

fn read_only(kind: ResourceKind) -> Error {
    Error::Configuration(format!("{} is read-only and has no reconciler", kind))
}

fn plan_with<R: Resource>(
    reconciler: &Reconciler<R>,
    desired: &serde_json::Value,
    observed: &ObservedState,
) -> Result<Vec<FieldChange>> {
    let desired = reconciler.decode(desired)?;
    reconciler.plan(&desired, observed)
}

async fn apply_with<R: Resource>(
    reconciler: &Reconciler<R>,
    desired: &serde_json::Value,
    observed: &ObservedState,
) -> Result<Reconciliation> {
    let desired = reconciler.decode(desired)?;
    reconciler.reconcile(&desired, observed).await
}

/// Orchestrator status summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub array_id: String,
    pub backend: String,
    pub tracked_total: u64,
    /// Tracked instances per resource kind
    pub tracked: BTreeMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::SimulatedArray;
    use crate::domain::records::{HostRecord, SnapshotRecord, StorageGroupRecord};
    use crate::reconcile::Outcome;
    use crate::resources::testing::{client, ARRAY};
    use assert_matches::assert_matches;
    use serde_json::json;

    fn seeded() -> Arc<SimulatedArray> {
        let array = SimulatedArray::new(ARRAY);
        array.insert_host(HostRecord {
            host_id: "esx-01".into(),
            initiators: vec!["10000000c9a1b2c3".into()],
            ..Default::default()
        });
        array.insert_host(HostRecord {
            host_id: "esx-02".into(),
            ..Default::default()
        });
        array.insert_storage_group(StorageGroupRecord {
            storage_group_id: "sg-app".into(),
            srp: "SRP_1".into(),
            ..Default::default()
        });
        Arc::new(array)
    }

    fn orchestrator(array: &Arc<SimulatedArray>) -> Arc<Orchestrator> {
        Orchestrator::new(&ProviderConfig::default(), client(array)).unwrap()
    }

    #[tokio::test]
    async fn test_import_tracks_instance() {
        let array = seeded();
        let orch = orchestrator(&array);

        let observed = orch.import(ResourceKind::Host, "esx-01").await.unwrap();
        assert_eq!(observed.id(), Some("esx-01"));
        assert!(orch.observed(ResourceKind::Host, "esx-01").is_some());
        assert_eq!(orch.status().tracked_total, 1);
    }

    #[tokio::test]
    async fn test_read_only_kinds_are_rejected() {
        let array = seeded();
        let orch = orchestrator(&array);
        assert_matches!(
            orch.import(ResourceKind::MaskingView, "mv1").await,
            Err(Error::Configuration(_))
        );
    }

    #[tokio::test]
    async fn test_plan_issues_no_mutation() {
        let array = seeded();
        let orch = orchestrator(&array);

        let changes = orch
            .plan(ResourceKind::Host, "esx-01", &json!({"consistent_lun": true}))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].outcome, Outcome::Pending);
        assert!(array.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_apply_rename_moves_store_key() {
        let array = seeded();
        let orch = orchestrator(&array);
        orch.import(ResourceKind::Host, "esx-01").await.unwrap();

        let result = orch
            .apply(ResourceKind::Host, "esx-01", &json!({"name": "esx-01a"}))
            .await
            .unwrap();
        assert!(result.renamed());
        assert!(orch.observed(ResourceKind::Host, "esx-01").is_none());
        assert!(orch.observed(ResourceKind::Host, "esx-01a").is_some());
        assert_eq!(orch.metrics().reconcile_count("host", "ok"), 1);
        assert_eq!(orch.metrics().change_count("host", "replace", "applied"), 1);
    }

    #[tokio::test]
    async fn test_apply_missing_instance_is_error() {
        let array = seeded();
        let orch = orchestrator(&array);
        let err = orch
            .apply(ResourceKind::Host, "ghost", &json!({"consistent_lun": true}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::ResourceNotFound { .. });
        assert_eq!(orch.metrics().reconcile_count("host", "error"), 1);
    }

    #[tokio::test]
    async fn test_apply_all_isolates_failures() {
        let array = seeded();
        array.fail_on_target("set_host_consistent_lun", "esx-02");
        let orch = orchestrator(&array);

        let results = orch
            .apply_all(vec![
                PlannedResource {
                    kind: ResourceKind::Host,
                    id: "esx-01".into(),
                    desired: json!({"consistent_lun": true}),
                },
                PlannedResource {
                    kind: ResourceKind::Host,
                    id: "esx-02".into(),
                    desired: json!({"consistent_lun": true}),
                },
                PlannedResource {
                    kind: ResourceKind::StorageGroup,
                    id: "sg-app".into(),
                    desired: json!({"service_level": "Diamond"}),
                },
            ])
            .await;

        assert_eq!(results.len(), 3);
        let reports: Vec<ApplyReport> = results
            .iter()
            .map(|(p, r)| ApplyReport::from_result(p, r))
            .collect();
        assert!(reports[0].is_clean());
        assert!(!reports[1].is_clean());
        assert!(reports[1].retryable);
        assert!(reports[2].is_clean());
        assert!(!reports[2].retryable);
        assert_eq!(orch.metrics().reconcile_count("host", "partial"), 1);
        assert_eq!(orch.status().tracked_total, 3);
    }

    #[tokio::test]
    async fn test_undecodable_desired_config() {
        let array = seeded();
        let orch = orchestrator(&array);
        let planned = PlannedResource {
            kind: ResourceKind::Host,
            id: "esx-01".into(),
            desired: json!({"consistent_lun": "yes"}),
        };
        let result = orch.apply(planned.kind, &planned.id, &planned.desired).await;
        let report = ApplyReport::from_result(&planned, &result);
        assert!(!report.retryable);
        assert_matches!(result, Err(Error::DesiredDecode { .. }));
        assert!(array.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_forget() {
        let array = seeded();
        let orch = orchestrator(&array);
        orch.import(ResourceKind::StorageGroup, "sg-app").await.unwrap();
        assert!(orch.forget(ResourceKind::StorageGroup, "sg-app").is_some());
        assert!(orch.forget(ResourceKind::StorageGroup, "sg-app").is_none());
        assert_eq!(orch.status().tracked_total, 0);
    }

    #[tokio::test]
    async fn test_list_snapshots() {
        let array = seeded();
        array.insert_snapshot(
            "sg-app",
            SnapshotRecord {
                name: "daily".into(),
                generation: 0,
                timestamp: Utc::now(),
                linked: false,
                restored: false,
                expired: false,
                expiry_date: None,
                secure: false,
                source_volume_ids: vec!["0001A".into()],
            },
        );
        let orch = orchestrator(&array);

        let snapshots = orch.list_snapshots("sg-app").await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].get("name").and_then(AttributeValue::as_str), Some("daily"));
    }
}
