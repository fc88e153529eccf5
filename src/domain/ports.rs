//! Domain Ports - Boundaries between the reconcile core and the outside
//!
//! The core never talks to the array directly: it goes through
//! [`PowerMaxClient`], and it reports non-fatal problems into a
//! [`Diagnostics`] sink it never reads back.

use crate::domain::records::{
    HostFlags, HostGroupRecord, HostIoLimit, HostRecord, MaskingViewConnection,
    MaskingViewRecord, PortGroupRecord, PortKey, SnapshotPolicyRecord, SnapshotPolicyUpdate,
    SnapshotRecord, StorageGroupRecord, VolumeRecord,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Array Client Port
// =============================================================================

/// Port for the storage-array management client.
///
/// Every call names the array (symmetrix id) first and the resource second.
/// Mutations return `Ok(())` once the array has committed the change.
#[async_trait]
pub trait PowerMaxClient: Send + Sync {
    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    async fn get_host(&self, array: &str, host_id: &str) -> Result<HostRecord>;

    async fn get_host_group(&self, array: &str, group_id: &str) -> Result<HostGroupRecord>;

    async fn get_port_group(&self, array: &str, group_id: &str) -> Result<PortGroupRecord>;

    async fn get_volume(&self, array: &str, volume_id: &str) -> Result<VolumeRecord>;

    async fn get_storage_group(&self, array: &str, group_id: &str) -> Result<StorageGroupRecord>;

    async fn get_snapshot_policy(&self, array: &str, name: &str) -> Result<SnapshotPolicyRecord>;

    async fn list_masking_views(&self, array: &str) -> Result<Vec<String>>;

    async fn get_masking_view(&self, array: &str, view_id: &str) -> Result<MaskingViewRecord>;

    async fn get_masking_view_connections(
        &self,
        array: &str,
        view_id: &str,
    ) -> Result<Vec<MaskingViewConnection>>;

    async fn list_snapshots(&self, array: &str, storage_group: &str) -> Result<Vec<SnapshotRecord>>;

    // -------------------------------------------------------------------------
    // Hosts
    // -------------------------------------------------------------------------

    async fn add_host_initiators(
        &self,
        array: &str,
        host_id: &str,
        initiators: &[String],
    ) -> Result<()>;

    async fn remove_host_initiators(
        &self,
        array: &str,
        host_id: &str,
        initiators: &[String],
    ) -> Result<()>;

    async fn set_host_flags(&self, array: &str, host_id: &str, flags: &HostFlags) -> Result<()>;

    async fn set_host_consistent_lun(
        &self,
        array: &str,
        host_id: &str,
        consistent_lun: bool,
    ) -> Result<()>;

    async fn rename_host(&self, array: &str, host_id: &str, new_name: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Host Groups
    // -------------------------------------------------------------------------

    async fn add_hosts_to_group(
        &self,
        array: &str,
        group_id: &str,
        host_ids: &[String],
    ) -> Result<()>;

    async fn remove_hosts_from_group(
        &self,
        array: &str,
        group_id: &str,
        host_ids: &[String],
    ) -> Result<()>;

    async fn set_host_group_flags(
        &self,
        array: &str,
        group_id: &str,
        flags: &HostFlags,
    ) -> Result<()>;

    async fn set_host_group_consistent_lun(
        &self,
        array: &str,
        group_id: &str,
        consistent_lun: bool,
    ) -> Result<()>;

    async fn rename_host_group(&self, array: &str, group_id: &str, new_name: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Port Groups
    // -------------------------------------------------------------------------

    async fn rename_port_group(&self, array: &str, group_id: &str, new_name: &str) -> Result<()>;

    async fn add_ports(&self, array: &str, group_id: &str, ports: &[PortKey]) -> Result<()>;

    async fn remove_ports(&self, array: &str, group_id: &str, ports: &[PortKey]) -> Result<()>;

    // -------------------------------------------------------------------------
    // Volumes
    // -------------------------------------------------------------------------

    /// Change the volume identifier label; the volume id itself is fixed
    async fn rename_volume(&self, array: &str, volume_id: &str, new_label: &str) -> Result<()>;

    async fn expand_volume(
        &self,
        array: &str,
        volume_id: &str,
        size: f64,
        cap_unit: &str,
    ) -> Result<()>;

    async fn set_volume_mobility_id(
        &self,
        array: &str,
        volume_id: &str,
        enabled: bool,
    ) -> Result<()>;

    // -------------------------------------------------------------------------
    // Storage Groups
    // -------------------------------------------------------------------------

    async fn rename_storage_group(&self, array: &str, group_id: &str, new_name: &str) -> Result<()>;

    async fn set_storage_group_compression(
        &self,
        array: &str,
        group_id: &str,
        enabled: bool,
    ) -> Result<()>;

    async fn set_host_io_limit(
        &self,
        array: &str,
        group_id: &str,
        limit: &HostIoLimit,
    ) -> Result<()>;

    async fn set_workload(&self, array: &str, group_id: &str, workload: &str) -> Result<()>;

    async fn set_service_level(
        &self,
        array: &str,
        group_id: &str,
        service_level: &str,
    ) -> Result<()>;

    async fn set_srp(&self, array: &str, group_id: &str, srp: &str) -> Result<()>;

    async fn add_volumes_to_group(
        &self,
        array: &str,
        group_id: &str,
        volume_ids: &[String],
    ) -> Result<()>;

    async fn remove_volumes_from_group(
        &self,
        array: &str,
        group_id: &str,
        volume_ids: &[String],
    ) -> Result<()>;

    // -------------------------------------------------------------------------
    // Snapshot Policies
    // -------------------------------------------------------------------------

    async fn rename_snapshot_policy(&self, array: &str, name: &str, new_name: &str) -> Result<()>;

    async fn modify_snapshot_policy(
        &self,
        array: &str,
        name: &str,
        update: &SnapshotPolicyUpdate,
    ) -> Result<()>;

    async fn set_snapshot_policy_suspended(
        &self,
        array: &str,
        name: &str,
        suspended: bool,
    ) -> Result<()>;

    async fn associate_storage_groups(
        &self,
        array: &str,
        name: &str,
        groups: &[String],
    ) -> Result<()>;

    async fn disassociate_storage_groups(
        &self,
        array: &str,
        name: &str,
        groups: &[String],
    ) -> Result<()>;

    /// Client name for logging
    fn backend_name(&self) -> &str;
}

pub type PowerMaxClientRef = Arc<dyn PowerMaxClient>;

// =============================================================================
// Diagnostics Sink
// =============================================================================

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single `(summary, detail)` diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

/// Append-only diagnostics collector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Severity::Warning, summary, detail);
    }

    pub fn error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.push(Severity::Error, summary, detail);
    }

    fn push(&mut self, severity: Severity, summary: impl Into<String>, detail: impl Into<String>) {
        self.entries.push(Diagnostic {
            severity,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}
