//! Simulated PowerMax Array
//!
//! In-memory stand-in for the array's management API. Holds one array's
//! inventory, applies mutations with the array's validation rules, and keeps
//! a log of every call so callers can check ordering and addressing.
//! Faults can be injected per operation or per operation and target.

use crate::domain::ports::PowerMaxClient;
use crate::domain::records::{
    HostFlags, HostGroupRecord, HostIoLimit, HostRecord, HostSummary, MaskingViewConnection,
    MaskingViewRecord, PortGroupRecord, PortKey, SnapshotPolicyRecord, SnapshotPolicyUpdate,
    SnapshotRecord, StorageGroupRecord, VolumeRecord,
};
use crate::error::{Error, Result};
use crate::resources::snapshot_policy::interval_minutes;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Megabytes per cylinder on FBA devices
const MB_PER_CYLINDER: f64 = 1.875;

// =============================================================================
// Inventory
// =============================================================================

/// Masking view plus the paths it exposes, as stored in an inventory file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingViewFixture {
    #[serde(flatten)]
    pub view: MaskingViewRecord,
    pub connections: Vec<MaskingViewConnection>,
}

/// Serializable array contents (YAML inventory files)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub hosts: Vec<HostRecord>,
    pub host_groups: Vec<HostGroupRecord>,
    pub port_groups: Vec<PortGroupRecord>,
    pub volumes: Vec<VolumeRecord>,
    pub storage_groups: Vec<StorageGroupRecord>,
    pub snapshot_policies: Vec<SnapshotPolicyRecord>,
    pub masking_views: Vec<MaskingViewFixture>,
    /// Snapshot generations keyed by storage group
    pub snapshots: BTreeMap<String, Vec<SnapshotRecord>>,
}

impl Inventory {
    /// Load an inventory from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[derive(Debug, Default)]
struct ArrayState {
    hosts: BTreeMap<String, HostRecord>,
    host_groups: BTreeMap<String, HostGroupRecord>,
    port_groups: BTreeMap<String, PortGroupRecord>,
    volumes: BTreeMap<String, VolumeRecord>,
    storage_groups: BTreeMap<String, StorageGroupRecord>,
    snapshot_policies: BTreeMap<String, SnapshotPolicyRecord>,
    masking_views: BTreeMap<String, MaskingViewFixture>,
    snapshots: BTreeMap<String, Vec<SnapshotRecord>>,
}

fn not_found(kind: &str, name: &str) -> Error {
    Error::ResourceNotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn exists(kind: &str, name: &str) -> Error {
    Error::ResourceExists {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Move a map entry to a new key, refusing to clobber an existing one
fn rekey<T>(map: &mut BTreeMap<String, T>, kind: &str, from: &str, to: &str) -> Result<T> {
    if from != to && map.contains_key(to) {
        return Err(exists(kind, to));
    }
    map.remove(from).ok_or_else(|| not_found(kind, from))
}

// =============================================================================
// Call Log
// =============================================================================

/// One recorded client call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendCall {
    pub operation: String,
    /// Resource identifier the call addressed
    pub target: String,
    pub at: DateTime<Utc>,
}

impl BackendCall {
    pub fn is_read(&self) -> bool {
        self.operation.starts_with("get_") || self.operation.starts_with("list_")
    }
}

// =============================================================================
// Simulated Array
// =============================================================================

/// In-memory array implementing [`PowerMaxClient`]
pub struct SimulatedArray {
    array_id: String,
    state: RwLock<ArrayState>,
    /// `(operation, target)`; a `None` target faults every call of the operation
    faults: RwLock<HashSet<(String, Option<String>)>>,
    calls: Mutex<Vec<BackendCall>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl fmt::Debug for SimulatedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedArray")
            .field("array_id", &self.array_id)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl SimulatedArray {
    /// Create an empty array
    pub fn new(array_id: impl Into<String>) -> Self {
        Self {
            array_id: array_id.into(),
            state: RwLock::new(ArrayState::default()),
            faults: RwLock::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            latency: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create an array holding `inventory`
    pub fn from_inventory(array_id: impl Into<String>, inventory: Inventory) -> Self {
        let array = Self::new(array_id);
        array.load_inventory(inventory);
        array
    }

    /// Delay every call by `latency`; also enables in-flight tracking
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn array_id(&self) -> &str {
        &self.array_id
    }

    /// Merge `inventory` into the array, replacing records with the same id
    pub fn load_inventory(&self, inventory: Inventory) {
        let mut state = self.state.write();
        for r in inventory.hosts {
            state.hosts.insert(r.host_id.clone(), r);
        }
        for r in inventory.host_groups {
            state.host_groups.insert(r.host_group_id.clone(), r);
        }
        for r in inventory.port_groups {
            state.port_groups.insert(r.port_group_id.clone(), r);
        }
        for r in inventory.volumes {
            state.volumes.insert(r.volume_id.clone(), r);
        }
        for r in inventory.storage_groups {
            state.storage_groups.insert(r.storage_group_id.clone(), r);
        }
        for r in inventory.snapshot_policies {
            state.snapshot_policies.insert(r.snapshot_policy_name.clone(), r);
        }
        for r in inventory.masking_views {
            state.masking_views.insert(r.view.masking_view_id.clone(), r);
        }
        for (sg, snaps) in inventory.snapshots {
            state.snapshots.insert(sg, snaps);
        }
        info!(
            "Simulated array {} loaded: {} hosts, {} volumes, {} storage groups, {} masking views",
            self.array_id,
            state.hosts.len(),
            state.volumes.len(),
            state.storage_groups.len(),
            state.masking_views.len()
        );
    }

    /// Current contents as an inventory
    pub fn inventory(&self) -> Inventory {
        let state = self.state.read();
        Inventory {
            hosts: state.hosts.values().cloned().collect(),
            host_groups: state.host_groups.values().cloned().collect(),
            port_groups: state.port_groups.values().cloned().collect(),
            volumes: state.volumes.values().cloned().collect(),
            storage_groups: state.storage_groups.values().cloned().collect(),
            snapshot_policies: state.snapshot_policies.values().cloned().collect(),
            masking_views: state.masking_views.values().cloned().collect(),
            snapshots: state.snapshots.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    pub fn insert_host(&self, record: HostRecord) {
        self.state.write().hosts.insert(record.host_id.clone(), record);
    }

    pub fn insert_host_group(&self, record: HostGroupRecord) {
        self.state
            .write()
            .host_groups
            .insert(record.host_group_id.clone(), record);
    }

    pub fn insert_port_group(&self, record: PortGroupRecord) {
        self.state
            .write()
            .port_groups
            .insert(record.port_group_id.clone(), record);
    }

    pub fn insert_volume(&self, record: VolumeRecord) {
        self.state.write().volumes.insert(record.volume_id.clone(), record);
    }

    pub fn insert_storage_group(&self, record: StorageGroupRecord) {
        self.state
            .write()
            .storage_groups
            .insert(record.storage_group_id.clone(), record);
    }

    pub fn insert_snapshot_policy(&self, record: SnapshotPolicyRecord) {
        self.state
            .write()
            .snapshot_policies
            .insert(record.snapshot_policy_name.clone(), record);
    }

    pub fn insert_masking_view(
        &self,
        view: MaskingViewRecord,
        connections: Vec<MaskingViewConnection>,
    ) {
        self.state.write().masking_views.insert(
            view.masking_view_id.clone(),
            MaskingViewFixture { view, connections },
        );
    }

    pub fn insert_snapshot(&self, storage_group: &str, snapshot: SnapshotRecord) {
        self.state
            .write()
            .snapshots
            .entry(storage_group.to_string())
            .or_default()
            .push(snapshot);
    }

    // -------------------------------------------------------------------------
    // Fault Injection / Call Log
    // -------------------------------------------------------------------------

    /// Fail every subsequent call of `operation`
    pub fn fail_on(&self, operation: &str) {
        self.faults.write().insert((operation.to_string(), None));
    }

    /// Fail subsequent calls of `operation` addressing `target`
    pub fn fail_on_target(&self, operation: &str, target: &str) {
        self.faults
            .write()
            .insert((operation.to_string(), Some(target.to_string())));
    }

    pub fn clear_faults(&self) {
        self.faults.write().clear();
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Mutation calls as `(operation, target)`, in order
    pub fn mutations(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .filter(|c| !c.is_read())
            .map(|c| (c.operation.clone(), c.target.clone()))
            .collect()
    }

    /// Most recent read call as `(operation, target)`
    pub fn last_read(&self) -> Option<(String, String)> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|c| c.is_read())
            .map(|c| (c.operation.clone(), c.target.clone()))
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Highest number of concurrent calls seen (tracked only with latency set)
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Log the call, then check the array id and injected faults
    async fn begin(&self, array: &str, operation: &str, target: &str) -> Result<()> {
        self.calls.lock().push(BackendCall {
            operation: operation.to_string(),
            target: target.to_string(),
            at: Utc::now(),
        });

        if let Some(latency) = self.latency {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        if array != self.array_id {
            return Err(not_found("array", array));
        }

        let faulted = {
            let faults = self.faults.read();
            faults.contains(&(operation.to_string(), None))
                || faults.contains(&(operation.to_string(), Some(target.to_string())))
        };
        if faulted {
            warn!("Simulated array {}: injected fault on {} {}", self.array_id, operation, target);
            return Err(Error::backend(operation, target, "injected fault"));
        }

        debug!("Simulated array {}: {} {}", self.array_id, operation, target);
        Ok(())
    }
}

// =============================================================================
// Mutation Helpers
// =============================================================================

fn add_members(kind: &str, members: &mut Vec<String>, added: &[String]) -> Result<()> {
    if let Some(dup) = added.iter().find(|a| members.contains(a)) {
        return Err(exists(kind, dup));
    }
    members.extend(added.iter().cloned());
    Ok(())
}

fn remove_members(kind: &str, members: &mut Vec<String>, removed: &[String]) -> Result<()> {
    if let Some(missing) = removed.iter().find(|r| !members.contains(r)) {
        return Err(not_found(kind, missing));
    }
    members.retain(|m| !removed.contains(m));
    Ok(())
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

fn capacity_gb(size: f64, cap_unit: &str) -> Result<f64> {
    match cap_unit.to_ascii_uppercase().as_str() {
        "MB" => Ok(size / 1024.0),
        "GB" => Ok(size),
        "TB" => Ok(size * 1024.0),
        "CYL" => Ok(size * MB_PER_CYLINDER / 1024.0),
        other => Err(Error::InvalidAttribute(format!("unknown capacity unit {}", other))),
    }
}

impl ArrayState {
    fn host_mut(&mut self, id: &str) -> Result<&mut HostRecord> {
        self.hosts.get_mut(id).ok_or_else(|| not_found("host", id))
    }

    fn host_group_mut(&mut self, id: &str) -> Result<&mut HostGroupRecord> {
        self.host_groups.get_mut(id).ok_or_else(|| not_found("host_group", id))
    }

    fn port_group_mut(&mut self, id: &str) -> Result<&mut PortGroupRecord> {
        self.port_groups.get_mut(id).ok_or_else(|| not_found("port_group", id))
    }

    fn volume_mut(&mut self, id: &str) -> Result<&mut VolumeRecord> {
        self.volumes.get_mut(id).ok_or_else(|| not_found("volume", id))
    }

    fn storage_group_mut(&mut self, id: &str) -> Result<&mut StorageGroupRecord> {
        self.storage_groups
            .get_mut(id)
            .ok_or_else(|| not_found("storage_group", id))
    }

    fn policy_mut(&mut self, name: &str) -> Result<&mut SnapshotPolicyRecord> {
        self.snapshot_policies
            .get_mut(name)
            .ok_or_else(|| not_found("snapshot_policy", name))
    }

    /// Recompute storage group totals from its member volumes
    fn refresh_storage_group_totals(&mut self, id: &str) {
        let Some(sg) = self.storage_groups.get(id) else {
            return;
        };
        let cap_gb: f64 = sg
            .volume_ids
            .iter()
            .filter_map(|v| self.volumes.get(v))
            .map(|v| v.cap_gb)
            .sum();
        let num = count(sg.volume_ids.len());
        if let Some(sg) = self.storage_groups.get_mut(id) {
            sg.cap_gb = cap_gb;
            sg.num_of_vols = num;
        }
    }
}

// =============================================================================
// Client Implementation
// =============================================================================

#[async_trait]
impl PowerMaxClient for SimulatedArray {
    async fn get_host(&self, array: &str, host_id: &str) -> Result<HostRecord> {
        self.begin(array, "get_host", host_id).await?;
        self.state
            .read()
            .hosts
            .get(host_id)
            .cloned()
            .ok_or_else(|| not_found("host", host_id))
    }

    async fn get_host_group(&self, array: &str, group_id: &str) -> Result<HostGroupRecord> {
        self.begin(array, "get_host_group", group_id).await?;
        self.state
            .read()
            .host_groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| not_found("host_group", group_id))
    }

    async fn get_port_group(&self, array: &str, group_id: &str) -> Result<PortGroupRecord> {
        self.begin(array, "get_port_group", group_id).await?;
        self.state
            .read()
            .port_groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| not_found("port_group", group_id))
    }

    async fn get_volume(&self, array: &str, volume_id: &str) -> Result<VolumeRecord> {
        self.begin(array, "get_volume", volume_id).await?;
        self.state
            .read()
            .volumes
            .get(volume_id)
            .cloned()
            .ok_or_else(|| not_found("volume", volume_id))
    }

    async fn get_storage_group(&self, array: &str, group_id: &str) -> Result<StorageGroupRecord> {
        self.begin(array, "get_storage_group", group_id).await?;
        self.state
            .read()
            .storage_groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| not_found("storage_group", group_id))
    }

    async fn get_snapshot_policy(&self, array: &str, name: &str) -> Result<SnapshotPolicyRecord> {
        self.begin(array, "get_snapshot_policy", name).await?;
        self.state
            .read()
            .snapshot_policies
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("snapshot_policy", name))
    }

    async fn list_masking_views(&self, array: &str) -> Result<Vec<String>> {
        self.begin(array, "list_masking_views", array).await?;
        Ok(self.state.read().masking_views.keys().cloned().collect())
    }

    async fn get_masking_view(&self, array: &str, view_id: &str) -> Result<MaskingViewRecord> {
        self.begin(array, "get_masking_view", view_id).await?;
        self.state
            .read()
            .masking_views
            .get(view_id)
            .map(|f| f.view.clone())
            .ok_or_else(|| not_found("masking_view", view_id))
    }

    async fn get_masking_view_connections(
        &self,
        array: &str,
        view_id: &str,
    ) -> Result<Vec<MaskingViewConnection>> {
        self.begin(array, "get_masking_view_connections", view_id).await?;
        self.state
            .read()
            .masking_views
            .get(view_id)
            .map(|f| f.connections.clone())
            .ok_or_else(|| not_found("masking_view", view_id))
    }

    async fn list_snapshots(
        &self,
        array: &str,
        storage_group: &str,
    ) -> Result<Vec<SnapshotRecord>> {
        self.begin(array, "list_snapshots", storage_group).await?;
        let state = self.state.read();
        if !state.storage_groups.contains_key(storage_group) {
            return Err(not_found("storage_group", storage_group));
        }
        Ok(state.snapshots.get(storage_group).cloned().unwrap_or_default())
    }

    // -------------------------------------------------------------------------
    // Hosts
    // -------------------------------------------------------------------------

    async fn add_host_initiators(
        &self,
        array: &str,
        host_id: &str,
        initiators: &[String],
    ) -> Result<()> {
        self.begin(array, "add_host_initiators", host_id).await?;
        let mut state = self.state.write();
        let host = state.host_mut(host_id)?;
        add_members("initiator", &mut host.initiators, initiators)?;
        host.num_of_initiators = count(host.initiators.len());
        Ok(())
    }

    async fn remove_host_initiators(
        &self,
        array: &str,
        host_id: &str,
        initiators: &[String],
    ) -> Result<()> {
        self.begin(array, "remove_host_initiators", host_id).await?;
        let mut state = self.state.write();
        let host = state.host_mut(host_id)?;
        remove_members("initiator", &mut host.initiators, initiators)?;
        host.num_of_initiators = count(host.initiators.len());
        Ok(())
    }

    async fn set_host_flags(&self, array: &str, host_id: &str, flags: &HostFlags) -> Result<()> {
        self.begin(array, "set_host_flags", host_id).await?;
        let mut state = self.state.write();
        let host = state.host_mut(host_id)?;
        let (enabled, disabled) = flags.to_lists();
        host.enabled_flags = enabled;
        host.disabled_flags = disabled;
        Ok(())
    }

    async fn set_host_consistent_lun(
        &self,
        array: &str,
        host_id: &str,
        consistent_lun: bool,
    ) -> Result<()> {
        self.begin(array, "set_host_consistent_lun", host_id).await?;
        self.state.write().host_mut(host_id)?.consistent_lun = consistent_lun;
        Ok(())
    }

    async fn rename_host(&self, array: &str, host_id: &str, new_name: &str) -> Result<()> {
        self.begin(array, "rename_host", host_id).await?;
        let mut state = self.state.write();
        let mut host = rekey(&mut state.hosts, "host", host_id, new_name)?;
        host.host_id = new_name.to_string();
        state.hosts.insert(new_name.to_string(), host);
        for group in state.host_groups.values_mut() {
            for member in group.hosts.iter_mut().filter(|m| m.host_id == host_id) {
                member.host_id = new_name.to_string();
            }
        }
        for fixture in state.masking_views.values_mut() {
            if fixture.view.host_id.as_deref() == Some(host_id) {
                fixture.view.host_id = Some(new_name.to_string());
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Host Groups
    // -------------------------------------------------------------------------

    async fn add_hosts_to_group(
        &self,
        array: &str,
        group_id: &str,
        host_ids: &[String],
    ) -> Result<()> {
        self.begin(array, "add_hosts_to_group", group_id).await?;
        let mut state = self.state.write();
        let mut added = Vec::with_capacity(host_ids.len());
        for id in host_ids {
            let host = state.hosts.get(id).ok_or_else(|| not_found("host", id))?;
            added.push(HostSummary {
                host_id: host.host_id.clone(),
                initiators: host.initiators.clone(),
            });
        }
        let group = state.host_group_mut(group_id)?;
        if let Some(dup) = added
            .iter()
            .find(|a| group.hosts.iter().any(|h| h.host_id == a.host_id))
        {
            return Err(exists("host", &dup.host_id));
        }
        group.hosts.extend(added);
        group.num_of_hosts = count(group.hosts.len());
        group.num_of_initiators = count(group.hosts.iter().map(|h| h.initiators.len()).sum());
        Ok(())
    }

    async fn remove_hosts_from_group(
        &self,
        array: &str,
        group_id: &str,
        host_ids: &[String],
    ) -> Result<()> {
        self.begin(array, "remove_hosts_from_group", group_id).await?;
        let mut state = self.state.write();
        let group = state.host_group_mut(group_id)?;
        if let Some(missing) = host_ids
            .iter()
            .find(|id| !group.hosts.iter().any(|h| &h.host_id == *id))
        {
            return Err(not_found("host", missing));
        }
        group.hosts.retain(|h| !host_ids.contains(&h.host_id));
        group.num_of_hosts = count(group.hosts.len());
        group.num_of_initiators = count(group.hosts.iter().map(|h| h.initiators.len()).sum());
        Ok(())
    }

    async fn set_host_group_flags(
        &self,
        array: &str,
        group_id: &str,
        flags: &HostFlags,
    ) -> Result<()> {
        self.begin(array, "set_host_group_flags", group_id).await?;
        let mut state = self.state.write();
        let group = state.host_group_mut(group_id)?;
        let (enabled, disabled) = flags.to_lists();
        group.enabled_flags = enabled;
        group.disabled_flags = disabled;
        Ok(())
    }

    async fn set_host_group_consistent_lun(
        &self,
        array: &str,
        group_id: &str,
        consistent_lun: bool,
    ) -> Result<()> {
        self.begin(array, "set_host_group_consistent_lun", group_id).await?;
        self.state.write().host_group_mut(group_id)?.consistent_lun = consistent_lun;
        Ok(())
    }

    async fn rename_host_group(&self, array: &str, group_id: &str, new_name: &str) -> Result<()> {
        self.begin(array, "rename_host_group", group_id).await?;
        let mut state = self.state.write();
        let mut group = rekey(&mut state.host_groups, "host_group", group_id, new_name)?;
        group.host_group_id = new_name.to_string();
        state.host_groups.insert(new_name.to_string(), group);
        for fixture in state.masking_views.values_mut() {
            if fixture.view.host_group_id.as_deref() == Some(group_id) {
                fixture.view.host_group_id = Some(new_name.to_string());
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Port Groups
    // -------------------------------------------------------------------------

    async fn rename_port_group(&self, array: &str, group_id: &str, new_name: &str) -> Result<()> {
        self.begin(array, "rename_port_group", group_id).await?;
        let mut state = self.state.write();
        let mut group = rekey(&mut state.port_groups, "port_group", group_id, new_name)?;
        group.port_group_id = new_name.to_string();
        state.port_groups.insert(new_name.to_string(), group);
        for fixture in state.masking_views.values_mut() {
            if fixture.view.port_group_id == group_id {
                fixture.view.port_group_id = new_name.to_string();
            }
        }
        Ok(())
    }

    async fn add_ports(&self, array: &str, group_id: &str, ports: &[PortKey]) -> Result<()> {
        self.begin(array, "add_ports", group_id).await?;
        let mut state = self.state.write();
        let group = state.port_group_mut(group_id)?;
        if let Some(dup) = ports.iter().find(|p| group.ports.contains(p)) {
            return Err(exists("port", &dup.to_string()));
        }
        group.ports.extend(ports.iter().cloned());
        group.num_of_ports = count(group.ports.len());
        Ok(())
    }

    async fn remove_ports(&self, array: &str, group_id: &str, ports: &[PortKey]) -> Result<()> {
        self.begin(array, "remove_ports", group_id).await?;
        let mut state = self.state.write();
        let group = state.port_group_mut(group_id)?;
        if let Some(missing) = ports.iter().find(|p| !group.ports.contains(p)) {
            return Err(not_found("port", &missing.to_string()));
        }
        group.ports.retain(|p| !ports.contains(p));
        group.num_of_ports = count(group.ports.len());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Volumes
    // -------------------------------------------------------------------------

    async fn rename_volume(&self, array: &str, volume_id: &str, new_label: &str) -> Result<()> {
        self.begin(array, "rename_volume", volume_id).await?;
        self.state.write().volume_mut(volume_id)?.volume_identifier = Some(new_label.to_string());
        Ok(())
    }

    async fn expand_volume(
        &self,
        array: &str,
        volume_id: &str,
        size: f64,
        cap_unit: &str,
    ) -> Result<()> {
        self.begin(array, "expand_volume", volume_id).await?;
        let new_gb = capacity_gb(size, cap_unit)?;
        let mut state = self.state.write();
        let volume = state.volume_mut(volume_id)?;
        if new_gb < volume.cap_gb {
            return Err(Error::backend(
                "expand_volume",
                volume_id,
                format!(
                    "volume size can only be increased ({} GB requested, {} GB allocated)",
                    new_gb, volume.cap_gb
                ),
            ));
        }
        volume.cap_gb = new_gb;
        volume.cap_mb = new_gb * 1024.0;
        volume.cap_cyl = (volume.cap_mb / MB_PER_CYLINDER).ceil() as u64;
        let groups = volume.storage_group_ids.clone();
        for sg in groups {
            state.refresh_storage_group_totals(&sg);
        }
        Ok(())
    }

    async fn set_volume_mobility_id(
        &self,
        array: &str,
        volume_id: &str,
        enabled: bool,
    ) -> Result<()> {
        self.begin(array, "set_volume_mobility_id", volume_id).await?;
        self.state.write().volume_mut(volume_id)?.mobility_id_enabled = enabled;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Storage Groups
    // -------------------------------------------------------------------------

    async fn rename_storage_group(
        &self,
        array: &str,
        group_id: &str,
        new_name: &str,
    ) -> Result<()> {
        self.begin(array, "rename_storage_group", group_id).await?;
        let mut state = self.state.write();
        let mut group = rekey(&mut state.storage_groups, "storage_group", group_id, new_name)?;
        group.storage_group_id = new_name.to_string();
        state.storage_groups.insert(new_name.to_string(), group);

        let rename = |ids: &mut Vec<String>| {
            for id in ids.iter_mut().filter(|id| id.as_str() == group_id) {
                *id = new_name.to_string();
            }
        };
        for volume in state.volumes.values_mut() {
            rename(&mut volume.storage_group_ids);
        }
        for policy in state.snapshot_policies.values_mut() {
            rename(&mut policy.storage_groups);
        }
        for fixture in state.masking_views.values_mut() {
            if fixture.view.storage_group_id == group_id {
                fixture.view.storage_group_id = new_name.to_string();
            }
        }
        if let Some(snaps) = state.snapshots.remove(group_id) {
            state.snapshots.insert(new_name.to_string(), snaps);
        }
        Ok(())
    }

    async fn set_storage_group_compression(
        &self,
        array: &str,
        group_id: &str,
        enabled: bool,
    ) -> Result<()> {
        self.begin(array, "set_storage_group_compression", group_id).await?;
        self.state.write().storage_group_mut(group_id)?.compression = enabled;
        Ok(())
    }

    async fn set_host_io_limit(
        &self,
        array: &str,
        group_id: &str,
        limit: &HostIoLimit,
    ) -> Result<()> {
        self.begin(array, "set_host_io_limit", group_id).await?;
        self.state.write().storage_group_mut(group_id)?.host_io_limit = Some(limit.clone());
        Ok(())
    }

    async fn set_workload(&self, array: &str, group_id: &str, workload: &str) -> Result<()> {
        self.begin(array, "set_workload", group_id).await?;
        self.state.write().storage_group_mut(group_id)?.workload = workload.to_string();
        Ok(())
    }

    async fn set_service_level(
        &self,
        array: &str,
        group_id: &str,
        service_level: &str,
    ) -> Result<()> {
        self.begin(array, "set_service_level", group_id).await?;
        let mut state = self.state.write();
        let group = state.storage_group_mut(group_id)?;
        group.service_level = service_level.to_string();
        group.slo = service_level.to_string();
        Ok(())
    }

    async fn set_srp(&self, array: &str, group_id: &str, srp: &str) -> Result<()> {
        self.begin(array, "set_srp", group_id).await?;
        self.state.write().storage_group_mut(group_id)?.srp = srp.to_string();
        Ok(())
    }

    async fn add_volumes_to_group(
        &self,
        array: &str,
        group_id: &str,
        volume_ids: &[String],
    ) -> Result<()> {
        self.begin(array, "add_volumes_to_group", group_id).await?;
        let mut state = self.state.write();
        if let Some(missing) = volume_ids.iter().find(|v| !state.volumes.contains_key(*v)) {
            return Err(not_found("volume", missing));
        }
        add_members("volume", &mut state.storage_group_mut(group_id)?.volume_ids, volume_ids)?;
        for id in volume_ids {
            let volume = state.volume_mut(id)?;
            volume.storage_group_ids.push(group_id.to_string());
            volume.num_of_storage_groups = count(volume.storage_group_ids.len());
        }
        state.refresh_storage_group_totals(group_id);
        Ok(())
    }

    async fn remove_volumes_from_group(
        &self,
        array: &str,
        group_id: &str,
        volume_ids: &[String],
    ) -> Result<()> {
        self.begin(array, "remove_volumes_from_group", group_id).await?;
        let mut state = self.state.write();
        remove_members("volume", &mut state.storage_group_mut(group_id)?.volume_ids, volume_ids)?;
        for id in volume_ids {
            if let Some(volume) = state.volumes.get_mut(id) {
                volume.storage_group_ids.retain(|sg| sg != group_id);
                volume.num_of_storage_groups = count(volume.storage_group_ids.len());
            }
        }
        state.refresh_storage_group_totals(group_id);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Snapshot Policies
    // -------------------------------------------------------------------------

    async fn rename_snapshot_policy(&self, array: &str, name: &str, new_name: &str) -> Result<()> {
        self.begin(array, "rename_snapshot_policy", name).await?;
        let mut state = self.state.write();
        let mut policy = rekey(&mut state.snapshot_policies, "snapshot_policy", name, new_name)?;
        policy.snapshot_policy_name = new_name.to_string();
        state.snapshot_policies.insert(new_name.to_string(), policy);
        Ok(())
    }

    async fn modify_snapshot_policy(
        &self,
        array: &str,
        name: &str,
        update: &SnapshotPolicyUpdate,
    ) -> Result<()> {
        self.begin(array, "modify_snapshot_policy", name).await?;
        let interval = match &update.interval {
            Some(label) => Some(interval_minutes(label).ok_or_else(|| {
                let reason = format!("invalid interval {}", label);
                Error::backend("modify_snapshot_policy", name, reason)
            })?),
            None => None,
        };
        let mut state = self.state.write();
        let policy = state.policy_mut(name)?;
        if let Some(minutes) = interval {
            policy.interval_minutes = minutes;
        }
        if let Some(offset) = update.offset_minutes {
            if offset >= policy.interval_minutes.max(1) {
                return Err(Error::backend(
                    "modify_snapshot_policy",
                    name,
                    "offset must be shorter than the interval",
                ));
            }
            policy.offset_minutes = offset;
        }
        if let Some(n) = update.snapshot_count {
            policy.snapshot_count = n;
        }
        if let Some(n) = update.compliance_count_warning {
            policy.compliance_count_warning = Some(n);
        }
        if let Some(n) = update.compliance_count_critical {
            policy.compliance_count_critical = Some(n);
        }
        Ok(())
    }

    async fn set_snapshot_policy_suspended(
        &self,
        array: &str,
        name: &str,
        suspended: bool,
    ) -> Result<()> {
        self.begin(array, "set_snapshot_policy_suspended", name).await?;
        self.state.write().policy_mut(name)?.suspended = suspended;
        Ok(())
    }

    async fn associate_storage_groups(
        &self,
        array: &str,
        name: &str,
        groups: &[String],
    ) -> Result<()> {
        self.begin(array, "associate_storage_groups", name).await?;
        let mut state = self.state.write();
        if let Some(missing) = groups.iter().find(|g| !state.storage_groups.contains_key(*g)) {
            return Err(not_found("storage_group", missing));
        }
        let policy = state.policy_mut(name)?;
        add_members("storage_group", &mut policy.storage_groups, groups)?;
        policy.storage_group_count = count(policy.storage_groups.len());
        Ok(())
    }

    async fn disassociate_storage_groups(
        &self,
        array: &str,
        name: &str,
        groups: &[String],
    ) -> Result<()> {
        self.begin(array, "disassociate_storage_groups", name).await?;
        let mut state = self.state.write();
        let policy = state.policy_mut(name)?;
        remove_members("storage_group", &mut policy.storage_groups, groups)?;
        policy.storage_group_count = count(policy.storage_groups.len());
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "simulator"
    }
}
