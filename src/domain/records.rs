//! Backend Domain Records
//!
//! Records as the array's management API returns them. Field names follow
//! the array payloads (snake_cased); the record mapper translates them into
//! the attribute names the configuration engine uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Hosts
// =============================================================================

/// Host as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRecord {
    pub host_id: String,
    pub num_of_masking_views: u64,
    pub num_of_initiators: u64,
    pub num_of_host_groups: u64,
    pub port_flags_override: bool,
    pub consistent_lun: bool,
    /// Comma-separated flag names explicitly enabled
    pub enabled_flags: String,
    /// Comma-separated flag names explicitly disabled
    pub disabled_flags: String,
    pub host_type: String,
    pub initiators: Vec<String>,
    pub masking_views: Vec<String>,
    pub powerpath_hosts: Vec<String>,
    pub num_of_powerpath_hosts: u64,
    pub bw_limit: Option<u64>,
}

/// Host member summary inside a host group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSummary {
    pub host_id: String,
    pub initiators: Vec<String>,
}

/// Host group as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostGroupRecord {
    pub host_group_id: String,
    pub num_of_masking_views: u64,
    pub num_of_initiators: u64,
    pub num_of_hosts: u64,
    pub port_flags_override: bool,
    pub consistent_lun: bool,
    pub enabled_flags: String,
    pub disabled_flags: String,
    pub host_group_type: String,
    pub hosts: Vec<HostSummary>,
    pub masking_views: Vec<String>,
}

/// Settable host flag values
///
/// Each flag has an `enabled` value and an `override` bit; a flag that is not
/// overridden inherits the array default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSetting {
    pub enabled: bool,
    #[serde(rename = "override")]
    pub override_: bool,
}

/// Host flags settable on hosts and host groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostFlags {
    pub volume_set_addressing: FlagSetting,
    pub disable_q_reset_on_ua: FlagSetting,
    pub environ_set: FlagSetting,
    pub avoid_reset_broadcast: FlagSetting,
    pub openvms: FlagSetting,
    pub scsi_3: FlagSetting,
    pub spc2_protocol_version: FlagSetting,
    pub scsi_support1: FlagSetting,
}

impl HostFlags {
    /// Attribute name and array flag name for each settable flag, in order
    pub const NAMES: [(&'static str, &'static str); 8] = [
        ("volume_set_addressing", "Volume_Set_Addressing"),
        ("disable_q_reset_on_ua", "Disable_Q_Reset_on_UA"),
        ("environ_set", "Environ_Set"),
        ("avoid_reset_broadcast", "Avoid_Reset_Broadcast"),
        ("openvms", "OpenVMS"),
        ("scsi_3", "SCSI_3"),
        ("spc2_protocol_version", "SPC2_Protocol_Version"),
        ("scsi_support1", "SCSI_Support1"),
    ];

    pub fn get(&self, attr: &str) -> Option<&FlagSetting> {
        Some(match attr {
            "volume_set_addressing" => &self.volume_set_addressing,
            "disable_q_reset_on_ua" => &self.disable_q_reset_on_ua,
            "environ_set" => &self.environ_set,
            "avoid_reset_broadcast" => &self.avoid_reset_broadcast,
            "openvms" => &self.openvms,
            "scsi_3" => &self.scsi_3,
            "spc2_protocol_version" => &self.spc2_protocol_version,
            "scsi_support1" => &self.scsi_support1,
            _ => return None,
        })
    }

    pub fn get_mut(&mut self, attr: &str) -> Option<&mut FlagSetting> {
        Some(match attr {
            "volume_set_addressing" => &mut self.volume_set_addressing,
            "disable_q_reset_on_ua" => &mut self.disable_q_reset_on_ua,
            "environ_set" => &mut self.environ_set,
            "avoid_reset_broadcast" => &mut self.avoid_reset_broadcast,
            "openvms" => &mut self.openvms,
            "scsi_3" => &mut self.scsi_3,
            "spc2_protocol_version" => &mut self.spc2_protocol_version,
            "scsi_support1" => &mut self.scsi_support1,
            _ => return None,
        })
    }

    /// Rebuild flag settings from the array's enabled/disabled name lists.
    /// A flag named in either list is overridden.
    pub fn from_lists(enabled: &str, disabled: &str) -> Self {
        let split = |s: &str| -> Vec<String> {
            s.split(',')
                .map(|p| p.trim().to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };
        let enabled = split(enabled);
        let disabled = split(disabled);

        let mut flags = HostFlags::default();
        for (attr, array_name) in Self::NAMES {
            let key = array_name.to_ascii_lowercase();
            if let Some(setting) = flags.get_mut(attr) {
                if enabled.contains(&key) {
                    *setting = FlagSetting { enabled: true, override_: true };
                } else if disabled.contains(&key) {
                    *setting = FlagSetting { enabled: false, override_: true };
                }
            }
        }
        flags
    }

    /// Render as the array's enabled/disabled name lists
    pub fn to_lists(&self) -> (String, String) {
        let mut enabled = Vec::new();
        let mut disabled = Vec::new();
        for (attr, array_name) in Self::NAMES {
            match self.get(attr) {
                Some(FlagSetting { override_: true, enabled: true }) => enabled.push(array_name),
                Some(FlagSetting { override_: true, enabled: false }) => disabled.push(array_name),
                _ => {}
            }
        }
        (enabled.join(","), disabled.join(","))
    }
}

// =============================================================================
// Port Groups
// =============================================================================

/// Front-end director port
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(default)]
pub struct PortKey {
    pub director_id: String,
    pub port_id: String,
}

impl std::fmt::Display for PortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.director_id, self.port_id)
    }
}

/// Port group as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortGroupRecord {
    pub port_group_id: String,
    pub protocol: String,
    pub num_of_ports: u64,
    pub num_of_masking_views: u64,
    pub ports: Vec<PortKey>,
    pub masking_views: Vec<String>,
}

// =============================================================================
// Volumes
// =============================================================================

/// Volume as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeRecord {
    pub volume_id: String,
    pub volume_identifier: Option<String>,
    pub cap_gb: f64,
    pub cap_mb: f64,
    pub cap_cyl: u64,
    pub volume_type: String,
    pub emulation: String,
    pub status: String,
    pub allocated_percent: u64,
    pub wwn: String,
    pub effective_wwn: String,
    pub has_effective_wwn: bool,
    pub encapsulated: bool,
    pub num_of_storage_groups: u64,
    pub num_of_front_end_paths: u64,
    pub storage_group_ids: Vec<String>,
    pub mobility_id_enabled: bool,
    pub snapvx_source: bool,
    pub snapvx_target: bool,
}

// =============================================================================
// Storage Groups
// =============================================================================

/// Host I/O limit settings of a storage group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostIoLimit {
    pub host_io_limit_mb_sec: String,
    pub host_io_limit_io_sec: String,
    pub dynamic_distribution: String,
}

/// Storage group as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageGroupRecord {
    pub storage_group_id: String,
    pub srp: String,
    pub slo: String,
    pub service_level: String,
    pub workload: String,
    pub slo_compliance: String,
    pub num_of_vols: u64,
    pub num_of_child_sgs: u64,
    pub num_of_parent_sgs: u64,
    pub num_of_masking_views: u64,
    pub num_of_snapshots: u64,
    pub cap_gb: f64,
    pub device_emulation: String,
    pub sg_type: String,
    pub unprotected: bool,
    pub compression: bool,
    pub compression_ratio: String,
    pub child_storage_groups: Vec<String>,
    pub parent_storage_groups: Vec<String>,
    pub masking_views: Vec<String>,
    pub host_io_limit: Option<HostIoLimit>,
    pub volume_ids: Vec<String>,
    pub tags: String,
}

// =============================================================================
// Snapshot Policies
// =============================================================================

/// Snapshot policy as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotPolicyRecord {
    pub snapshot_policy_name: String,
    pub interval_minutes: u64,
    pub offset_minutes: u64,
    pub snapshot_count: u64,
    pub compliance_count_warning: Option<u64>,
    pub compliance_count_critical: Option<u64>,
    pub secure: bool,
    pub suspended: bool,
    pub storage_group_count: u64,
    pub last_time_used: String,
    pub provider_name: String,
    pub retention_days: Option<u64>,
    pub storage_groups: Vec<String>,
}

/// Partial update carried by a single snapshot policy modify call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPolicyUpdate {
    pub interval: Option<String>,
    pub offset_minutes: Option<u64>,
    pub snapshot_count: Option<u64>,
    pub compliance_count_warning: Option<u64>,
    pub compliance_count_critical: Option<u64>,
}

// =============================================================================
// Masking Views
// =============================================================================

/// Masking view as reported by the array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingViewRecord {
    pub masking_view_id: String,
    pub host_id: Option<String>,
    pub host_group_id: Option<String>,
    pub port_group_id: String,
    pub storage_group_id: String,
}

/// One volume/initiator/port path exposed through a masking view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskingViewConnection {
    pub volume_id: String,
    pub host_lun_address: String,
    pub cap_gb: f64,
    pub initiator_id: String,
    pub dir_port: String,
    pub logged_in: bool,
    pub port_wwn: String,
}

// =============================================================================
// Snapshots
// =============================================================================

/// SnapVX snapshot generation of a storage group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub name: String,
    pub generation: u64,
    pub timestamp: DateTime<Utc>,
    pub linked: bool,
    pub restored: bool,
    pub expired: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub secure: bool,
    pub source_volume_ids: Vec<String>,
}
