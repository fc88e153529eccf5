//! Manageable Resource Types
//!
//! Each submodule declares, for one array object type:
//! - its attribute shape,
//! - how its backend record maps onto that shape,
//! - its dependency-ordered field table and the backend call behind each row.
//!
//! Masking views and snapshots are read-only here: they have shapes and
//! record mappings but no field table.

pub mod host;
pub mod host_group;
pub mod masking_view;
pub mod port_group;
pub mod snapshot;
pub mod snapshot_policy;
pub mod storage_group;
pub mod volume;

pub use host::HostResource;
pub use host_group::HostGroupResource;
pub use port_group::PortGroupResource;
pub use snapshot_policy::SnapshotPolicyResource;
pub use storage_group::StorageGroupResource;
pub use volume::VolumeResource;

use crate::domain::records::{FlagSetting, HostFlags};
use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use crate::error::{Error, Result};
use crate::mapping::ObjectWriter;
use serde::{Deserialize, Serialize};

// =============================================================================
// Resource Kind
// =============================================================================

/// Array object types known to the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Host,
    HostGroup,
    PortGroup,
    Volume,
    StorageGroup,
    SnapshotPolicy,
    MaskingView,
    Snapshot,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Host => "host",
            ResourceKind::HostGroup => "host_group",
            ResourceKind::PortGroup => "port_group",
            ResourceKind::Volume => "volume",
            ResourceKind::StorageGroup => "storage_group",
            ResourceKind::SnapshotPolicy => "snapshot_policy",
            ResourceKind::MaskingView => "masking_view",
            ResourceKind::Snapshot => "snapshot",
        }
    }

    /// Whether the kind has a field reconciler
    pub fn is_reconcilable(&self) -> bool {
        !matches!(self, ResourceKind::MaskingView | ResourceKind::Snapshot)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "host" => Ok(ResourceKind::Host),
            "host_group" | "hostgroup" => Ok(ResourceKind::HostGroup),
            "port_group" | "portgroup" => Ok(ResourceKind::PortGroup),
            "volume" => Ok(ResourceKind::Volume),
            "storage_group" | "storagegroup" => Ok(ResourceKind::StorageGroup),
            "snapshot_policy" | "snapshotpolicy" => Ok(ResourceKind::SnapshotPolicy),
            "masking_view" | "maskingview" => Ok(ResourceKind::MaskingView),
            "snapshot" => Ok(ResourceKind::Snapshot),
            other => Err(Error::Configuration(format!("unknown resource kind: {}", other))),
        }
    }
}

// =============================================================================
// Shared Host Flag Handling
// =============================================================================

/// `{enabled, override}` pair
fn flag_setting_shape() -> AttrType {
    ObjectType::new()
        .field("enabled", AttrType::Bool)
        .field("override", AttrType::Bool)
        .into()
}

/// Host flags object shared by hosts and host groups
pub(crate) fn host_flags_shape() -> AttrType {
    HostFlags::NAMES
        .iter()
        .fold(ObjectType::new(), |shape, (attr, _)| {
            shape.field(*attr, flag_setting_shape())
        })
        .into()
}

pub(crate) fn write_host_flags(out: &mut ObjectWriter<'_>, flags: &HostFlags) {
    for (attr, _) in HostFlags::NAMES {
        if let Some(setting) = flags.get(attr) {
            out.object(attr, |w| {
                w.bool("enabled", setting.enabled);
                w.bool("override", setting.override_);
            });
        }
    }
}

/// Host flags from an attribute object; unset parts count as not overridden
pub(crate) fn host_flags_from_value(value: &AttributeValue) -> Result<HostFlags> {
    if value.as_object().is_none() {
        return Err(Error::InvalidAttribute(format!(
            "host_flags: expected object, found {}",
            value.type_name()
        )));
    }
    let mut flags = HostFlags::default();
    for (attr, _) in HostFlags::NAMES {
        let Some(setting) = flags.get_mut(attr) else {
            continue;
        };
        let bit = |name: &str| {
            value
                .path(&format!("{}.{}", attr, name))
                .and_then(AttributeValue::as_bool)
        };
        *setting = FlagSetting {
            enabled: bit("enabled").unwrap_or(false),
            override_: bit("override").unwrap_or(false),
        };
    }
    Ok(flags)
}

/// Desired host flags with `override: true` implied by `enabled: true`.
/// The array only carries overridden flags, so enabling one without an
/// override would never show up on refresh.
pub(crate) fn normalize_host_flags(
    want: &AttributeValue,
) -> std::result::Result<AttributeValue, String> {
    let Some(flags) = want.as_object() else {
        return Ok(want.clone());
    };
    let mut flags = flags.clone();
    for (attr, setting) in flags.iter_mut() {
        let AttributeValue::Object(bits) = setting else {
            continue;
        };
        if bits.get("enabled").and_then(AttributeValue::as_bool) != Some(true) {
            continue;
        }
        match bits.get("override") {
            Some(AttributeValue::Bool(true)) => {}
            Some(AttributeValue::Bool(false)) => {
                return Err(format!("host_flags.{}: enabling a flag requires override", attr));
            }
            _ => {
                bits.insert("override".to_string(), AttributeValue::Bool(true));
            }
        }
    }
    Ok(AttributeValue::Object(flags))
}

/// String elements of a collection change
pub(crate) fn string_elements(elements: &[AttributeValue]) -> Result<Vec<String>> {
    elements
        .iter()
        .map(|e| {
            e.as_str().map(str::to_string).ok_or_else(|| {
                Error::InvalidAttribute(format!("expected string element, found {}", e.type_name()))
            })
        })
        .collect()
}

/// Replacement value of a scalar change, as a string
pub(crate) fn required_str<'a>(field: &str, value: Option<&'a AttributeValue>) -> Result<&'a str> {
    value
        .and_then(AttributeValue::as_str)
        .ok_or_else(|| Error::InvalidAttribute(format!("{}: expected string value", field)))
}

/// Replacement value of a scalar change, as a bool
pub(crate) fn required_bool(field: &str, value: Option<&AttributeValue>) -> Result<bool> {
    value
        .and_then(AttributeValue::as_bool)
        .ok_or_else(|| Error::InvalidAttribute(format!("{}: expected bool value", field)))
}

/// Replacement value of a scalar change, as a non-negative integer
pub(crate) fn required_u64(field: &str, value: Option<&AttributeValue>) -> Result<u64> {
    value
        .and_then(AttributeValue::as_i64)
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| Error::InvalidAttribute(format!("{}: expected non-negative integer", field)))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by the per-resource tests

    use crate::controlplane::backends::SimulatedArray;
    use crate::domain::ports::PowerMaxClientRef;
    use std::sync::Arc;

    pub const ARRAY: &str = "000197900123";

    pub fn client(array: &Arc<SimulatedArray>) -> PowerMaxClientRef {
        array.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_resource_kind_parse_and_display() {
        assert_eq!(ResourceKind::from_str("storage-group").unwrap(), ResourceKind::StorageGroup);
        assert_eq!(ResourceKind::from_str("HostGroup").unwrap(), ResourceKind::HostGroup);
        assert_eq!(ResourceKind::SnapshotPolicy.to_string(), "snapshot_policy");
        assert!(ResourceKind::from_str("lun").is_err());
        assert!(!ResourceKind::MaskingView.is_reconcilable());
    }

    #[test]
    fn test_host_flags_value_conversion() {
        let value = AttributeValue::object([(
            "scsi_3",
            AttributeValue::object([
                ("enabled", AttributeValue::Bool(true)),
                ("override", AttributeValue::Bool(true)),
            ]),
        )]);
        let flags = host_flags_from_value(&value).unwrap();
        assert!(flags.scsi_3.enabled && flags.scsi_3.override_);
        assert!(!flags.openvms.override_);

        assert!(host_flags_from_value(&AttributeValue::from("x")).is_err());
    }

    #[test]
    fn test_enabled_host_flag_implies_override() {
        let want = AttributeValue::object([
            (
                "scsi_3",
                AttributeValue::object([
                    ("enabled", AttributeValue::Bool(true)),
                    ("override", AttributeValue::Unknown),
                ]),
            ),
            (
                "openvms",
                AttributeValue::object([
                    ("enabled", AttributeValue::Bool(false)),
                    ("override", AttributeValue::Unknown),
                ]),
            ),
            ("spc2_protocol_version", AttributeValue::Unknown),
        ]);
        let normalized = normalize_host_flags(&want).unwrap();
        assert_eq!(normalized.path("scsi_3.override"), Some(&AttributeValue::Bool(true)));
        assert_eq!(normalized.path("openvms.override"), Some(&AttributeValue::Unknown));
        assert_eq!(normalized.get("spc2_protocol_version"), Some(&AttributeValue::Unknown));

        let contradictory = AttributeValue::object([(
            "scsi_3",
            AttributeValue::object([
                ("enabled", AttributeValue::Bool(true)),
                ("override", AttributeValue::Bool(false)),
            ]),
        )]);
        let reason = normalize_host_flags(&contradictory).unwrap_err();
        assert!(reason.contains("scsi_3"), "{}", reason);
    }

    #[test]
    fn test_string_elements() {
        let ok = string_elements(&["a".into(), "b".into()]).unwrap();
        assert_eq!(ok, vec!["a", "b"]);
        assert!(string_elements(&[AttributeValue::Int(1)]).is_err());
    }
}
