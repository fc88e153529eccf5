//! Snapshot Policy
//!
//! Schedule settings go through one modify call each; `suspended` and the
//! storage group associations have calls of their own.

use super::{required_bool, required_str, required_u64, string_elements, ResourceKind};
use crate::domain::ports::PowerMaxClientRef;
use crate::domain::records::{SnapshotPolicyRecord, SnapshotPolicyUpdate};
use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use crate::error::{Error, Result};
use crate::mapping::{ObjectWriter, Record};
use crate::reconcile::change::ChangeKind;
use crate::reconcile::engine::{
    DesiredConfig, FieldOp, FieldSpec, MutationPath, ObservedState, Resource,
};
use async_trait::async_trait;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicyField {
    Name,
    Interval,
    OffsetMinutes,
    SnapshotCount,
    ComplianceCountWarning,
    ComplianceCountCritical,
    Suspended,
    StorageGroups,
    Secure,
}

const FIELDS: [FieldSpec<SnapshotPolicyField>; 9] = [
    FieldSpec::new(SnapshotPolicyField::Name, "name", MutationPath::Rename),
    FieldSpec::new(SnapshotPolicyField::Interval, "interval", MutationPath::Replace),
    FieldSpec::new(SnapshotPolicyField::OffsetMinutes, "offset_minutes", MutationPath::Replace),
    FieldSpec::new(SnapshotPolicyField::SnapshotCount, "snapshot_count", MutationPath::Replace),
    FieldSpec::new(
        SnapshotPolicyField::ComplianceCountWarning,
        "compliance_count_warning",
        MutationPath::Replace,
    ),
    FieldSpec::new(
        SnapshotPolicyField::ComplianceCountCritical,
        "compliance_count_critical",
        MutationPath::Replace,
    ),
    FieldSpec::new(SnapshotPolicyField::Suspended, "suspended", MutationPath::Replace),
    FieldSpec::new(SnapshotPolicyField::StorageGroups, "storage_groups", MutationPath::Collection),
    FieldSpec::new(SnapshotPolicyField::Secure, "secure", MutationPath::Unsupported),
];

// =============================================================================
// Interval Labels
// =============================================================================

const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;

/// Render a schedule interval the way the array names it ("10 Minutes",
/// "1 Hour", "7 Days")
pub fn interval_label(minutes: u64) -> String {
    let (count, unit) = if minutes > 0 && minutes % MINUTES_PER_DAY == 0 {
        (minutes / MINUTES_PER_DAY, "Day")
    } else if minutes > 0 && minutes % MINUTES_PER_HOUR == 0 {
        (minutes / MINUTES_PER_HOUR, "Hour")
    } else {
        (minutes, "Minute")
    };
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Inverse of [`interval_label`]
pub fn interval_minutes(label: &str) -> Option<u64> {
    let mut parts = label.split_whitespace();
    let count: u64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?.to_ascii_lowercase();
    if parts.next().is_some() {
        return None;
    }
    let scale = match unit.trim_end_matches('s') {
        "minute" => 1,
        "hour" => MINUTES_PER_HOUR,
        "day" => MINUTES_PER_DAY,
        _ => return None,
    };
    count.checked_mul(scale)
}

fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        ObjectType::new()
            .field("id", AttrType::String)
            .field("name", AttrType::String)
            .field("interval", AttrType::String)
            .field("offset_minutes", AttrType::Int)
            .field("snapshot_count", AttrType::Int)
            .field("compliance_count_warning", AttrType::Int)
            .field("compliance_count_critical", AttrType::Int)
            .field("secure", AttrType::Bool)
            .field("suspended", AttrType::Bool)
            .field("storage_group_count", AttrType::Int)
            .field("last_time_used", AttrType::String)
            .field("provider_name", AttrType::String)
            .field("retention_days", AttrType::Int)
            .field("storage_groups", AttrType::set_of(AttrType::String))
            .into()
    })
}

impl Record for SnapshotPolicyRecord {
    const KIND: &'static str = "snapshot_policy";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        out.string("id", &self.snapshot_policy_name);
        out.string("name", &self.snapshot_policy_name);
        out.string("interval", interval_label(self.interval_minutes));
        out.int("offset_minutes", self.offset_minutes);
        out.int("snapshot_count", self.snapshot_count);
        out.opt_int("compliance_count_warning", self.compliance_count_warning);
        out.opt_int("compliance_count_critical", self.compliance_count_critical);
        out.bool("secure", self.secure);
        out.bool("suspended", self.suspended);
        out.int("storage_group_count", self.storage_group_count);
        out.string("last_time_used", &self.last_time_used);
        out.string("provider_name", &self.provider_name);
        out.opt_int("retention_days", self.retention_days);
        out.strings("storage_groups", &self.storage_groups);
    }
}

/// Snapshot policy reconciler binding
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotPolicyResource;

#[async_trait]
impl Resource for SnapshotPolicyResource {
    type Field = SnapshotPolicyField;
    type Record = SnapshotPolicyRecord;

    fn kind(&self) -> ResourceKind {
        ResourceKind::SnapshotPolicy
    }

    fn shape(&self) -> &AttrType {
        shape()
    }

    fn identifier(&self) -> &'static str {
        "name"
    }

    fn fields(&self) -> &[FieldSpec<SnapshotPolicyField>] {
        &FIELDS
    }

    async fn read(
        &self,
        client: &PowerMaxClientRef,
        array: &str,
        id: &str,
    ) -> Result<SnapshotPolicyRecord> {
        client.get_snapshot_policy(array, id).await
    }

    async fn apply(
        &self,
        client: &PowerMaxClientRef,
        field: SnapshotPolicyField,
        op: FieldOp<'_>,
    ) -> Result<()> {
        let change = op.change;
        let value = change.value();
        let update = match field {
            SnapshotPolicyField::Name => {
                let new_name = required_str("name", value)?;
                return client.rename_snapshot_policy(op.array, op.id, new_name).await;
            }
            SnapshotPolicyField::Suspended => {
                let suspended = required_bool("suspended", value)?;
                return client.set_snapshot_policy_suspended(op.array, op.id, suspended).await;
            }
            SnapshotPolicyField::StorageGroups => {
                let groups = string_elements(change.elements())?;
                return match change.kind {
                    ChangeKind::Add => {
                        client.associate_storage_groups(op.array, op.id, &groups).await
                    }
                    ChangeKind::Remove => {
                        client.disassociate_storage_groups(op.array, op.id, &groups).await
                    }
                    ChangeKind::Replace => Err(Error::Internal(
                        "storage_groups are edited by associate/disassociate".into(),
                    )),
                };
            }
            SnapshotPolicyField::Secure => {
                return Err(Error::Internal("snapshot policy secure flag is not mutable".into()))
            }
            SnapshotPolicyField::Interval => {
                let label = required_str("interval", value)?;
                if interval_minutes(label).is_none() {
                    let reason = format!("interval: unrecognised \"{}\"", label);
                    return Err(Error::InvalidAttribute(reason));
                }
                SnapshotPolicyUpdate {
                    interval: Some(label.to_string()),
                    ..Default::default()
                }
            }
            SnapshotPolicyField::OffsetMinutes => SnapshotPolicyUpdate {
                offset_minutes: Some(required_u64("offset_minutes", value)?),
                ..Default::default()
            },
            SnapshotPolicyField::SnapshotCount => SnapshotPolicyUpdate {
                snapshot_count: Some(required_u64("snapshot_count", value)?),
                ..Default::default()
            },
            SnapshotPolicyField::ComplianceCountWarning => SnapshotPolicyUpdate {
                compliance_count_warning: Some(required_u64("compliance_count_warning", value)?),
                ..Default::default()
            },
            SnapshotPolicyField::ComplianceCountCritical => SnapshotPolicyUpdate {
                compliance_count_critical: Some(required_u64("compliance_count_critical", value)?),
                ..Default::default()
            },
        };
        client.modify_snapshot_policy(op.array, op.id, &update).await
    }

    /// Intervals compare by duration: "24 Hours" is the array's "1 Day"
    fn normalize(
        &self,
        field: SnapshotPolicyField,
        want: &AttributeValue,
        _desired: &DesiredConfig,
        _observed: &ObservedState,
    ) -> std::result::Result<AttributeValue, String> {
        match (field, want.as_str()) {
            (SnapshotPolicyField::Interval, Some(label)) => interval_minutes(label)
                .map(|minutes| AttributeValue::from(interval_label(minutes)))
                .ok_or_else(|| format!("interval: unrecognised \"{}\"", label)),
            _ => Ok(want.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::SimulatedArray;
    use crate::domain::records::StorageGroupRecord;
    use crate::mapping::{map_record, unassigned_fields};
    use crate::reconcile::engine::Reconciler;
    use crate::resources::testing::{client, ARRAY};
    use serde_json::json;
    use std::sync::Arc;

    fn seeded() -> Arc<SimulatedArray> {
        let array = Arc::new(SimulatedArray::new(ARRAY));
        array.insert_snapshot_policy(SnapshotPolicyRecord {
            snapshot_policy_name: "daily".into(),
            interval_minutes: MINUTES_PER_DAY,
            snapshot_count: 7,
            storage_groups: vec!["sg1".into()],
            ..Default::default()
        });
        for id in ["sg1", "sg2"] {
            array.insert_storage_group(StorageGroupRecord {
                storage_group_id: id.into(),
                ..Default::default()
            });
        }
        array
    }

    #[test]
    fn test_interval_labels() {
        assert_eq!(interval_label(10), "10 Minutes");
        assert_eq!(interval_label(60), "1 Hour");
        assert_eq!(interval_label(720), "12 Hours");
        assert_eq!(interval_label(1440), "1 Day");
        assert_eq!(interval_label(10080), "7 Days");
        assert_eq!(interval_minutes("12 Hours"), Some(720));
        assert_eq!(interval_minutes("1 day"), Some(1440));
        assert_eq!(interval_minutes("fortnightly"), None);
        assert_eq!(interval_minutes("2 Weeks"), None);
    }

    #[test]
    fn test_mapping_assigns_every_field() {
        let record = SnapshotPolicyRecord {
            snapshot_policy_name: "hourly".into(),
            interval_minutes: 60,
            compliance_count_warning: Some(2),
            ..Default::default()
        };
        let mapped = map_record(Some(&record), shape()).unwrap();
        assert!(mapped.skipped.is_empty());
        assert!(unassigned_fields(&mapped.value, shape().as_object().unwrap()).is_empty());
        assert_eq!(mapped.value.get("interval"), Some(&AttributeValue::from("1 Hour")));
        assert_eq!(mapped.value.get("compliance_count_critical"), Some(&AttributeValue::Null));
    }

    #[tokio::test]
    async fn test_schedule_fields_modify_one_at_a_time() {
        let array = seeded();
        let reconciler = Reconciler::new(SnapshotPolicyResource, client(&array), ARRAY);
        let observed = reconciler.read("daily").await.unwrap();

        let desired = reconciler
            .decode(&json!({
                "name": "twice-daily",
                "interval": "12 Hours",
                "snapshot_count": 14,
                "suspended": true,
                "storage_groups": ["sg1", "sg2"]
            }))
            .unwrap();
        let result = reconciler.reconcile(&desired, &observed).await.unwrap();

        assert!(!result.has_failures(), "{}", result.summary());
        let ops: Vec<String> = array.mutations().into_iter().map(|(op, _)| op).collect();
        assert_eq!(
            ops,
            vec![
                "rename_snapshot_policy",
                "modify_snapshot_policy",
                "modify_snapshot_policy",
                "set_snapshot_policy_suspended",
                "associate_storage_groups",
            ]
        );
        let refreshed = &result.observed;
        assert_eq!(refreshed.id(), Some("twice-daily"));
        assert_eq!(refreshed.get("interval"), &AttributeValue::from("12 Hours"));
        assert_eq!(refreshed.get("snapshot_count"), &AttributeValue::Int(14));
        assert_eq!(refreshed.get("suspended"), &AttributeValue::Bool(true));
    }

    #[tokio::test]
    async fn test_bad_interval_fails_only_that_field() {
        let array = seeded();
        let reconciler = Reconciler::new(SnapshotPolicyResource, client(&array), ARRAY);
        let observed = reconciler.read("daily").await.unwrap();

        let desired = reconciler
            .decode(&json!({"interval": "every so often", "offset_minutes": 30, "secure": true}))
            .unwrap();
        let result = reconciler.reconcile(&desired, &observed).await.unwrap();

        let failed: Vec<&str> = result.failed().map(|c| c.field.as_str()).collect();
        assert_eq!(failed, vec!["interval", "secure"]);
        assert_eq!(result.observed.get("offset_minutes"), &AttributeValue::Int(30));
        assert_eq!(array.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_equivalent_interval_labels_are_in_sync() {
        let array = seeded();
        let reconciler = Reconciler::new(SnapshotPolicyResource, client(&array), ARRAY);
        let observed = reconciler.read("daily").await.unwrap();
        assert_eq!(observed.get("interval"), &AttributeValue::from("1 Day"));

        for label in ["24 Hours", "1 day", "1440 Minutes"] {
            let desired = reconciler.decode(&json!({ "interval": label })).unwrap();
            assert!(reconciler.plan(&desired, &observed).unwrap().is_empty(), "{}", label);
        }

        let desired = reconciler.decode(&json!({"interval": "48 hours"})).unwrap();
        let result = reconciler.reconcile(&desired, &observed).await.unwrap();
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].value(), Some(&AttributeValue::from("2 Days")));
        assert_eq!(result.observed.get("interval"), &AttributeValue::from("2 Days"));
        assert!(reconciler.plan(&desired, &result.observed).unwrap().is_empty());
    }
}
