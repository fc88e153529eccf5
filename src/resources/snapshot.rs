//! Snapshot (read-only)

use crate::domain::records::SnapshotRecord;
use crate::domain::value::{AttrType, ObjectType};
use crate::mapping::{ObjectWriter, Record};
use std::sync::OnceLock;

/// Attribute shape of one SnapVX snapshot generation
pub fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        ObjectType::new()
            .field("name", AttrType::String)
            .field("generation", AttrType::Int)
            .field("timestamp", AttrType::String)
            .field("linked", AttrType::Bool)
            .field("restored", AttrType::Bool)
            .field("expired", AttrType::Bool)
            .field("expiry_date", AttrType::String)
            .field("secure", AttrType::Bool)
            .field("source_volume_ids", AttrType::list_of(AttrType::String))
            .into()
    })
}

impl Record for SnapshotRecord {
    const KIND: &'static str = "snapshot";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        out.string("name", &self.name);
        out.int("generation", self.generation);
        out.string("timestamp", self.timestamp.to_rfc3339());
        out.bool("linked", self.linked);
        out.bool("restored", self.restored);
        out.bool("expired", self.expired);
        out.opt_string("expiry_date", self.expiry_date.map(|d| d.to_rfc3339()));
        out.bool("secure", self.secure);
        out.strings("source_volume_ids", &self.source_volume_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::AttributeValue;
    use crate::mapping::{map_record, unassigned_fields};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_snapshot_timestamps_render_rfc3339() {
        let record = SnapshotRecord {
            name: "nightly".into(),
            generation: 3,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            linked: false,
            restored: false,
            expired: false,
            expiry_date: None,
            secure: true,
            source_volume_ids: vec!["00101".into()],
        };
        let mapped = map_record(Some(&record), shape()).unwrap();
        assert!(mapped.skipped.is_empty());
        assert!(unassigned_fields(&mapped.value, shape().as_object().unwrap()).is_empty());
        assert_eq!(
            mapped.value.get("timestamp"),
            Some(&AttributeValue::from("2026-01-02T03:04:05+00:00"))
        );
        assert_eq!(mapped.value.get("expiry_date"), Some(&AttributeValue::Null));
    }

    #[test]
    fn test_absent_snapshot_maps_to_null() {
        let mapped = map_record::<SnapshotRecord>(None, shape()).unwrap();
        assert!(mapped.value.is_null());
    }
}
