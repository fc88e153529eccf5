//! Masking View (read-only)
//!
//! A masking view ties a host or host group, a port group and a storage
//! group together. Listing maps each view together with its connections.

use crate::domain::records::{MaskingViewConnection, MaskingViewRecord};
use crate::domain::value::{AttrType, ObjectType};
use crate::mapping::{ObjectWriter, Record};
use std::sync::OnceLock;

/// Attribute shape of one listed masking view
pub fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        let connection: AttrType = ObjectType::new()
            .field("volume_id", AttrType::String)
            .field("host_lun_address", AttrType::String)
            .field("cap_gb", AttrType::Float)
            .field("initiator_id", AttrType::String)
            .field("dir_port", AttrType::String)
            .field("logged_in", AttrType::Bool)
            .field("port_wwn", AttrType::String)
            .into();
        ObjectType::new()
            .field("id", AttrType::String)
            .field("host_id", AttrType::String)
            .field("host_group_id", AttrType::String)
            .field("port_group_id", AttrType::String)
            .field("storage_group_id", AttrType::String)
            .field("connections", AttrType::list_of(connection))
            .into()
    })
}

/// A view and the paths it exposes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskingViewDetails {
    pub view: MaskingViewRecord,
    pub connections: Vec<MaskingViewConnection>,
}

impl Record for MaskingViewDetails {
    const KIND: &'static str = "masking_view";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        let view = &self.view;
        out.string("id", &view.masking_view_id);
        out.opt_string("host_id", view.host_id.as_deref());
        out.opt_string("host_group_id", view.host_group_id.as_deref());
        out.string("port_group_id", &view.port_group_id);
        out.string("storage_group_id", &view.storage_group_id);
        out.objects("connections", &self.connections, |w, c| {
            w.string("volume_id", &c.volume_id);
            w.string("host_lun_address", &c.host_lun_address);
            w.float("cap_gb", c.cap_gb);
            w.string("initiator_id", &c.initiator_id);
            w.string("dir_port", &c.dir_port);
            w.bool("logged_in", c.logged_in);
            w.string("port_wwn", &c.port_wwn);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::AttributeValue;
    use crate::mapping::{map_record, unassigned_fields, SkipReason};

    #[test]
    fn test_view_with_connections() {
        let details = MaskingViewDetails {
            view: MaskingViewRecord {
                masking_view_id: "mv1".into(),
                host_id: Some("h1".into()),
                host_group_id: None,
                port_group_id: "pg1".into(),
                storage_group_id: "sg1".into(),
            },
            connections: vec![MaskingViewConnection {
                volume_id: "00101".into(),
                host_lun_address: "0001".into(),
                cap_gb: 1.0,
                initiator_id: "10000000c9a1b2c3".into(),
                dir_port: "FA-1D:4".into(),
                logged_in: true,
                port_wwn: "50000973b0012345".into(),
            }],
        };
        let mapped = map_record(Some(&details), shape()).unwrap();
        assert!(mapped.skipped.is_empty());
        assert!(unassigned_fields(&mapped.value, shape().as_object().unwrap()).is_empty());
        assert_eq!(mapped.value.get("host_group_id"), Some(&AttributeValue::Null));
        let connections = mapped
            .value
            .get("connections")
            .and_then(AttributeValue::as_items)
            .unwrap();
        assert_eq!(connections[0].get("logged_in"), Some(&AttributeValue::Bool(true)));
    }

    #[test]
    fn test_bad_connection_field_is_skipped_with_path() {
        let details = MaskingViewDetails {
            view: MaskingViewRecord {
                masking_view_id: "mv1".into(),
                ..Default::default()
            },
            connections: vec![
                MaskingViewConnection::default(),
                MaskingViewConnection {
                    cap_gb: f64::INFINITY,
                    ..Default::default()
                },
            ],
        };
        let mapped = map_record(Some(&details), shape()).unwrap();
        assert_eq!(mapped.skipped.len(), 1);
        assert_eq!(mapped.skipped[0].field, "connections.1.cap_gb");
        assert!(matches!(mapped.skipped[0].reason, SkipReason::InvalidValue(_)));
    }
}
