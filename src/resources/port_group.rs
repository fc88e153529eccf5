//! Port Group
//!
//! Renamed first; port edits then address the group by its new name.

use super::{required_str, ResourceKind};
use crate::domain::ports::PowerMaxClientRef;
use crate::domain::records::{PortGroupRecord, PortKey};
use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use crate::error::{Error, Result};
use crate::mapping::{ObjectWriter, Record};
use crate::reconcile::change::ChangeKind;
use crate::reconcile::engine::{FieldOp, FieldSpec, MutationPath, Resource};
use async_trait::async_trait;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortGroupField {
    Name,
    Ports,
    Protocol,
}

const FIELDS: [FieldSpec<PortGroupField>; 3] = [
    FieldSpec::new(PortGroupField::Name, "name", MutationPath::Rename),
    FieldSpec::new(PortGroupField::Ports, "ports", MutationPath::Collection),
    FieldSpec::new(PortGroupField::Protocol, "protocol", MutationPath::Unsupported),
];

fn port_shape() -> AttrType {
    ObjectType::new()
        .field("director_id", AttrType::String)
        .field("port_id", AttrType::String)
        .into()
}

fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        ObjectType::new()
            .field("id", AttrType::String)
            .field("name", AttrType::String)
            .field("ports", AttrType::set_of(port_shape()))
            .field("protocol", AttrType::String)
            .field("num_of_ports", AttrType::Int)
            .field("num_of_masking_views", AttrType::Int)
            .field("maskingview", AttrType::list_of(AttrType::String))
            .into()
    })
}

impl Record for PortGroupRecord {
    const KIND: &'static str = "port_group";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        out.string("id", &self.port_group_id);
        out.string("name", &self.port_group_id);
        out.objects("ports", &self.ports, |w, port| {
            w.string("director_id", &port.director_id);
            w.string("port_id", &port.port_id);
        });
        out.string("protocol", &self.protocol);
        out.int("num_of_ports", self.num_of_ports);
        out.int("num_of_masking_views", self.num_of_masking_views);
        out.strings("maskingview", &self.masking_views);
    }
}

fn port_keys(elements: &[AttributeValue]) -> Result<Vec<PortKey>> {
    elements
        .iter()
        .map(|e| {
            Ok(PortKey {
                director_id: required_str("ports.director_id", e.get("director_id"))?.to_string(),
                port_id: required_str("ports.port_id", e.get("port_id"))?.to_string(),
            })
        })
        .collect()
}

/// Port group reconciler binding
#[derive(Debug, Clone, Copy, Default)]
pub struct PortGroupResource;

#[async_trait]
impl Resource for PortGroupResource {
    type Field = PortGroupField;
    type Record = PortGroupRecord;

    fn kind(&self) -> ResourceKind {
        ResourceKind::PortGroup
    }

    fn shape(&self) -> &AttrType {
        shape()
    }

    fn identifier(&self) -> &'static str {
        "name"
    }

    fn fields(&self) -> &[FieldSpec<PortGroupField>] {
        &FIELDS
    }

    async fn read(
        &self,
        client: &PowerMaxClientRef,
        array: &str,
        id: &str,
    ) -> Result<PortGroupRecord> {
        client.get_port_group(array, id).await
    }

    async fn apply(
        &self,
        client: &PowerMaxClientRef,
        field: PortGroupField,
        op: FieldOp<'_>,
    ) -> Result<()> {
        let change = op.change;
        match field {
            PortGroupField::Name => {
                let new_name = required_str("name", change.value())?;
                client.rename_port_group(op.array, op.id, new_name).await
            }
            PortGroupField::Ports => {
                let ports = port_keys(change.elements())?;
                match change.kind {
                    ChangeKind::Add => client.add_ports(op.array, op.id, &ports).await,
                    ChangeKind::Remove => client.remove_ports(op.array, op.id, &ports).await,
                    ChangeKind::Replace => {
                        Err(Error::Internal("ports are edited by add/remove".into()))
                    }
                }
            }
            PortGroupField::Protocol => {
                Err(Error::Internal("port group protocol is not mutable".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::SimulatedArray;
    use crate::mapping::{map_record, unassigned_fields};
    use crate::reconcile::change::Outcome;
    use crate::reconcile::engine::Reconciler;
    use crate::resources::testing::{client, ARRAY};
    use serde_json::json;
    use std::sync::Arc;

    fn port(director: &str, port: &str) -> PortKey {
        PortKey {
            director_id: director.into(),
            port_id: port.into(),
        }
    }

    fn seeded() -> Arc<SimulatedArray> {
        let array = Arc::new(SimulatedArray::new(ARRAY));
        array.insert_port_group(PortGroupRecord {
            port_group_id: "pg1".into(),
            protocol: "SCSI_FC".into(),
            ports: vec![port("FA-1D", "4"), port("FA-2D", "4")],
            ..Default::default()
        });
        array
    }

    #[test]
    fn test_mapping_port_objects() {
        let record = PortGroupRecord {
            port_group_id: "pg1".into(),
            ports: vec![port("FA-1D", "4")],
            ..Default::default()
        };
        let mapped = map_record(Some(&record), shape()).unwrap();
        assert!(mapped.skipped.is_empty());
        assert!(unassigned_fields(&mapped.value, shape().as_object().unwrap()).is_empty());
        let ports = mapped.value.get("ports").and_then(AttributeValue::as_items).unwrap();
        assert_eq!(ports[0].get("director_id"), Some(&AttributeValue::from("FA-1D")));
    }

    #[test]
    fn test_port_keys_require_both_parts() {
        let ok = AttributeValue::object([
            ("director_id", AttributeValue::from("FA-1D")),
            ("port_id", AttributeValue::from("4")),
        ]);
        assert_eq!(port_keys(&[ok]).unwrap(), vec![port("FA-1D", "4")]);

        let partial = AttributeValue::object([("director_id", AttributeValue::from("FA-1D"))]);
        assert!(port_keys(&[partial]).is_err());
    }

    #[tokio::test]
    async fn test_ports_edited_under_new_name() {
        let array = seeded();
        let reconciler = Reconciler::new(PortGroupResource, client(&array), ARRAY);
        let observed = reconciler.read("pg1").await.unwrap();

        let desired = reconciler
            .decode(&json!({
                "name": "pg-east",
                "ports": [
                    {"director_id": "FA-2D", "port_id": "4"},
                    {"director_id": "FA-3D", "port_id": "6"}
                ]
            }))
            .unwrap();
        let result = reconciler.reconcile(&desired, &observed).await.unwrap();

        assert!(!result.has_failures(), "{}", result.summary());
        assert_eq!(
            array.mutations(),
            vec![
                ("rename_port_group".to_string(), "pg1".to_string()),
                ("add_ports".to_string(), "pg-east".to_string()),
                ("remove_ports".to_string(), "pg-east".to_string()),
            ]
        );
        assert_eq!(result.observed.id(), Some("pg-east"));
        assert_eq!(result.observed.get("ports").as_items().map(|p| p.len()), Some(2));
    }

    #[tokio::test]
    async fn test_protocol_change_is_rejected_without_a_call() {
        let array = seeded();
        let reconciler = Reconciler::new(PortGroupResource, client(&array), ARRAY);
        let observed = reconciler.read("pg1").await.unwrap();

        let desired = reconciler.decode(&json!({"protocol": "SCSI_iSCSI"})).unwrap();
        let result = reconciler.reconcile(&desired, &observed).await.unwrap();

        assert_eq!(result.changes.len(), 1);
        assert_eq!(
            result.changes[0].outcome,
            Outcome::Failed("unsupported field".into())
        );
        assert!(array.mutations().is_empty());
    }
}
