//! Host Group

use super::{
    host_flags_from_value, host_flags_shape, normalize_host_flags, required_bool, required_str,
    string_elements, write_host_flags, ResourceKind,
};
use crate::domain::ports::PowerMaxClientRef;
use crate::domain::records::{HostFlags, HostGroupRecord};
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
pub enum HostGroupField {
    HostIds,
    HostFlags,
    ConsistentLun,
    Name,
    Type,
}

const FIELDS: [FieldSpec<HostGroupField>; 5] = [
    FieldSpec::new(HostGroupField::HostIds, "host_ids", MutationPath::Collection),
    FieldSpec::new(HostGroupField::HostFlags, "host_flags", MutationPath::Replace),
    FieldSpec::new(HostGroupField::ConsistentLun, "consistent_lun", MutationPath::Replace),
    FieldSpec::new(HostGroupField::Name, "name", MutationPath::Rename),
    FieldSpec::new(HostGroupField::Type, "type", MutationPath::Unsupported),
];

fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        let member: AttrType = ObjectType::new()
            .field("host_id", AttrType::String)
            .field("initiators", AttrType::list_of(AttrType::String))
            .into();
        ObjectType::new()
            .field("id", AttrType::String)
            .field("name", AttrType::String)
            .field("host_ids", AttrType::set_of(AttrType::String))
            .field("host_flags", host_flags_shape())
            .field("consistent_lun", AttrType::Bool)
            .field("type", AttrType::String)
            .field("num_of_masking_views", AttrType::Int)
            .field("num_of_initiators", AttrType::Int)
            .field("num_of_hosts", AttrType::Int)
            .field("port_flags_override", AttrType::Bool)
            .field("maskingview", AttrType::list_of(AttrType::String))
            .field("hosts", AttrType::list_of(member))
            .into()
    })
}

impl Record for HostGroupRecord {
    const KIND: &'static str = "host_group";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        out.string("id", &self.host_group_id);
        out.string("name", &self.host_group_id);
        out.strings("host_ids", self.hosts.iter().map(|h| h.host_id.as_str()));
        let flags = HostFlags::from_lists(&self.enabled_flags, &self.disabled_flags);
        out.object("host_flags", |w| write_host_flags(w, &flags));
        out.bool("consistent_lun", self.consistent_lun);
        out.string("type", &self.host_group_type);
        out.int("num_of_masking_views", self.num_of_masking_views);
        out.int("num_of_initiators", self.num_of_initiators);
        out.int("num_of_hosts", self.num_of_hosts);
        out.bool("port_flags_override", self.port_flags_override);
        out.strings("maskingview", &self.masking_views);
        out.objects("hosts", &self.hosts, |w, host| {
            w.string("host_id", &host.host_id);
            w.strings("initiators", &host.initiators);
        });
    }
}

/// Host group reconciler binding
#[derive(Debug, Clone, Copy, Default)]
pub struct HostGroupResource;

#[async_trait]
impl Resource for HostGroupResource {
    type Field = HostGroupField;
    type Record = HostGroupRecord;

    fn kind(&self) -> ResourceKind {
        ResourceKind::HostGroup
    }

    fn shape(&self) -> &AttrType {
        shape()
    }

    fn identifier(&self) -> &'static str {
        "name"
    }

    fn fields(&self) -> &[FieldSpec<HostGroupField>] {
        &FIELDS
    }

    async fn read(
        &self,
        client: &PowerMaxClientRef,
        array: &str,
        id: &str,
    ) -> Result<HostGroupRecord> {
        client.get_host_group(array, id).await
    }

    async fn apply(
        &self,
        client: &PowerMaxClientRef,
        field: HostGroupField,
        op: FieldOp<'_>,
    ) -> Result<()> {
        let change = op.change;
        match field {
            HostGroupField::HostIds => {
                let hosts = string_elements(change.elements())?;
                match change.kind {
                    ChangeKind::Add => client.add_hosts_to_group(op.array, op.id, &hosts).await,
                    ChangeKind::Remove => {
                        client.remove_hosts_from_group(op.array, op.id, &hosts).await
                    }
                    ChangeKind::Replace => {
                        Err(Error::Internal("host_ids are edited by add/remove".into()))
                    }
                }
            }
            HostGroupField::HostFlags => {
                let value = change
                    .value()
                    .ok_or_else(|| Error::InvalidAttribute("host_flags: missing value".into()))?;
                let flags = host_flags_from_value(value)?;
                client.set_host_group_flags(op.array, op.id, &flags).await
            }
            HostGroupField::ConsistentLun => {
                let enabled = required_bool("consistent_lun", change.value())?;
                client.set_host_group_consistent_lun(op.array, op.id, enabled).await
            }
            HostGroupField::Name => {
                let new_name = required_str("name", change.value())?;
                client.rename_host_group(op.array, op.id, new_name).await
            }
            HostGroupField::Type => Err(Error::Internal("host group type is not mutable".into())),
        }
    }

    fn normalize(
        &self,
        field: HostGroupField,
        want: &AttributeValue,
        _desired: &DesiredConfig,
        _observed: &ObservedState,
    ) -> std::result::Result<AttributeValue, String> {
        match field {
            HostGroupField::HostFlags => normalize_host_flags(want),
            _ => Ok(want.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::SimulatedArray;
    use crate::domain::records::{HostRecord, HostSummary};
    use crate::mapping::{map_record, unassigned_fields};
    use crate::reconcile::engine::Reconciler;
    use crate::resources::testing::{client, ARRAY};
    use serde_json::json;
    use std::sync::Arc;

    fn seeded() -> Arc<SimulatedArray> {
        let array = Arc::new(SimulatedArray::new(ARRAY));
        for id in ["h1", "h2", "h3"] {
            array.insert_host(HostRecord {
                host_id: id.into(),
                ..Default::default()
            });
        }
        array.insert_host_group(HostGroupRecord {
            host_group_id: "hg1".into(),
            hosts: vec![
                HostSummary {
                    host_id: "h1".into(),
                    initiators: vec![],
                },
                HostSummary {
                    host_id: "h2".into(),
                    initiators: vec![],
                },
            ],
            ..Default::default()
        });
        array
    }

    #[test]
    fn test_mapping_flattens_member_ids() {
        let record = HostGroupRecord {
            host_group_id: "hg1".into(),
            disabled_flags: "OpenVMS".into(),
            hosts: vec![HostSummary {
                host_id: "h1".into(),
                initiators: vec!["10000000c9a1b2c3".into()],
            }],
            ..Default::default()
        };
        let mapped = map_record(Some(&record), shape()).unwrap();
        assert!(mapped.skipped.is_empty());
        assert!(unassigned_fields(&mapped.value, shape().as_object().unwrap()).is_empty());
        assert_eq!(
            mapped.value.get("host_ids"),
            Some(&AttributeValue::set(AttrType::String, vec!["h1".into()]).unwrap())
        );
        let members = mapped.value.get("hosts").and_then(AttributeValue::as_items).unwrap();
        assert_eq!(members[0].get("host_id"), Some(&AttributeValue::from("h1")));
        assert_eq!(
            mapped.value.path("host_flags.openvms.override"),
            Some(&AttributeValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_membership_then_rename() {
        let array = seeded();
        let reconciler = Reconciler::new(HostGroupResource, client(&array), ARRAY);
        let observed = reconciler.read("hg1").await.unwrap();

        let desired = reconciler
            .decode(&json!({"name": "hg-prod", "host_ids": ["h2", "h3"]}))
            .unwrap();
        let result = reconciler.reconcile(&desired, &observed).await.unwrap();

        assert!(!result.has_failures(), "{}", result.summary());
        assert_eq!(
            array.mutations(),
            vec![
                ("add_hosts_to_group".to_string(), "hg1".to_string()),
                ("remove_hosts_from_group".to_string(), "hg1".to_string()),
                ("rename_host_group".to_string(), "hg1".to_string()),
            ]
        );
        assert_eq!(result.observed.id(), Some("hg-prod"));
        assert_eq!(
            result.observed.get("host_ids"),
            &AttributeValue::set(AttrType::String, vec!["h2".into(), "h3".into()]).unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_member_add_is_isolated() {
        let array = seeded();
        array.fail_on("add_hosts_to_group");
        let reconciler = Reconciler::new(HostGroupResource, client(&array), ARRAY);
        let observed = reconciler.read("hg1").await.unwrap();

        let desired = reconciler
            .decode(&json!({"host_ids": ["h1", "h2", "h3"], "consistent_lun": true}))
            .unwrap();
        let result = reconciler.reconcile(&desired, &observed).await.unwrap();

        assert_eq!(result.changes.len(), 2);
        assert!(result.changes[0].is_failed());
        assert!(result.changes[1].is_applied());
        assert_eq!(result.observed.get("consistent_lun"), &AttributeValue::Bool(true));
    }
}
