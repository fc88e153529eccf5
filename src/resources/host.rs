//! Host
//!
//! Initiators and flags are edited while the host is still addressable by
//! its old name; the rename comes last.

use super::{
    host_flags_from_value, host_flags_shape, normalize_host_flags, required_bool, required_str,
    string_elements, write_host_flags, ResourceKind,
};
use crate::domain::ports::PowerMaxClientRef;
use crate::domain::records::{HostFlags, HostRecord};
use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use crate::error::{Error, Result};
use crate::mapping::{ObjectWriter, Record};
use crate::reconcile::change::ChangeKind;
use crate::reconcile::engine::{
    DesiredConfig, FieldOp, FieldSpec, MutationPath, ObservedState, Resource,
};
use async_trait::async_trait;
use std::sync::OnceLock;

/// Mutable (or declared) host fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostField {
    Initiators,
    HostFlags,
    ConsistentLun,
    Name,
    Type,
}

const FIELDS: [FieldSpec<HostField>; 5] = [
    FieldSpec::new(HostField::Initiators, "initiators", MutationPath::Collection),
    FieldSpec::new(HostField::HostFlags, "host_flags", MutationPath::Replace),
    FieldSpec::new(HostField::ConsistentLun, "consistent_lun", MutationPath::Replace),
    FieldSpec::new(HostField::Name, "name", MutationPath::Rename),
    FieldSpec::new(HostField::Type, "type", MutationPath::Unsupported),
];

fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        ObjectType::new()
            .field("id", AttrType::String)
            .field("name", AttrType::String)
            .field("initiators", AttrType::list_of(AttrType::String))
            .field("host_flags", host_flags_shape())
            .field("consistent_lun", AttrType::Bool)
            .field("type", AttrType::String)
            .field("num_of_masking_views", AttrType::Int)
            .field("num_of_initiators", AttrType::Int)
            .field("num_of_host_groups", AttrType::Int)
            .field("port_flags_override", AttrType::Bool)
            .field("num_of_powerpath_hosts", AttrType::Int)
            .field("maskingview", AttrType::list_of(AttrType::String))
            .field("powerpathhosts", AttrType::list_of(AttrType::String))
            .field("bw_limit", AttrType::Int)
            .into()
    })
}

impl Record for HostRecord {
    const KIND: &'static str = "host";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        out.string("id", &self.host_id);
        out.string("name", &self.host_id);
        out.strings("initiators", &self.initiators);
        let flags = HostFlags::from_lists(&self.enabled_flags, &self.disabled_flags);
        out.object("host_flags", |w| write_host_flags(w, &flags));
        out.bool("consistent_lun", self.consistent_lun);
        out.string("type", &self.host_type);
        out.int("num_of_masking_views", self.num_of_masking_views);
        out.int("num_of_initiators", self.num_of_initiators);
        out.int("num_of_host_groups", self.num_of_host_groups);
        out.bool("port_flags_override", self.port_flags_override);
        out.int("num_of_powerpath_hosts", self.num_of_powerpath_hosts);
        out.strings("maskingview", &self.masking_views);
        out.strings("powerpathhosts", &self.powerpath_hosts);
        out.opt_int("bw_limit", self.bw_limit);
    }
}

/// Host reconciler binding
#[derive(Debug, Clone, Copy, Default)]
pub struct HostResource;

#[async_trait]
impl Resource for HostResource {
    type Field = HostField;
    type Record = HostRecord;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Host
    }

    fn shape(&self) -> &AttrType {
        shape()
    }

    fn identifier(&self) -> &'static str {
        "name"
    }

    fn fields(&self) -> &[FieldSpec<HostField>] {
        &FIELDS
    }

    async fn read(&self, client: &PowerMaxClientRef, array: &str, id: &str) -> Result<HostRecord> {
        client.get_host(array, id).await
    }

    async fn apply(
        &self,
        client: &PowerMaxClientRef,
        field: HostField,
        op: FieldOp<'_>,
    ) -> Result<()> {
        let change = op.change;
        match field {
            HostField::Initiators => {
                let initiators = string_elements(change.elements())?;
                match change.kind {
                    ChangeKind::Add => {
                        client.add_host_initiators(op.array, op.id, &initiators).await
                    }
                    ChangeKind::Remove => {
                        client.remove_host_initiators(op.array, op.id, &initiators).await
                    }
                    ChangeKind::Replace => {
                        Err(Error::Internal("initiators are edited by add/remove".into()))
                    }
                }
            }
            HostField::HostFlags => {
                let value = change
                    .value()
                    .ok_or_else(|| Error::InvalidAttribute("host_flags: missing value".into()))?;
                let flags = host_flags_from_value(value)?;
                client.set_host_flags(op.array, op.id, &flags).await
            }
            HostField::ConsistentLun => {
                let enabled = required_bool("consistent_lun", change.value())?;
                client.set_host_consistent_lun(op.array, op.id, enabled).await
            }
            HostField::Name => {
                let new_name = required_str("name", change.value())?;
                client.rename_host(op.array, op.id, new_name).await
            }
            HostField::Type => Err(Error::Internal("host type is not mutable".into())),
        }
    }

    fn normalize(
        &self,
        field: HostField,
        want: &AttributeValue,
        _desired: &DesiredConfig,
        _observed: &ObservedState,
    ) -> std::result::Result<AttributeValue, String> {
        match field {
            HostField::HostFlags => normalize_host_flags(want),
            _ => Ok(want.clone()),
        }
    }
}
