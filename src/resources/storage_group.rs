//! Storage Group
//!
//! Renamed first, then settings, then membership; volume edits address the
//! group by its new name.

use super::{required_bool, required_str, string_elements, ResourceKind};
use crate::domain::ports::PowerMaxClientRef;
use crate::domain::records::{HostIoLimit, StorageGroupRecord};
use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use crate::error::{Error, Result};
use crate::mapping::{ObjectWriter, Record};
use crate::reconcile::change::ChangeKind;
use crate::reconcile::engine::{FieldOp, FieldSpec, MutationPath, Resource};
use async_trait::async_trait;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageGroupField {
    Name,
    Compression,
    HostIoLimit,
    Workload,
    ServiceLevel,
    SrpId,
    VolumeIds,
}

const FIELDS: [FieldSpec<StorageGroupField>; 7] = [
    FieldSpec::new(StorageGroupField::Name, "name", MutationPath::Rename),
    FieldSpec::new(StorageGroupField::Compression, "compression", MutationPath::Replace),
    FieldSpec::new(StorageGroupField::HostIoLimit, "host_io_limit", MutationPath::Replace),
    FieldSpec::new(StorageGroupField::Workload, "workload", MutationPath::Replace),
    FieldSpec::new(StorageGroupField::ServiceLevel, "service_level", MutationPath::Replace),
    FieldSpec::new(StorageGroupField::SrpId, "srp_id", MutationPath::Replace),
    FieldSpec::new(StorageGroupField::VolumeIds, "volume_ids", MutationPath::Collection),
];

fn host_io_limit_shape() -> AttrType {
    ObjectType::new()
        .field("host_io_limit_mb_sec", AttrType::String)
        .field("host_io_limit_io_sec", AttrType::String)
        .field("dynamic_distribution", AttrType::String)
        .into()
}

fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        ObjectType::new()
            .field("id", AttrType::String)
            .field("name", AttrType::String)
            .field("srp_id", AttrType::String)
            .field("service_level", AttrType::String)
            .field("slo", AttrType::String)
            .field("workload", AttrType::String)
            .field("slo_compliance", AttrType::String)
            .field("compression", AttrType::Bool)
            .field("compression_ratio", AttrType::String)
            .field("host_io_limit", host_io_limit_shape())
            .field("volume_ids", AttrType::set_of(AttrType::String))
            .field("num_of_vols", AttrType::Int)
            .field("num_of_child_sgs", AttrType::Int)
            .field("num_of_parent_sgs", AttrType::Int)
            .field("num_of_masking_views", AttrType::Int)
            .field("num_of_snapshots", AttrType::Int)
            .field("cap_gb", AttrType::Float)
            .field("device_emulation", AttrType::String)
            .field("type", AttrType::String)
            .field("unprotected", AttrType::Bool)
            .field("child_storage_group", AttrType::list_of(AttrType::String))
            .field("parent_storage_group", AttrType::list_of(AttrType::String))
            .field("maskingview", AttrType::list_of(AttrType::String))
            .field("tags", AttrType::String)
            .into()
    })
}

impl Record for StorageGroupRecord {
    const KIND: &'static str = "storage_group";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        out.string("id", &self.storage_group_id);
        out.string("name", &self.storage_group_id);
        out.string("srp_id", &self.srp);
        out.string("service_level", &self.service_level);
        out.string("slo", &self.slo);
        out.string("workload", &self.workload);
        out.string("slo_compliance", &self.slo_compliance);
        out.bool("compression", self.compression);
        out.string("compression_ratio", &self.compression_ratio);
        out.opt_object("host_io_limit", self.host_io_limit.as_ref(), |w, limit| {
            w.string("host_io_limit_mb_sec", &limit.host_io_limit_mb_sec);
            w.string("host_io_limit_io_sec", &limit.host_io_limit_io_sec);
            w.string("dynamic_distribution", &limit.dynamic_distribution);
        });
        out.strings("volume_ids", &self.volume_ids);
        out.int("num_of_vols", self.num_of_vols);
        out.int("num_of_child_sgs", self.num_of_child_sgs);
        out.int("num_of_parent_sgs", self.num_of_parent_sgs);
        out.int("num_of_masking_views", self.num_of_masking_views);
        out.int("num_of_snapshots", self.num_of_snapshots);
        out.float("cap_gb", self.cap_gb);
        out.string("device_emulation", &self.device_emulation);
        out.string("type", &self.sg_type);
        out.bool("unprotected", self.unprotected);
        out.strings("child_storage_group", &self.child_storage_groups);
        out.strings("parent_storage_group", &self.parent_storage_groups);
        out.strings("maskingview", &self.masking_views);
        out.string("tags", &self.tags);
    }
}

/// Host I/O limit from an attribute object; unset parts are sent empty
fn host_io_limit_from_value(value: &AttributeValue) -> Result<HostIoLimit> {
    if value.as_object().is_none() {
        return Err(Error::InvalidAttribute(format!(
            "host_io_limit: expected object, found {}",
            value.type_name()
        )));
    }
    let part = |name: &str| {
        value
            .get(name)
            .and_then(AttributeValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(HostIoLimit {
        host_io_limit_mb_sec: part("host_io_limit_mb_sec"),
        host_io_limit_io_sec: part("host_io_limit_io_sec"),
        dynamic_distribution: part("dynamic_distribution"),
    })
}

/// Storage group reconciler binding
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageGroupResource;

#[async_trait]
impl Resource for StorageGroupResource {
    type Field = StorageGroupField;
    type Record = StorageGroupRecord;

    fn kind(&self) -> ResourceKind {
        ResourceKind::StorageGroup
    }

    fn shape(&self) -> &AttrType {
        shape()
    }

    fn identifier(&self) -> &'static str {
        "name"
    }

    fn fields(&self) -> &[FieldSpec<StorageGroupField>] {
        &FIELDS
    }

    async fn read(
        &self,
        client: &PowerMaxClientRef,
        array: &str,
        id: &str,
    ) -> Result<StorageGroupRecord> {
        client.get_storage_group(array, id).await
    }

    async fn apply(
        &self,
        client: &PowerMaxClientRef,
        field: StorageGroupField,
        op: FieldOp<'_>,
    ) -> Result<()> {
        let change = op.change;
        match field {
            StorageGroupField::Name => {
                let new_name = required_str("name", change.value())?;
                client.rename_storage_group(op.array, op.id, new_name).await
            }
            StorageGroupField::Compression => {
                let enabled = required_bool("compression", change.value())?;
                client.set_storage_group_compression(op.array, op.id, enabled).await
            }
            StorageGroupField::HostIoLimit => {
                let value = change
                    .value()
                    .ok_or_else(|| Error::InvalidAttribute("host_io_limit: missing value".into()))?;
                let limit = host_io_limit_from_value(value)?;
                client.set_host_io_limit(op.array, op.id, &limit).await
            }
            StorageGroupField::Workload => {
                let workload = required_str("workload", change.value())?;
                client.set_workload(op.array, op.id, workload).await
            }
            StorageGroupField::ServiceLevel => {
                let level = required_str("service_level", change.value())?;
                client.set_service_level(op.array, op.id, level).await
            }
            StorageGroupField::SrpId => {
                let srp = required_str("srp_id", change.value())?;
                client.set_srp(op.array, op.id, srp).await
            }
            StorageGroupField::VolumeIds => {
                let volumes = string_elements(change.elements())?;
                match change.kind {
                    ChangeKind::Add => client.add_volumes_to_group(op.array, op.id, &volumes).await,
                    ChangeKind::Remove => {
                        client.remove_volumes_from_group(op.array, op.id, &volumes).await
                    }
                    ChangeKind::Replace => {
                        Err(Error::Internal("volume_ids are edited by add/remove".into()))
                    }
                }
            }
        }
    }
}
