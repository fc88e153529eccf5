//! Volume
//!
//! Volumes are addressed by their device id, which never changes; `vol_name`
//! is only a label. Capacity is reported in GB.

use super::{required_bool, required_str, ResourceKind};
use crate::domain::ports::PowerMaxClientRef;
use crate::domain::records::VolumeRecord;
use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use crate::error::{Error, Result};
use crate::mapping::{ObjectWriter, Record};
use crate::reconcile::engine::{
    DesiredConfig, FieldOp, FieldSpec, MutationPath, ObservedState, Resource,
};
use async_trait::async_trait;
use std::sync::OnceLock;

/// Unit observed capacity is reported in
pub const REPORTED_CAP_UNIT: &str = "GB";

/// Observed attribute carrying the capacity in a requested unit
fn capacity_attribute(cap_unit: &str) -> Option<&'static str> {
    match cap_unit.to_ascii_uppercase().as_str() {
        "GB" => Some("size"),
        "MB" => Some("cap_mb"),
        "CYL" => Some("cap_cyl"),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeField {
    VolName,
    Size,
    MobilityIdEnabled,
    Id,
    Emulation,
}

const FIELDS: [FieldSpec<VolumeField>; 5] = [
    FieldSpec::new(VolumeField::VolName, "vol_name", MutationPath::Relabel),
    FieldSpec::new(VolumeField::Size, "size", MutationPath::Replace),
    FieldSpec::new(VolumeField::MobilityIdEnabled, "mobility_id_enabled", MutationPath::Replace),
    FieldSpec::new(VolumeField::Id, "id", MutationPath::Unsupported),
    FieldSpec::new(VolumeField::Emulation, "emulation", MutationPath::Unsupported),
];

fn shape() -> &'static AttrType {
    static SHAPE: OnceLock<AttrType> = OnceLock::new();
    SHAPE.get_or_init(|| {
        ObjectType::new()
            .field("id", AttrType::String)
            .field("vol_name", AttrType::String)
            .field("size", AttrType::Float)
            .field("cap_unit", AttrType::String)
            .field("cap_mb", AttrType::Float)
            .field("cap_cyl", AttrType::Int)
            .field("type", AttrType::String)
            .field("emulation", AttrType::String)
            .field("status", AttrType::String)
            .field("allocated_percent", AttrType::Int)
            .field("wwn", AttrType::String)
            .field("effective_wwn", AttrType::String)
            .field("has_effective_wwn", AttrType::Bool)
            .field("encapsulated", AttrType::Bool)
            .field("num_of_storage_groups", AttrType::Int)
            .field("num_of_front_end_paths", AttrType::Int)
            .field("storage_groups", AttrType::list_of(AttrType::String))
            .field("mobility_id_enabled", AttrType::Bool)
            .field("snapvx_source", AttrType::Bool)
            .field("snapvx_target", AttrType::Bool)
            .into()
    })
}

impl Record for VolumeRecord {
    const KIND: &'static str = "volume";

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
        out.string("id", &self.volume_id);
        out.opt_string("vol_name", self.volume_identifier.as_deref());
        out.float("size", self.cap_gb);
        out.string("cap_unit", REPORTED_CAP_UNIT);
        out.float("cap_mb", self.cap_mb);
        out.int("cap_cyl", self.cap_cyl);
        out.string("type", &self.volume_type);
        out.string("emulation", &self.emulation);
        out.string("status", &self.status);
        out.int("allocated_percent", self.allocated_percent);
        out.string("wwn", &self.wwn);
        out.string("effective_wwn", &self.effective_wwn);
        out.bool("has_effective_wwn", self.has_effective_wwn);
        out.bool("encapsulated", self.encapsulated);
        out.int("num_of_storage_groups", self.num_of_storage_groups);
        out.int("num_of_front_end_paths", self.num_of_front_end_paths);
        out.strings("storage_groups", &self.storage_group_ids);
        out.bool("mobility_id_enabled", self.mobility_id_enabled);
        out.bool("snapvx_source", self.snapvx_source);
        out.bool("snapvx_target", self.snapvx_target);
    }
}

/// Volume reconciler binding
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeResource;

#[async_trait]
impl Resource for VolumeResource {
    type Field = VolumeField;
    type Record = VolumeRecord;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Volume
    }

    fn shape(&self) -> &AttrType {
        shape()
    }

    fn identifier(&self) -> &'static str {
        "id"
    }

    fn fields(&self) -> &[FieldSpec<VolumeField>] {
        &FIELDS
    }

    async fn read(
        &self,
        client: &PowerMaxClientRef,
        array: &str,
        id: &str,
    ) -> Result<VolumeRecord> {
        client.get_volume(array, id).await
    }

    async fn apply(
        &self,
        client: &PowerMaxClientRef,
        field: VolumeField,
        op: FieldOp<'_>,
    ) -> Result<()> {
        let change = op.change;
        match field {
            VolumeField::VolName => {
                let label = required_str("vol_name", change.value())?;
                client.rename_volume(op.array, op.id, label).await
            }
            VolumeField::Size => {
                let size = change
                    .value()
                    .and_then(AttributeValue::as_f64)
                    .ok_or_else(|| Error::InvalidAttribute("size: expected number".into()))?;
                let cap_unit = op.desired.string("cap_unit").unwrap_or(REPORTED_CAP_UNIT);
                client.expand_volume(op.array, op.id, size, cap_unit).await
            }
            VolumeField::MobilityIdEnabled => {
                let enabled = required_bool("mobility_id_enabled", change.value())?;
                client.set_volume_mobility_id(op.array, op.id, enabled).await
            }
            VolumeField::Id | VolumeField::Emulation => Err(Error::Internal(format!(
                "volume {:?} is not mutable",
                field
            ))),
        }
    }

    /// A size in another unit is compared against the capacity the array
    /// reports in that unit; an equal one stands for the observed GB size.
    fn normalize(
        &self,
        field: VolumeField,
        want: &AttributeValue,
        desired: &DesiredConfig,
        observed: &ObservedState,
    ) -> std::result::Result<AttributeValue, String> {
        if !matches!(field, VolumeField::Size) {
            return Ok(want.clone());
        }
        let cap_unit = desired.string("cap_unit").unwrap_or(REPORTED_CAP_UNIT);
        let attribute = capacity_attribute(cap_unit)
            .ok_or_else(|| format!("size: capacity in {} is not reported by the array", cap_unit))?;
        if attribute == "size" {
            return Ok(want.clone());
        }
        match (want.as_f64(), observed.get(attribute).as_f64()) {
            (Some(w), Some(h)) if w == h => Ok(observed.get("size").clone()),
            _ => Ok(want.clone()),
        }
    }
}
