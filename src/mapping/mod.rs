//! Record Mapper
//!
//! Converts backend records into attribute objects the configuration engine
//! can store. Each record type enumerates its own fields in
//! [`Record::write_fields`]; the [`ObjectWriter`] matches them by name
//! against the destination shape.
//!
//! Mapping degrades gracefully: a field that cannot be written is left out
//! of the result and reported as a [`MappingSkip`]. Only a destination that
//! is not object-shaped fails the whole call.

pub mod writer;

pub use writer::ObjectWriter;

use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use crate::error::{Error, Result};
use serde::Serialize;
use tracing::{debug, warn};

// =============================================================================
// Skip Diagnostics
// =============================================================================

/// Why a source field did not make it into the mapped object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// The destination shape has no field of this name
    NoDestination,
    /// The produced value does not have the declared destination type
    TypeMismatch {
        expected: String,
        actual: &'static str,
    },
    /// The source value cannot be represented (non-finite float, overflow, ...)
    InvalidValue(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoDestination => write!(f, "no destination field"),
            SkipReason::TypeMismatch { expected, actual } => {
                write!(f, "expected {}, produced {}", expected, actual)
            }
            SkipReason::InvalidValue(reason) => write!(f, "invalid value: {}", reason),
        }
    }
}

/// A field dropped during mapping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSkip {
    /// Dotted destination path
    pub field: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl std::fmt::Display for MappingSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

// =============================================================================
// Record Trait
// =============================================================================

/// A backend record that knows how to write itself into an attribute object
pub trait Record {
    /// Resource kind, for diagnostics
    const KIND: &'static str;

    fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>);
}

/// Result of mapping one record
#[derive(Debug, Clone, PartialEq)]
pub struct Mapped {
    /// `Object`, or `Null` when the source record was absent
    pub value: AttributeValue,
    /// Fields left out, in write order
    pub skipped: Vec<MappingSkip>,
}

/// Map a record onto `shape`.
///
/// An absent record maps to `Null`. Fails only when `shape` is not an object.
pub fn map_record<R: Record>(record: Option<&R>, shape: &AttrType) -> Result<Mapped> {
    let shape = shape.as_object().ok_or_else(|| Error::Mapping {
        kind: R::KIND.to_string(),
        reason: format!("destination must be an object, not {}", shape),
    })?;

    let Some(record) = record else {
        return Ok(Mapped {
            value: AttributeValue::Null,
            skipped: Vec::new(),
        });
    };

    let mut writer = ObjectWriter::new(shape);
    record.write_fields(&mut writer);
    let (fields, skipped) = writer.finish();

    for skip in &skipped {
        match skip.reason {
            SkipReason::NoDestination => {
                debug!("{}: ignoring unmapped field {}", R::KIND, skip.field)
            }
            _ => warn!("{}: dropped field {}", R::KIND, skip),
        }
    }

    Ok(Mapped {
        value: AttributeValue::Object(fields),
        skipped,
    })
}

/// Destination fields (dotted paths) that a mapped value never assigned.
/// Nested objects are checked when present.
pub fn unassigned_fields(value: &AttributeValue, shape: &ObjectType) -> Vec<String> {
    let mut missing = Vec::new();
    collect_unassigned(value, shape, "", &mut missing);
    missing
}

fn collect_unassigned(value: &AttributeValue, shape: &ObjectType, at: &str, out: &mut Vec<String>) {
    let Some(fields) = value.as_object() else {
        return;
    };
    for (name, ty) in shape.fields() {
        let path = if at.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", at, name)
        };
        match (fields.get(name), ty) {
            (None, _) => out.push(path),
            (Some(v), AttrType::Object(nested)) => collect_unassigned(v, nested, &path, out),
            (Some(v), AttrType::List(e) | AttrType::Set(e)) => {
                if let (Some(items), Some(nested)) = (v.as_items(), e.as_object()) {
                    for item in items {
                        collect_unassigned(item, nested, &path, out);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    struct Sample {
        name: String,
        count: u32,
        label: Option<String>,
        ratio: f64,
    }

    impl Record for Sample {
        const KIND: &'static str = "sample";

        fn write_fields<'a>(&self, out: &mut ObjectWriter<'a>) {
            out.string("name", &self.name);
            out.int("count", self.count);
            out.opt_string("label", self.label.as_deref());
            out.float("ratio", self.ratio);
        }
    }

    fn shape() -> AttrType {
        ObjectType::new()
            .field("name", AttrType::String)
            .field("count", AttrType::Int)
            .field("label", AttrType::String)
            .into()
    }

    #[test]
    fn test_map_scalars_verbatim() {
        let rec = Sample {
            name: "h1".into(),
            count: 3,
            label: None,
            ratio: 1.0,
        };
        let mapped = map_record(Some(&rec), &shape()).unwrap();
        assert_eq!(
            mapped.value,
            AttributeValue::object([
                ("name", AttributeValue::from("h1")),
                ("count", AttributeValue::Int(3)),
                ("label", AttributeValue::Null),
            ])
        );
        // `ratio` has no destination and is reported, not fatal
        assert_eq!(mapped.skipped.len(), 1);
        assert_eq!(mapped.skipped[0].field, "ratio");
    }

    #[test]
    fn test_absent_record_maps_to_null() {
        let mapped = map_record::<Sample>(None, &shape()).unwrap();
        assert!(mapped.value.is_null());
        assert!(mapped.skipped.is_empty());
    }

    #[test]
    fn test_non_object_destination_fails() {
        let rec = Sample {
            name: "h1".into(),
            count: 1,
            label: None,
            ratio: 0.0,
        };
        let err = map_record(Some(&rec), &AttrType::String);
        assert_matches!(err, Err(Error::Mapping { .. }));
    }

    #[test]
    fn test_unassigned_fields_reports_gaps() {
        let shape: ObjectType = ObjectType::new()
            .field("name", AttrType::String)
            .field(
                "flags",
                ObjectType::new()
                    .field("a", AttrType::Bool)
                    .field("b", AttrType::Bool)
                    .into(),
            );
        let value = AttributeValue::object([(
            "flags",
            AttributeValue::object([("a", AttributeValue::Bool(true))]),
        )]);
        assert_eq!(unassigned_fields(&value, &shape), vec!["name", "flags.b"]);
    }

    #[test]
    fn test_skip_display() {
        let skip = MappingSkip {
            field: "cap_gb".into(),
            reason: SkipReason::TypeMismatch {
                expected: "float".into(),
                actual: "string",
            },
        };
        assert_eq!(skip.to_string(), "cap_gb: expected float, produced string");
    }
}
