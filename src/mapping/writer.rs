//! Object Writer
//!
//! Destination-checked builder handed to [`Record::write_fields`]. Every
//! write is matched by name against the destination shape; writes with no
//! destination, a mismatched type or an invalid source value are dropped
//! and recorded as [`MappingSkip`]s instead of failing the mapping.
//!
//! [`Record::write_fields`]: super::Record::write_fields

use super::{MappingSkip, SkipReason};
use crate::domain::value::{AttrType, AttributeValue, ObjectType};
use std::collections::BTreeMap;

/// Where written fields land
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    /// Named fields of an object shape
    Object(&'a ObjectType),
    /// Any key, every value of the one element type (struct flattened into a map)
    Map(&'a AttrType),
}

/// Writes one object (or flattened map) worth of fields
#[derive(Debug)]
pub struct ObjectWriter<'a> {
    target: Target<'a>,
    path: String,
    fields: BTreeMap<String, AttributeValue>,
    skipped: Vec<MappingSkip>,
}

impl<'a> ObjectWriter<'a> {
    pub(crate) fn new(shape: &'a ObjectType) -> Self {
        Self::at(Target::Object(shape), String::new())
    }

    fn at(target: Target<'a>, path: String) -> Self {
        Self {
            target,
            path,
            fields: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> (BTreeMap<String, AttributeValue>, Vec<MappingSkip>) {
        (self.fields, self.skipped)
    }

    fn full_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        }
    }

    /// Declared destination type for `name`
    fn slot(&self, name: &str) -> Option<&'a AttrType> {
        match self.target {
            Target::Object(shape) => shape.get(name),
            Target::Map(element) => Some(element),
        }
    }

    fn skip(&mut self, name: &str, reason: SkipReason) {
        self.skipped.push(MappingSkip {
            field: self.full_path(name),
            reason,
        });
    }

    // =========================================================================
    // Scalars
    // =========================================================================

    /// Write any value, checking it against the destination type
    pub fn value(&mut self, name: &str, value: AttributeValue) {
        match self.slot(name) {
            None => self.skip(name, SkipReason::NoDestination),
            Some(ty) if !value.conforms_to(ty) => self.skip(
                name,
                SkipReason::TypeMismatch {
                    expected: ty.to_string(),
                    actual: value.type_name(),
                },
            ),
            Some(_) => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    pub fn string(&mut self, name: &str, value: impl Into<String>) {
        self.value(name, AttributeValue::String(value.into()));
    }

    /// Unset source values map to `Null`
    pub fn opt_string<S: Into<String>>(&mut self, name: &str, value: Option<S>) {
        self.value(name, value.map(Into::into).into());
    }

    /// Any integer width; values outside `i64` are skipped
    pub fn int<N>(&mut self, name: &str, value: N)
    where
        N: TryInto<i64> + Copy + std::fmt::Display,
    {
        match value.try_into() {
            Ok(v) => self.value(name, AttributeValue::Int(v)),
            Err(_) => self.skip(
                name,
                SkipReason::InvalidValue(format!("{} does not fit in a 64-bit integer", value)),
            ),
        }
    }

    pub fn opt_int<N>(&mut self, name: &str, value: Option<N>)
    where
        N: TryInto<i64> + Copy + std::fmt::Display,
    {
        match value {
            Some(v) => self.int(name, v),
            None => self.value(name, AttributeValue::Null),
        }
    }

    /// Non-finite floats are skipped
    pub fn float(&mut self, name: &str, value: f64) {
        if value.is_finite() {
            self.value(name, AttributeValue::Float(value));
        } else {
            self.skip(name, SkipReason::InvalidValue(format!("{} is not finite", value)));
        }
    }

    pub fn bool(&mut self, name: &str, value: bool) {
        self.value(name, AttributeValue::Bool(value));
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Strings as a list or set, whichever the destination declares
    pub fn strings<S: AsRef<str>>(&mut self, name: &str, items: impl IntoIterator<Item = S>) {
        let items: Vec<AttributeValue> = items
            .into_iter()
            .map(|s| AttributeValue::String(s.as_ref().to_string()))
            .collect();
        let value = match self.slot(name) {
            Some(AttrType::Set(e)) if **e == AttrType::String => {
                AttributeValue::set(AttrType::String, items)
            }
            _ => AttributeValue::list(AttrType::String, items),
        };
        match value {
            Ok(v) => self.value(name, v),
            Err(e) => self.skip(name, SkipReason::InvalidValue(e.to_string())),
        }
    }

    /// Nested record, as an object or, when the destination declares a
    /// map, flattened into map entries keyed by the written field names
    pub fn object(&mut self, name: &str, write: impl FnOnce(&mut ObjectWriter<'a>)) {
        let path = self.full_path(name);
        let target = match self.slot(name) {
            None => return self.skip(name, SkipReason::NoDestination),
            Some(AttrType::Object(shape)) => Target::Object(shape),
            Some(AttrType::Map(element)) => Target::Map(element),
            Some(other) => {
                return self.skip(
                    name,
                    SkipReason::TypeMismatch {
                        expected: other.to_string(),
                        actual: "object",
                    },
                )
            }
        };

        let mut child = ObjectWriter::at(target, path);
        write(&mut child);
        let (fields, skipped) = child.finish();
        self.skipped.extend(skipped);

        let value = match target {
            Target::Object(_) => AttributeValue::Object(fields),
            Target::Map(element) => match AttributeValue::map(element.clone(), fields) {
                Ok(v) => v,
                Err(e) => return self.skip(name, SkipReason::InvalidValue(e.to_string())),
            },
        };
        self.fields.insert(name.to_string(), value);
    }

    /// Optional nested record; `None` maps to `Null`
    pub fn opt_object<T>(
        &mut self,
        name: &str,
        record: Option<&T>,
        write: impl FnOnce(&mut ObjectWriter<'a>, &T),
    ) {
        match record {
            Some(r) => self.object(name, |w| write(w, r)),
            None => self.value(name, AttributeValue::Null),
        }
    }

    /// Sequence of nested records as a list or set of objects
    pub fn objects<T>(
        &mut self,
        name: &str,
        records: &[T],
        mut write: impl FnMut(&mut ObjectWriter<'a>, &T),
    ) {
        let (element, as_set) = match self.slot(name) {
            None => return self.skip(name, SkipReason::NoDestination),
            Some(AttrType::List(e)) => (e.as_ref(), false),
            Some(AttrType::Set(e)) => (e.as_ref(), true),
            Some(other) => {
                return self.skip(
                    name,
                    SkipReason::TypeMismatch {
                        expected: other.to_string(),
                        actual: "list",
                    },
                )
            }
        };
        let Some(shape) = element.as_object() else {
            return self.skip(
                name,
                SkipReason::TypeMismatch {
                    expected: element.to_string(),
                    actual: "object",
                },
            );
        };

        let mut items = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let path = format!("{}.{}", self.full_path(name), idx);
            let mut child = ObjectWriter::at(Target::Object(shape), path);
            write(&mut child, record);
            let (fields, skipped) = child.finish();
            self.skipped.extend(skipped);
            items.push(AttributeValue::Object(fields));
        }

        let value = if as_set {
            AttributeValue::set(element.clone(), items)
        } else {
            AttributeValue::list(element.clone(), items)
        };
        match value {
            Ok(v) => {
                self.fields.insert(name.to_string(), v);
            }
            Err(e) => self.skip(name, SkipReason::InvalidValue(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn shape() -> ObjectType {
        ObjectType::new()
            .field("name", AttrType::String)
            .field("count", AttrType::Int)
            .field("ratio", AttrType::Float)
            .field("tags", AttrType::set_of(AttrType::String))
            .field("limits", AttrType::map_of(AttrType::String))
            .field(
                "ports",
                AttrType::list_of(
                    ObjectType::new()
                        .field("director_id", AttrType::String)
                        .field("port_id", AttrType::String)
                        .into(),
                ),
            )
    }

    #[test]
    fn test_scalars_land_verbatim() {
        let shape = shape();
        let mut w = ObjectWriter::new(&shape);
        w.string("name", "h1");
        w.int("count", 3u32);
        let (fields, skipped) = w.finish();
        assert!(skipped.is_empty());
        assert_eq!(fields["name"], AttributeValue::from("h1"));
        assert_eq!(fields["count"], AttributeValue::Int(3));
    }

    #[test]
    fn test_mismatch_and_unmatched_are_skipped() {
        let shape = shape();
        let mut w = ObjectWriter::new(&shape);
        w.bool("name", true);
        w.string("bogus", "x");
        w.float("ratio", f64::NAN);
        w.int("count", u64::MAX);
        let (fields, skipped) = w.finish();
        assert!(fields.is_empty());
        assert_eq!(skipped.len(), 4);
        assert_matches!(skipped[0].reason, SkipReason::TypeMismatch { actual: "bool", .. });
        assert_matches!(skipped[1].reason, SkipReason::NoDestination);
        assert_matches!(skipped[2].reason, SkipReason::InvalidValue(_));
        assert_matches!(skipped[3].reason, SkipReason::InvalidValue(_));
    }

    #[test]
    fn test_strings_follow_destination_collection_kind() {
        let shape = shape();
        let mut w = ObjectWriter::new(&shape);
        w.strings("tags", ["a", "b", "a"]);
        let (fields, _) = w.finish();
        assert_matches!(&fields["tags"], AttributeValue::Set(l) if l.items().len() == 2);
    }

    #[test]
    fn test_struct_flattens_into_map_destination() {
        let shape = shape();
        let mut w = ObjectWriter::new(&shape);
        w.object("limits", |w| {
            w.string("host_io_limit_mb_sec", "100");
            w.string("dynamic_distribution", "Never");
        });
        let (fields, skipped) = w.finish();
        assert!(skipped.is_empty());
        let AttributeValue::Map(m) = &fields["limits"] else {
            panic!("expected map, got {:?}", fields["limits"]);
        };
        assert_eq!(m.entries()["host_io_limit_mb_sec"], AttributeValue::from("100"));
    }

    #[test]
    fn test_nested_skip_carries_full_path() {
        let shape = shape();
        let ports = vec![("FA-1D", 4u8)];
        let mut w = ObjectWriter::new(&shape);
        w.objects("ports", &ports, |w, (dir, port)| {
            w.string("director_id", *dir);
            w.int("port_id", *port);
        });
        let (fields, skipped) = w.finish();
        assert_eq!(fields["ports"].as_items().unwrap().len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].field, "ports.0.port_id");
    }
}
