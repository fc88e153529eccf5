//! Attribute Values
//!
//! Typed, tri-state (known/unknown/null) containers exchanged with the
//! configuration engine. Every other layer produces or consumes these.
//!
//! Collections carry their declared element type and are built only through
//! checked constructors, so a `List`/`Set`/`Map` never holds an element of
//! the wrong type. Values are never mutated in place; a new value replaces
//! an old one.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Attribute Types
// =============================================================================

/// Declared type of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttrType {
    String,
    Int,
    Float,
    Bool,
    List(Box<AttrType>),
    Set(Box<AttrType>),
    Map(Box<AttrType>),
    Object(ObjectType),
}

impl AttrType {
    pub fn list_of(element: AttrType) -> Self {
        AttrType::List(Box::new(element))
    }

    pub fn set_of(element: AttrType) -> Self {
        AttrType::Set(Box::new(element))
    }

    pub fn map_of(element: AttrType) -> Self {
        AttrType::Map(Box::new(element))
    }

    /// Object shape, if this is an object type
    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            AttrType::Object(shape) => Some(shape),
            _ => None,
        }
    }

    /// Short type name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Int => "int",
            AttrType::Float => "float",
            AttrType::Bool => "bool",
            AttrType::List(_) => "list",
            AttrType::Set(_) => "set",
            AttrType::Map(_) => "map",
            AttrType::Object(_) => "object",
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::List(e) => write!(f, "list({})", e),
            AttrType::Set(e) => write!(f, "set({})", e),
            AttrType::Map(e) => write!(f, "map({})", e),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Ordered field table of an object type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectType {
    fields: IndexMap<String, AttrType>,
}

impl ObjectType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn field(mut self, name: impl Into<String>, ty: AttrType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrType> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &AttrType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<ObjectType> for AttrType {
    fn from(shape: ObjectType) -> Self {
        AttrType::Object(shape)
    }
}

// =============================================================================
// Collections
// =============================================================================

/// Homogeneous element sequence backing `List` and `Set`
#[derive(Debug, Clone)]
pub struct AttrList {
    element: AttrType,
    items: Vec<AttributeValue>,
}

impl AttrList {
    pub fn element(&self) -> &AttrType {
        &self.element
    }

    pub fn items(&self) -> &[AttributeValue] {
        &self.items
    }
}

/// Homogeneous string-keyed map backing `Map`
#[derive(Debug, Clone, PartialEq)]
pub struct AttrMap {
    element: AttrType,
    entries: BTreeMap<String, AttributeValue>,
}

impl AttrMap {
    pub fn element(&self) -> &AttrType {
        &self.element
    }

    pub fn entries(&self) -> &BTreeMap<String, AttributeValue> {
        &self.entries
    }
}

// =============================================================================
// Attribute Value
// =============================================================================

/// A single typed attribute value
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// Explicitly absent
    Null,
    /// Not yet known; for desired configuration this means "preserve observed"
    Unknown,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(AttrList),
    Set(AttrList),
    Map(AttrMap),
    Object(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Build a list, checking every element against `element`
    pub fn list(element: AttrType, items: Vec<AttributeValue>) -> Result<Self> {
        check_elements(&element, items.iter())?;
        Ok(AttributeValue::List(AttrList { element, items }))
    }

    /// Build a set, checking element types and dropping duplicates (first seen wins)
    pub fn set(element: AttrType, items: Vec<AttributeValue>) -> Result<Self> {
        check_elements(&element, items.iter())?;
        let mut seen = indexmap::IndexSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.collection_key()))
            .collect();
        Ok(AttributeValue::Set(AttrList { element, items }))
    }

    /// Build a string-keyed map, checking every entry against `element`
    pub fn map(element: AttrType, entries: BTreeMap<String, AttributeValue>) -> Result<Self> {
        check_elements(&element, entries.values())?;
        Ok(AttributeValue::Map(AttrMap { element, entries }))
    }

    /// Build an object from field/value pairs
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, AttributeValue)>) -> Self {
        AttributeValue::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// List of strings; always well-typed
    pub fn string_list<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        AttributeValue::List(AttrList {
            element: AttrType::String,
            items: items
                .into_iter()
                .map(|s| AttributeValue::String(s.into()))
                .collect(),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AttributeValue::Unknown)
    }

    /// True when neither this value nor anything nested in it is `Unknown`
    pub fn is_known(&self) -> bool {
        match self {
            AttributeValue::Unknown => false,
            AttributeValue::List(l) | AttributeValue::Set(l) => l.items.iter().all(Self::is_known),
            AttributeValue::Map(m) => m.entries.values().all(Self::is_known),
            AttributeValue::Object(fields) => fields.values().all(Self::is_known),
            _ => true,
        }
    }

    /// Short name of the runtime variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Unknown => "unknown",
            AttributeValue::String(_) => "string",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::List(_) => "list",
            AttributeValue::Set(_) => "set",
            AttributeValue::Map(_) => "map",
            AttributeValue::Object(_) => "object",
        }
    }

    /// Whether this value may be stored in a slot declared as `ty`.
    /// `Null` and `Unknown` conform to every type; objects may omit fields.
    pub fn conforms_to(&self, ty: &AttrType) -> bool {
        match (self, ty) {
            (AttributeValue::Null | AttributeValue::Unknown, _) => true,
            (AttributeValue::String(_), AttrType::String)
            | (AttributeValue::Int(_), AttrType::Int)
            | (AttributeValue::Float(_), AttrType::Float)
            | (AttributeValue::Bool(_), AttrType::Bool) => true,
            (AttributeValue::List(l), AttrType::List(e))
            | (AttributeValue::Set(l), AttrType::Set(e)) => {
                l.element == **e
            }
            (AttributeValue::Map(m), AttrType::Map(e)) => m.element == **e,
            (AttributeValue::Object(fields), AttrType::Object(shape)) => fields
                .iter()
                .all(|(name, v)| shape.get(name).map_or(false, |t| v.conforms_to(t))),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Elements of a list or set
    pub fn as_items(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(l) | AttributeValue::Set(l) => Some(&l.items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            AttributeValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Field of an object value; `None` for non-objects and absent fields
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.as_object().and_then(|fields| fields.get(name))
    }

    /// Walk a dotted path through nested objects
    pub fn path(&self, path: &str) -> Option<&AttributeValue> {
        path.split('.').try_fold(self, |v, seg| v.get(seg))
    }

    /// Canonical comparison key used by the multiset differ
    pub fn collection_key(&self) -> String {
        match self {
            AttributeValue::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    /// Render as JSON; `Unknown` renders as `null`
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            AttributeValue::Null | AttributeValue::Unknown => Value::Null,
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::Int(i) => Value::from(*i),
            AttributeValue::Float(f) => Value::from(*f),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::List(l) | AttributeValue::Set(l) => {
                Value::Array(l.items.iter().map(Self::to_json).collect())
            }
            AttributeValue::Map(m) => Value::Object(
                m.entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            AttributeValue::Object(fields) => Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Decode JSON against a declared type.
    ///
    /// Absent object fields decode as `Unknown`, JSON `null` as `Null`.
    /// Object keys the shape does not declare are rejected.
    pub fn from_json(json: &serde_json::Value, ty: &AttrType) -> Result<Self> {
        decode(json, ty, "")
    }
}

fn check_elements<'a>(
    element: &AttrType,
    items: impl Iterator<Item = &'a AttributeValue>,
) -> Result<()> {
    for (idx, item) in items.enumerate() {
        if !item.conforms_to(element) {
            return Err(Error::InvalidAttribute(format!(
                "element {} is {}, collection declares {}",
                idx,
                item.type_name(),
                element
            )));
        }
    }
    Ok(())
}

fn decode(json: &serde_json::Value, ty: &AttrType, at: &str) -> Result<AttributeValue> {
    let mismatch = || {
        Error::InvalidAttribute(format!(
            "{}: expected {}, found {}",
            if at.is_empty() { "<root>" } else { at },
            ty,
            json_kind(json)
        ))
    };
    let child = |seg: &str| {
        if at.is_empty() {
            seg.to_string()
        } else {
            format!("{}.{}", at, seg)
        }
    };

    if json.is_null() {
        return Ok(AttributeValue::Null);
    }

    match ty {
        AttrType::String => json
            .as_str()
            .map(|s| AttributeValue::String(s.to_string()))
            .ok_or_else(mismatch),
        AttrType::Int => json.as_i64().map(AttributeValue::Int).ok_or_else(mismatch),
        AttrType::Float => json.as_f64().map(AttributeValue::Float).ok_or_else(mismatch),
        AttrType::Bool => json.as_bool().map(AttributeValue::Bool).ok_or_else(mismatch),
        AttrType::List(e) | AttrType::Set(e) => {
            let arr = json.as_array().ok_or_else(mismatch)?;
            let items = arr
                .iter()
                .enumerate()
                .map(|(i, v)| decode(v, e, &child(&i.to_string())))
                .collect::<Result<Vec<_>>>()?;
            if matches!(ty, AttrType::Set(_)) {
                AttributeValue::set((**e).clone(), items)
            } else {
                AttributeValue::list((**e).clone(), items)
            }
        }
        AttrType::Map(e) => {
            let obj = json.as_object().ok_or_else(mismatch)?;
            let entries = obj
                .iter()
                .map(|(k, v)| Ok((k.clone(), decode(v, e, &child(k))?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            AttributeValue::map((**e).clone(), entries)
        }
        AttrType::Object(shape) => {
            let obj = json.as_object().ok_or_else(mismatch)?;
            if let Some(extra) = obj.keys().find(|k| !shape.contains(k)) {
                return Err(Error::InvalidAttribute(format!(
                    "{}: unknown attribute",
                    child(extra)
                )));
            }
            let mut fields = BTreeMap::new();
            for (name, field_ty) in shape.fields() {
                let value = match obj.get(name) {
                    Some(v) => decode(v, field_ty, &child(name))?,
                    None => AttributeValue::Unknown,
                };
                fields.insert(name.to_string(), value);
            }
            Ok(AttributeValue::Object(fields))
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match json {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// Sets compare as sets; everything else structurally.
impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;
        match (self, other) {
            (Null, Null) | (Unknown, Unknown) => true,
            (String(a), String(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (List(a), List(b)) => a.element == b.element && a.items == b.items,
            (Set(a), Set(b)) => {
                a.element == b.element
                    && a.items.len() == b.items.len()
                    && a.items.iter().all(|x| b.items.contains(x))
            }
            (Map(a), Map(b)) => a == b,
            (Object(a), Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttributeValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn flag_shape() -> AttrType {
        ObjectType::new()
            .field("enabled", AttrType::Bool)
            .field("override", AttrType::Bool)
            .into()
    }

    #[test]
    fn test_list_rejects_foreign_elements() {
        let err = AttributeValue::list(
            AttrType::String,
            vec!["a".into(), AttributeValue::Int(1)],
        );
        assert_matches!(err, Err(Error::InvalidAttribute(_)));

        let ok = AttributeValue::list(AttrType::String, vec!["a".into(), AttributeValue::Null]);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_set_dedups_and_ignores_order() {
        let a = AttributeValue::set(AttrType::String, vec!["x".into(), "y".into(), "x".into()])
            .unwrap();
        let b = AttributeValue::set(AttrType::String, vec!["y".into(), "x".into()]).unwrap();
        assert_eq!(a.as_items().unwrap().len(), 2);
        assert_eq!(a, b);

        let l1 = AttributeValue::string_list(["x", "y"]);
        let l2 = AttributeValue::string_list(["y", "x"]);
        assert_ne!(l1, l2);
    }

    #[test]
    fn test_decode_object_marks_absent_unknown() {
        let shape: AttrType = ObjectType::new()
            .field("name", AttrType::String)
            .field("initiators", AttrType::list_of(AttrType::String))
            .field("scsi_3", flag_shape())
            .into();

        let v = AttributeValue::from_json(
            &json!({"name": "h1", "scsi_3": {"enabled": true}}),
            &shape,
        )
        .unwrap();

        assert_eq!(v.get("name"), Some(&AttributeValue::from("h1")));
        assert!(v.get("initiators").unwrap().is_unknown());
        assert_eq!(v.path("scsi_3.enabled"), Some(&AttributeValue::Bool(true)));
        assert!(v.path("scsi_3.override").unwrap().is_unknown());
        assert!(!v.is_known());
    }

    #[test]
    fn test_decode_reports_path_of_mismatch() {
        let shape: AttrType = ObjectType::new().field("scsi_3", flag_shape()).into();
        let err = AttributeValue::from_json(&json!({"scsi_3": {"enabled": "yes"}}), &shape)
            .unwrap_err();
        assert!(err.to_string().contains("scsi_3.enabled"), "{}", err);

        let err = AttributeValue::from_json(&json!({"bogus": 1}), &shape).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_float_accepts_integer_json() {
        let v = AttributeValue::from_json(&json!(10), &AttrType::Float).unwrap();
        assert_eq!(v, AttributeValue::Float(10.0));
        assert!(AttributeValue::from_json(&json!(1.5), &AttrType::Int).is_err());
    }

    #[test]
    fn test_conformance() {
        let shape = flag_shape();
        let v = AttributeValue::object([("enabled", AttributeValue::Bool(true))]);
        assert!(v.conforms_to(&shape));
        assert!(!AttributeValue::from("x").conforms_to(&shape));
        assert!(AttributeValue::Unknown.conforms_to(&AttrType::Int));
        let strings = AttributeValue::string_list(["a"]);
        assert!(strings.conforms_to(&AttrType::list_of(AttrType::String)));
        assert!(!strings.conforms_to(&AttrType::list_of(AttrType::Int)));
    }

    #[test]
    fn test_collection_key_is_canonical() {
        let a = AttributeValue::object([
            ("director_id", AttributeValue::from("FA-1D")),
            ("port_id", AttributeValue::from("4")),
        ]);
        let b = AttributeValue::object([
            ("port_id", AttributeValue::from("4")),
            ("director_id", AttributeValue::from("FA-1D")),
        ]);
        assert_eq!(a.collection_key(), b.collection_key());
        assert_eq!(AttributeValue::from("abc").collection_key(), "abc");
    }
}
