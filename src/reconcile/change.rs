//! Field Change Records
//!
//! One record per field a reconcile decided to touch. Records start
//! `Pending`, are settled exactly once as the matching mutation call returns,
//! and together form the audit trail of the call.

use crate::domain::value::AttributeValue;
use serde::{Serialize, Serializer};

/// Kind of change applied to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Remove,
    Replace,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Add => write!(f, "add"),
            ChangeKind::Remove => write!(f, "remove"),
            ChangeKind::Replace => write!(f, "replace"),
        }
    }
}

/// Apply outcome of a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "reason")]
pub enum Outcome {
    Pending,
    Applied,
    Failed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Applied => "applied",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// What the change carries to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Replacement value for a scalar field
    Value(AttributeValue),
    /// Elements to add or remove for a collection field
    Elements(Vec<AttributeValue>),
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Payload::Value(v) => v.to_json().serialize(serializer),
            Payload::Elements(items) => items
                .iter()
                .map(AttributeValue::to_json)
                .collect::<Vec<_>>()
                .serialize(serializer),
        }
    }
}

/// One field's diff outcome plus its apply outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub kind: ChangeKind,
    pub payload: Payload,
    pub outcome: Outcome,
}

impl FieldChange {
    pub fn replace(field: &str, value: AttributeValue) -> Self {
        Self {
            field: field.to_string(),
            kind: ChangeKind::Replace,
            payload: Payload::Value(value),
            outcome: Outcome::Pending,
        }
    }

    pub fn add(field: &str, elements: Vec<AttributeValue>) -> Self {
        Self {
            field: field.to_string(),
            kind: ChangeKind::Add,
            payload: Payload::Elements(elements),
            outcome: Outcome::Pending,
        }
    }

    pub fn remove(field: &str, elements: Vec<AttributeValue>) -> Self {
        Self {
            field: field.to_string(),
            kind: ChangeKind::Remove,
            payload: Payload::Elements(elements),
            outcome: Outcome::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.outcome, Outcome::Pending)
    }

    pub fn is_applied(&self) -> bool {
        matches!(self.outcome, Outcome::Applied)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    /// Settle a pending change; settled changes are never revisited
    pub(crate) fn settle(&mut self, result: std::result::Result<(), String>) {
        debug_assert!(self.is_pending(), "{} settled twice", self.field);
        self.outcome = match result {
            Ok(()) => Outcome::Applied,
            Err(reason) => Outcome::Failed(reason),
        };
    }

    /// Replacement value, for scalar changes
    pub fn value(&self) -> Option<&AttributeValue> {
        match &self.payload {
            Payload::Value(v) => Some(v),
            Payload::Elements(_) => None,
        }
    }

    /// Elements, for collection changes
    pub fn elements(&self) -> &[AttributeValue] {
        match &self.payload {
            Payload::Elements(items) => items,
            Payload::Value(_) => &[],
        }
    }
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.field, self.kind)?;
        if let Outcome::Failed(reason) = &self.outcome {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle() {
        let mut change = FieldChange::add("initiators", vec!["B".into()]);
        assert!(change.is_pending());
        change.settle(Ok(()));
        assert!(change.is_applied());

        let mut change = FieldChange::replace("name", "h2".into());
        change.settle(Err("name in use".into()));
        assert_eq!(change.outcome, Outcome::Failed("name in use".into()));
        assert_eq!(change.to_string(), "name/replace (name in use)");
    }

    #[test]
    fn test_payload_accessors() {
        let change = FieldChange::remove("initiators", vec!["C".into()]);
        assert_eq!(change.elements(), &[AttributeValue::from("C")]);
        assert!(change.value().is_none());
    }

    #[test]
    fn test_serializes_for_reports() {
        let mut change = FieldChange::add("host_ids", vec!["h1".into()]);
        change.settle(Err("busy".into()));
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["kind"], "add");
        assert_eq!(json["payload"][0], "h1");
        assert_eq!(json["outcome"]["state"], "failed");
        assert_eq!(json["outcome"]["reason"], "busy");
    }
}
