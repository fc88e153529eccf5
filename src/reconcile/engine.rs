//! Field Reconciler
//!
//! One generic loop, driven by each resource type's declared field table:
//!
//! 1. plan: compare desired against observed field by field, in declared
//!    order, producing `Pending` change records (collections go through the
//!    multiset differ, scalars through direct comparison);
//! 2. apply: call the backend once per pending change, in the same order,
//!    settling each record independently of the others;
//! 3. refresh: read the resource back under whichever identifier is current
//!    and map it into the new observed state.
//!
//! Field failures never stop the loop and never become call-level errors.

use crate::domain::ports::PowerMaxClientRef;
use crate::domain::value::{AttrType, AttributeValue};
use crate::error::{Error, Result};
use crate::mapping::{map_record, MappingSkip, Record};
use crate::reconcile::change::FieldChange;
use crate::reconcile::multiset;
use crate::resources::ResourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, error, info, warn};

// =============================================================================
// Field Table
// =============================================================================

/// How a declared field is mutated on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPath {
    /// Renames the resource; once it succeeds later calls use the new identifier
    Rename,
    /// Renames a label; the resource keeps its identifier
    Relabel,
    /// Single replace call carrying the new value
    Replace,
    /// Separate add and remove calls carrying element lists
    Collection,
    /// Declared, but the backend offers no way to change it
    Unsupported,
}

/// One row of a resource type's declared, dependency-ordered field table
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec<F> {
    pub field: F,
    pub name: &'static str,
    pub path: MutationPath,
}

impl<F> FieldSpec<F> {
    pub const fn new(field: F, name: &'static str, path: MutationPath) -> Self {
        Self { field, name, path }
    }
}

/// Everything a mutation binding needs to issue one backend call
pub struct FieldOp<'a> {
    pub array: &'a str,
    /// Identifier the resource is addressable by right now
    pub id: &'a str,
    pub change: &'a FieldChange,
    pub desired: &'a DesiredConfig,
    pub observed: &'a ObservedState,
}

/// A manageable resource type
#[async_trait]
pub trait Resource: Send + Sync {
    /// Typed field tag dispatched on by [`Resource::apply`]
    type Field: Copy + Debug + Send + Sync + 'static;
    /// Backend record read by State Refresh
    type Record: Record + Send;

    fn kind(&self) -> ResourceKind;

    /// Attribute shape of the resource (an object type)
    fn shape(&self) -> &AttrType;

    /// Attribute naming the resource on the array
    fn identifier(&self) -> &'static str;

    /// Mutable fields in dependency order
    fn fields(&self) -> &[FieldSpec<Self::Field>];

    async fn read(&self, client: &PowerMaxClientRef, array: &str, id: &str) -> Result<Self::Record>;

    /// Issue the backend call for one pending change
    async fn apply(
        &self,
        client: &PowerMaxClientRef,
        field: Self::Field,
        op: FieldOp<'_>,
    ) -> Result<()>;

    /// Rewrite a desired scalar into the form State Refresh reports it in,
    /// before it is compared. Only called with a non-null desired value;
    /// `Err` fails the field without a backend call.
    fn normalize(
        &self,
        field: Self::Field,
        want: &AttributeValue,
        desired: &DesiredConfig,
        observed: &ObservedState,
    ) -> std::result::Result<AttributeValue, String> {
        let _ = (field, desired, observed);
        Ok(want.clone())
    }
}

// =============================================================================
// Desired / Observed
// =============================================================================

/// Caller-supplied target values, keyed by field name.
/// Fields not supplied are `Unknown` ("preserve observed").
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredConfig {
    kind: ResourceKind,
    values: BTreeMap<String, AttributeValue>,
}

impl DesiredConfig {
    /// Decode from JSON against the resource shape
    pub fn decode(kind: ResourceKind, shape: &AttrType, json: &serde_json::Value) -> Result<Self> {
        let decoded = AttributeValue::from_json(json, shape).map_err(|e| Error::DesiredDecode {
            kind: kind.to_string(),
            reason: e.to_string(),
        })?;
        match decoded {
            AttributeValue::Object(values) => Ok(Self { kind, values }),
            other => Err(Error::DesiredDecode {
                kind: kind.to_string(),
                reason: format!("expected an object, found {}", other.type_name()),
            }),
        }
    }

    /// Wrap already-decoded values, re-checking them against the shape
    pub fn from_values(
        kind: ResourceKind,
        shape: &AttrType,
        values: BTreeMap<String, AttributeValue>,
    ) -> Result<Self> {
        let candidate = AttributeValue::Object(values);
        if !candidate.conforms_to(shape) {
            let detail = match (&candidate, shape.as_object()) {
                (AttributeValue::Object(values), Some(obj)) => values
                    .iter()
                    .find(|(k, v)| obj.get(k).map_or(true, |t| !v.conforms_to(t)))
                    .map(|(k, v)| format!("{}: {} does not fit", k, v.type_name()))
                    .unwrap_or_default(),
                _ => format!("shape is {}", shape),
            };
            return Err(Error::DesiredDecode {
                kind: kind.to_string(),
                reason: detail,
            });
        }
        match candidate {
            AttributeValue::Object(values) => Ok(Self { kind, values }),
            other => Err(Error::DesiredDecode {
                kind: kind.to_string(),
                reason: format!("expected an object, found {}", other.type_name()),
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Desired value of a field; `Unknown` when not supplied
    pub fn get(&self, field: &str) -> &AttributeValue {
        self.values.get(field).unwrap_or(&AttributeValue::Unknown)
    }

    /// Desired string value, if known
    pub fn string(&self, field: &str) -> Option<&str> {
        self.get(field).as_str()
    }
}

/// Attribute values last read from the backend for one resource instance.
/// Only State Refresh builds these.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedState {
    kind: ResourceKind,
    id: Option<String>,
    value: AttributeValue,
    skipped: Vec<MappingSkip>,
    read_at: DateTime<Utc>,
}

impl ObservedState {
    pub(crate) fn new(
        kind: ResourceKind,
        identifier: &str,
        value: AttributeValue,
        skipped: Vec<MappingSkip>,
    ) -> Self {
        let id = value
            .get(identifier)
            .and_then(AttributeValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            kind,
            id,
            value,
            skipped,
            read_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Natural identifier, when the backend reported one
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    /// Observed value of a field; `Null` when absent
    pub fn get(&self, field: &str) -> &AttributeValue {
        self.value.get(field).unwrap_or(&AttributeValue::Null)
    }

    /// Fields the mapper had to drop while building this state
    pub fn skipped(&self) -> &[MappingSkip] {
        &self.skipped
    }

    pub fn read_at(&self) -> DateTime<Utc> {
        self.read_at
    }
}

// =============================================================================
// Reconciliation Result
// =============================================================================

/// Outcome of one reconcile call
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub kind: ResourceKind,
    /// Identifier the resource had when the call started
    pub previous_id: String,
    /// Change records in the order they were attempted
    pub changes: Vec<FieldChange>,
    /// State read back after all changes were attempted
    pub observed: ObservedState,
}

impl Reconciliation {
    pub fn applied(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(|c| c.is_applied())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter().filter(|c| c.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Whether a rename went through
    pub fn renamed(&self) -> bool {
        self.observed.id().map_or(false, |id| id != self.previous_id)
    }

    /// "updated: a, b; failed: c (reason)"
    pub fn summary(&self) -> String {
        let mut applied: Vec<&str> = Vec::new();
        for c in self.applied() {
            if !applied.contains(&c.field.as_str()) {
                applied.push(&c.field);
            }
        }
        let failed: Vec<String> = self.failed().map(|c| c.to_string()).collect();

        let mut parts = Vec::new();
        if !applied.is_empty() {
            parts.push(format!("updated: {}", applied.join(", ")));
        }
        if !failed.is_empty() {
            parts.push(format!("failed: {}", failed.join(", ")));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join("; ")
        }
    }

    /// Turn any field failure into one aggregate error
    pub fn into_result(self) -> Result<Self> {
        if self.has_failures() {
            Err(Error::PartialUpdate {
                kind: self.kind.to_string(),
                id: self
                    .observed
                    .id()
                    .unwrap_or(self.previous_id.as_str())
                    .to_string(),
                report: self.summary(),
            })
        } else {
            Ok(self)
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Change record paired with the table row that produced it
struct Planned<'s, F> {
    spec: &'s FieldSpec<F>,
    change: FieldChange,
}

/// Drives plan/apply/refresh for one resource type against one array
pub struct Reconciler<R: Resource> {
    resource: R,
    client: PowerMaxClientRef,
    array_id: String,
}

impl<R: Resource> Reconciler<R> {
    pub fn new(resource: R, client: PowerMaxClientRef, array_id: impl Into<String>) -> Self {
        Self {
            resource,
            client,
            array_id: array_id.into(),
        }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Decode a desired configuration for this resource type
    pub fn decode(&self, json: &serde_json::Value) -> Result<DesiredConfig> {
        DesiredConfig::decode(self.resource.kind(), self.resource.shape(), json)
    }

    /// State Refresh: read the resource and map it into observed state
    pub async fn read(&self, id: &str) -> Result<ObservedState> {
        let kind = self.resource.kind();
        let record = self.resource.read(&self.client, &self.array_id, id).await?;
        let mapped = map_record(Some(&record), self.resource.shape())?;
        debug!(
            "Refreshed {}/{} ({} fields skipped)",
            kind,
            id,
            mapped.skipped.len()
        );
        Ok(ObservedState::new(
            kind,
            self.resource.identifier(),
            mapped.value,
            mapped.skipped,
        ))
    }

    /// Compute the change list without touching the backend.
    /// Unsupported fields come back already `Failed`.
    pub fn plan(
        &self,
        desired: &DesiredConfig,
        observed: &ObservedState,
    ) -> Result<Vec<FieldChange>> {
        Ok(self
            .plan_fields(desired, observed)?
            .into_iter()
            .map(|p| p.change)
            .collect())
    }

    fn plan_fields(
        &self,
        desired: &DesiredConfig,
        observed: &ObservedState,
    ) -> Result<Vec<Planned<'_, R::Field>>> {
        let kind = self.resource.kind();
        if desired.kind() != kind {
            return Err(Error::DesiredDecode {
                kind: kind.to_string(),
                reason: format!("configuration was decoded for {}", desired.kind()),
            });
        }
        if observed.kind() != kind {
            return Err(Error::Internal(format!(
                "observed state of {} handed to {} reconciler",
                observed.kind(),
                kind
            )));
        }

        let mut planned = Vec::new();
        for spec in self.resource.fields() {
            let want = desired.get(spec.name);
            let have = observed.get(spec.name);

            match spec.path {
                MutationPath::Collection => {
                    for change in diff_collection(spec.name, want, have) {
                        planned.push(Planned { spec, change });
                    }
                }
                MutationPath::Unsupported => {
                    let Some(target) = diff_scalar(want, have) else {
                        continue;
                    };
                    let mut change = FieldChange::replace(spec.name, target);
                    change.settle(Err("unsupported field".to_string()));
                    planned.push(Planned { spec, change });
                }
                _ => {
                    if want.is_unknown() || want.is_null() {
                        continue;
                    }
                    let want = match self.resource.normalize(spec.field, want, desired, observed) {
                        Ok(want) => want,
                        Err(reason) => {
                            let mut change = FieldChange::replace(spec.name, want.clone());
                            change.settle(Err(reason));
                            planned.push(Planned { spec, change });
                            continue;
                        }
                    };
                    let Some(target) = diff_scalar(&want, have) else {
                        continue;
                    };
                    planned.push(Planned {
                        spec,
                        change: FieldChange::replace(spec.name, target),
                    });
                }
            }
        }
        Ok(planned)
    }

    /// Reconcile one resource instance.
    ///
    /// Returns an error only when the desired configuration does not belong
    /// to this resource or the resource cannot be addressed at all; every
    /// field-level failure is reported in [`Reconciliation::changes`].
    pub async fn reconcile(
        &self,
        desired: &DesiredConfig,
        observed: &ObservedState,
    ) -> Result<Reconciliation> {
        let kind = self.resource.kind();
        let planned = self.plan_fields(desired, observed)?;

        let previous_id = observed.id().map(str::to_string).ok_or_else(|| {
            error!("Cannot reconcile {}: observed state carries no identifier", kind);
            Error::IdentifierUnresolved {
                kind: kind.to_string(),
                reason: format!("observed state has no {}", self.resource.identifier()),
            }
        })?;

        info!(
            "Reconciling {}/{}: {} change(s) planned",
            kind,
            previous_id,
            planned.len()
        );

        let mut current_id = previous_id.clone();
        let mut changes = Vec::with_capacity(planned.len());

        for Planned { spec, mut change } in planned {
            if !change.is_pending() {
                warn!("{}/{}: {}", kind, current_id, change);
                changes.push(change);
                continue;
            }

            let op = FieldOp {
                array: &self.array_id,
                id: &current_id,
                change: &change,
                desired,
                observed,
            };
            let result = self.resource.apply(&self.client, spec.field, op).await;

            match result {
                Ok(()) => {
                    debug!("{}/{}: applied {}", kind, current_id, change);
                    if spec.path == MutationPath::Rename {
                        if let Some(new_id) = change.value().and_then(AttributeValue::as_str) {
                            info!("{}: renamed {} -> {}", kind, current_id, new_id);
                            current_id = new_id.to_string();
                        }
                    }
                    change.settle(Ok(()));
                }
                Err(e) => {
                    warn!("{}/{}: {} failed: {}", kind, current_id, change, e);
                    change.settle(Err(e.to_string()));
                }
            }
            changes.push(change);
        }

        let refreshed = self.read(&current_id).await?;

        let reconciliation = Reconciliation {
            kind,
            previous_id,
            changes,
            observed: refreshed,
        };
        info!(
            "Reconciled {}/{}: {}",
            kind,
            current_id,
            reconciliation.summary()
        );
        Ok(reconciliation)
    }
}

// =============================================================================
// Diffing
// =============================================================================

/// Add/remove changes for a collection field; empty when already in sync
fn diff_collection(name: &str, want: &AttributeValue, have: &AttributeValue) -> Vec<FieldChange> {
    if want.is_unknown() {
        return Vec::new();
    }
    let want_items = want.as_items().unwrap_or(&[]);
    let have_items = have.as_items().unwrap_or(&[]);

    // Unknown elements cannot be compared; leave the field alone
    if !want_items.iter().all(AttributeValue::is_known) {
        return Vec::new();
    }

    let want_keys: Vec<String> = want_items.iter().map(AttributeValue::collection_key).collect();
    let have_keys: Vec<String> = have_items.iter().map(AttributeValue::collection_key).collect();
    if multiset::equal(&want_keys, &have_keys) {
        return Vec::new();
    }

    let by_key: IndexMap<String, &AttributeValue> = want_keys
        .iter()
        .cloned()
        .zip(want_items)
        .chain(have_keys.iter().cloned().zip(have_items))
        .collect();
    let lookup = |keys: Vec<String>| -> Vec<AttributeValue> {
        keys.iter()
            .filter_map(|k| by_key.get(k).map(|v| (*v).clone()))
            .collect()
    };

    let partition = multiset::partition(&want_keys, &have_keys);
    let mut changes = Vec::new();
    if !partition.to_add.is_empty() {
        changes.push(FieldChange::add(name, lookup(partition.to_add)));
    }
    if !partition.to_remove.is_empty() {
        changes.push(FieldChange::remove(name, lookup(partition.to_remove)));
    }
    changes
}

/// Target value for a scalar field, or `None` when nothing should change.
/// `Unknown` and `Null` desired values preserve the observed value.
fn diff_scalar(want: &AttributeValue, have: &AttributeValue) -> Option<AttributeValue> {
    if want.is_unknown() || want.is_null() {
        return None;
    }
    let target = overlay(want, have);
    (target != *have).then_some(target)
}

/// Fill unknown parts of `want` from `have`, recursing into objects
fn overlay(want: &AttributeValue, have: &AttributeValue) -> AttributeValue {
    match (want, have) {
        (AttributeValue::Unknown, h) => h.clone(),
        (AttributeValue::Object(w), AttributeValue::Object(h)) => {
            let mut merged = h.clone();
            for (k, v) in w {
                let resolved = match h.get(k) {
                    Some(hv) => overlay(v, hv),
                    None => v.clone(),
                };
                merged.insert(k.clone(), resolved);
            }
            AttributeValue::Object(merged)
        }
        (w, _) => w.clone(),
    }
}
