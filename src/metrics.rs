//! Reconciler Metrics
//!
//! Prometheus counters registered on a registry owned by the caller (one per
//! [`crate::Orchestrator`]), rendered in the text exposition format.

use crate::error::Result;
use crate::mapping::MappingSkip;
use crate::reconcile::{FieldChange, Reconciliation};
use crate::resources::ResourceKind;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for reconcile activity
#[derive(Clone)]
pub struct ReconcileMetrics {
    registry: Registry,
    field_changes: IntCounterVec,
    reconciles: IntCounterVec,
    mapping_skips: IntCounterVec,
}

impl ReconcileMetrics {
    /// Create the counters on a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let field_changes = IntCounterVec::new(
            Opts::new("powermax_field_changes_total", "Field changes by outcome"),
            &["resource", "kind", "outcome"],
        )?;
        let reconciles = IntCounterVec::new(
            Opts::new("powermax_reconciles_total", "Reconcile calls by result"),
            &["resource", "result"],
        )?;
        let mapping_skips = IntCounterVec::new(
            Opts::new(
                "powermax_mapping_skips_total",
                "Backend fields dropped while mapping records",
            ),
            &["resource"],
        )?;

        registry.register(Box::new(field_changes.clone()))?;
        registry.register(Box::new(reconciles.clone()))?;
        registry.register(Box::new(mapping_skips.clone()))?;

        Ok(Self {
            registry,
            field_changes,
            reconciles,
            mapping_skips,
        })
    }

    /// Count every change of a finished reconcile, plus the call itself
    pub fn record_reconciliation(&self, result: &Reconciliation) {
        let resource = result.kind.as_str();
        for change in &result.changes {
            self.record_change(resource, change);
        }
        let outcome = if result.has_failures() { "partial" } else { "ok" };
        self.reconciles.with_label_values(&[resource, outcome]).inc();
        self.record_skips(result.kind, result.observed.skipped());
    }

    /// Count a reconcile call that failed before producing a report
    pub fn record_error(&self, kind: ResourceKind) {
        self.reconciles.with_label_values(&[kind.as_str(), "error"]).inc();
    }

    pub fn record_skips(&self, kind: ResourceKind, skipped: &[MappingSkip]) {
        if !skipped.is_empty() {
            self.mapping_skips
                .with_label_values(&[kind.as_str()])
                .inc_by(skipped.len() as u64);
        }
    }

    fn record_change(&self, resource: &str, change: &FieldChange) {
        let kind = change.kind.to_string();
        self.field_changes
            .with_label_values(&[resource, kind.as_str(), change.outcome.label()])
            .inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::Error::Internal(format!("metrics are not UTF-8: {}", e)))
    }

    #[cfg(test)]
    pub(crate) fn change_count(&self, resource: &str, kind: &str, outcome: &str) -> u64 {
        self.field_changes
            .with_label_values(&[resource, kind, outcome])
            .get()
    }

    #[cfg(test)]
    pub(crate) fn reconcile_count(&self, resource: &str, result: &str) -> u64 {
        self.reconciles.with_label_values(&[resource, result]).get()
    }
}
