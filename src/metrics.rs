//! Prometheus metrics for the repair controller
//!
//! The counter family is owned by an injected [`Metrics`] value rather than
//! a process-wide registry; the reconciler records outcomes through the
//! handle it was constructed with.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use std::fmt::Write;

/// Which remediation was attempted.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RepairType {
    Label,
    Delete,
}

impl RepairType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairType::Label => "label",
            RepairType::Delete => "delete",
        }
    }
}

/// Outcome of a remediation attempt. Observability only; never feeds back
/// into reconciliation decisions.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RepairResult {
    Success,
    Skip,
    Fail,
}

impl RepairResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairResult::Success => "success",
            RepairResult::Skip => "skip",
            RepairResult::Fail => "fail",
        }
    }
}

impl EncodeLabelValue for RepairType {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> std::fmt::Result {
        encoder.write_str(self.as_str())
    }
}

impl EncodeLabelValue for RepairResult {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> std::fmt::Result {
        encoder.write_str(self.as_str())
    }
}

/// Labels for the repaired-pods counter
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RepairLabels {
    pub action: RepairType,
    pub result: RepairResult,
}

/// Counter family tracking remediation attempts by action and result.
pub struct Metrics {
    registry: Registry,
    pods_repaired: Family<RepairLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let pods_repaired = Family::<RepairLabels, Counter>::default();
        let mut registry = Registry::default();
        registry.register(
            "cni_repair_pods_repaired",
            "Pods repaired by the CNI race condition repair controller",
            pods_repaired.clone(),
        );
        Self {
            registry,
            pods_repaired,
        }
    }

    /// Record one remediation attempt.
    pub fn record(&self, action: RepairType, result: RepairResult) {
        self.pods_repaired
            .get_or_create(&RepairLabels { action, result })
            .inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        // Writing into a String cannot fail.
        let _ = encode(&mut buffer, &self.registry);
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
