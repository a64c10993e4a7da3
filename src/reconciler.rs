//! Broken pod reconciliation
//!
//! [`BrokenPodReconciler`] composes the detection predicate, the configured
//! remediation, and the pod store. Per-pod actions re-check the predicate
//! before mutating anything so a pod that recovered between listing and
//! acting is never touched. Bulk operations never short-circuit: every
//! per-pod failure is collected into one combined error.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, error, info};

use crate::detect::{is_broken, FilterCriteria};
use crate::error::{Error, Result};
use crate::metrics::{Metrics, RepairResult, RepairType};
use crate::store::PodStore;

/// Remediation switches and the label written by label-mode.
///
/// Delete takes precedence over label when both are set: a reconciler
/// configured with both must never label a pod it also deletes.
#[derive(Debug, Clone, Default)]
pub struct RemediationOptions {
    pub label_pods: bool,
    pub delete_pods: bool,
    pub pod_label_key: String,
    pub pod_label_value: String,
}

/// Detects broken pods and applies the configured remediation.
pub struct BrokenPodReconciler<S> {
    store: S,
    filters: FilterCriteria,
    options: RemediationOptions,
    metrics: Arc<Metrics>,
}

impl<S: PodStore> BrokenPodReconciler<S> {
    pub fn new(
        store: S,
        filters: FilterCriteria,
        options: RemediationOptions,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            filters,
            options,
            metrics,
        }
    }

    pub fn filters(&self) -> &FilterCriteria {
        &self.filters
    }

    pub fn options(&self) -> &RemediationOptions {
        &self.options
    }

    /// Apply the configured remediation to a single pod. At most one action
    /// runs per call; with no action configured this is a no-op skip.
    pub async fn reconcile_pod(&self, pod: &Pod) -> Result<RepairResult> {
        debug!("Reconciling pod {}", pod.name_any());

        if self.options.delete_pods {
            self.delete_broken_pod(pod).await
        } else if self.options.label_pods {
            self.label_broken_pod(pod).await
        } else {
            Ok(RepairResult::Skip)
        }
    }

    /// Label a broken pod with the configured key/value.
    ///
    /// Labeling is idempotent: a pod already carrying the label key, with
    /// any value, is skipped rather than overwritten.
    pub async fn label_broken_pod(&self, pod: &Pod) -> Result<RepairResult> {
        // Re-checked here, not just at list time, so no healthy pod gets
        // labeled.
        if !is_broken(pod, &self.filters) {
            self.metrics.record(RepairType::Label, RepairResult::Skip);
            return Ok(RepairResult::Skip);
        }

        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        let name = pod.name_any();
        info!("Pod detected as broken, adding label: {}/{}", namespace, name);

        let key = &self.options.pod_label_key;
        if pod.labels().contains_key(key) {
            info!(
                "Pod {}/{} already has label with key {}, skipping",
                namespace, name, key
            );
            self.metrics.record(RepairType::Label, RepairResult::Skip);
            return Ok(RepairResult::Skip);
        }

        info!(
            "Labeling pod {}/{} with label {}={}",
            namespace, name, key, self.options.pod_label_value
        );

        // Pod snapshots are treated as immutable; the store gets a fresh
        // labeled copy.
        let mut labeled = pod.clone();
        labeled
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(key.clone(), self.options.pod_label_value.clone());

        match self.store.update(&labeled).await {
            Ok(_) => {
                self.metrics.record(RepairType::Label, RepairResult::Success);
                Ok(RepairResult::Success)
            }
            Err(e) => {
                error!("Failed to update pod {}/{}: {}", namespace, name, e);
                self.metrics.record(RepairType::Label, RepairResult::Fail);
                Err(Error::Repair {
                    action: "label",
                    namespace,
                    name,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Delete a broken pod so its controller recreates it healthily.
    pub async fn delete_broken_pod(&self, pod: &Pod) -> Result<RepairResult> {
        // Same double-safety re-check as labeling.
        if !is_broken(pod, &self.filters) {
            self.metrics.record(RepairType::Delete, RepairResult::Skip);
            return Ok(RepairResult::Skip);
        }

        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        let name = pod.name_any();
        info!("Pod detected as broken, deleting: {}/{}", namespace, name);

        match self.store.delete(&namespace, &name).await {
            Ok(()) => {
                self.metrics.record(RepairType::Delete, RepairResult::Success);
                Ok(RepairResult::Success)
            }
            Err(e) => {
                error!("Failed to delete pod {}/{}: {}", namespace, name, e);
                self.metrics.record(RepairType::Delete, RepairResult::Fail);
                Err(Error::Repair {
                    action: "delete",
                    namespace,
                    name,
                    source: Box::new(e),
                })
            }
        }
    }

    /// List every pod matching the filter criteria, in encounter order.
    ///
    /// The server-side selectors narrow the fetch; the broken-pod signature
    /// itself is container termination history, which no label or field
    /// selector can express, so classification happens client-side.
    pub async fn list_broken_pods(&self) -> Result<Vec<Pod>> {
        let pods = self
            .store
            .list(&self.filters.label_selectors, &self.filters.field_selectors)
            .await?;

        Ok(pods
            .into_iter()
            .filter(|pod| is_broken(pod, &self.filters))
            .collect())
    }

    /// Label every broken pod, collecting per-pod failures.
    pub async fn label_broken_pods(&self) -> Result<()> {
        let mut failures = Vec::new();
        for pod in self.list_broken_pods().await? {
            if let Err(e) = self.label_broken_pod(&pod).await {
                failures.push(e);
            }
        }
        Error::from_failures(failures)
    }

    /// Delete every broken pod, collecting per-pod failures.
    pub async fn delete_broken_pods(&self) -> Result<()> {
        let mut failures = Vec::new();
        for pod in self.list_broken_pods().await? {
            if let Err(e) = self.delete_broken_pod(&pod).await {
                failures.push(e);
            }
        }
        Error::from_failures(failures)
    }
}
