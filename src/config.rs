//! Flag and environment configuration
//!
//! Every flag is also bindable through a `REPAIR_*` environment variable so
//! the controller can be configured from a pod spec without argument
//! plumbing. Parsing resolves into the immutable [`FilterCriteria`] and
//! [`RemediationOptions`] pair the reconciler is constructed with.

use clap::Parser;
use tracing::info;

use crate::detect::FilterCriteria;
use crate::reconciler::RemediationOptions;

/// Exit code the validation init container reports when the network
/// redirect it probes for was never installed.
pub const VALIDATION_EXIT_CODE: i32 = 126;

/// Command-line configuration for the repair controller.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cni-repair",
    about = "Detects and repairs pods broken by the CNI race condition",
    version
)]
pub struct RepairConfig {
    /// The name of the managed node (manages all nodes if unset)
    #[arg(long, env = "REPAIR_NODE_NAME", default_value = "")]
    pub node_name: String,

    /// Annotation key that indicates a pod contains a sidecar; pods without
    /// this annotation are ignored. The annotation value is not examined.
    #[arg(
        long,
        env = "REPAIR_SIDECAR_ANNOTATION",
        default_value = "sidecar.istio.io/status"
    )]
    pub sidecar_annotation: String,

    /// Name of the init container that crash-loops when the CNI redirect is
    /// missing (empty matches any init container)
    #[arg(
        long,
        env = "REPAIR_INIT_CONTAINER_NAME",
        default_value = "istio-validation"
    )]
    pub init_container_name: String,

    /// Expected termination message of the crash-looping init container
    /// (empty matches any message)
    #[arg(
        long,
        env = "REPAIR_INIT_CONTAINER_TERMINATION_MESSAGE",
        default_value = ""
    )]
    pub init_container_termination_message: String,

    /// Expected exit code of the crash-looping init container (0 matches
    /// any code)
    #[arg(
        long,
        env = "REPAIR_INIT_CONTAINER_EXIT_CODE",
        default_value_t = VALIDATION_EXIT_CODE
    )]
    pub init_container_exit_code: i32,

    /// Label selectors in label=value format added to the pod list filters
    #[arg(long, env = "REPAIR_LABEL_SELECTORS", default_value = "")]
    pub label_selectors: String,

    /// Field selectors in field=value format added to the pod list filters
    #[arg(long, env = "REPAIR_FIELD_SELECTORS", default_value = "")]
    pub field_selectors: String,

    /// Whether the repair controller runs at all
    #[arg(
        long,
        env = "REPAIR_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enabled: bool,

    /// Delete broken pods
    #[arg(long, env = "REPAIR_DELETE_PODS")]
    pub delete_pods: bool,

    /// Label broken pods
    #[arg(long, env = "REPAIR_LABEL_PODS")]
    pub label_pods: bool,

    /// Run in a watch loop instead of one-shot (requires an external
    /// controller; not supported by this binary)
    #[arg(long, env = "REPAIR_RUN_AS_DAEMON")]
    pub run_as_daemon: bool,

    /// Key of the label applied when --label-pods is set
    #[arg(
        long,
        env = "REPAIR_BROKEN_POD_LABEL_KEY",
        default_value = "cni.istio.io/uninitialized"
    )]
    pub broken_pod_label_key: String,

    /// Value of the label applied when --label-pods is set
    #[arg(long, env = "REPAIR_BROKEN_POD_LABEL_VALUE", default_value = "true")]
    pub broken_pod_label_value: String,
}

impl RepairConfig {
    /// Resolve the filter criteria, folding a configured node name into the
    /// field selectors as `spec.nodeName=<value>`.
    pub fn filters(&self) -> FilterCriteria {
        let mut field_selectors = self.field_selectors.clone();
        if !self.node_name.is_empty() {
            field_selectors = if field_selectors.is_empty() {
                format!("spec.nodeName={}", self.node_name)
            } else {
                format!("spec.nodeName={},{}", self.node_name, field_selectors)
            };
        }

        FilterCriteria {
            sidecar_annotation: self.sidecar_annotation.clone(),
            init_container_name: self.init_container_name.clone(),
            init_container_termination_message: self.init_container_termination_message.clone(),
            init_container_exit_code: self.init_container_exit_code,
            label_selectors: self.label_selectors.clone(),
            field_selectors,
        }
    }

    pub fn options(&self) -> RemediationOptions {
        RemediationOptions {
            label_pods: self.label_pods,
            delete_pods: self.delete_pods,
            pod_label_key: self.broken_pod_label_key.clone(),
            pod_label_value: self.broken_pod_label_value.clone(),
        }
    }

    /// Log a human-readable description of the active filters and options.
    pub fn log_active_options(&self) {
        if self.run_as_daemon {
            info!("Controller option: running as a daemon");
        }
        if self.delete_pods {
            info!("Controller option: deleting broken pods; pod labeling deactivated");
        }
        if self.label_pods && !self.delete_pods {
            info!(
                "Controller option: labeling broken pods with label {}={}",
                self.broken_pod_label_key, self.broken_pod_label_value
            );
        }
        if !self.sidecar_annotation.is_empty() {
            info!(
                "Filter option: only managing pods with an annotation with key {}",
                self.sidecar_annotation
            );
        }
        if !self.node_name.is_empty() {
            info!("Filter option: only managing pods on node {}", self.node_name);
        }
        if !self.field_selectors.is_empty() {
            info!(
                "Filter option: only managing pods with field selector {}",
                self.field_selectors
            );
        }
        if !self.label_selectors.is_empty() {
            info!(
                "Filter option: only managing pods with label selector {}",
                self.label_selectors
            );
        }
        if !self.init_container_name.is_empty() {
            info!(
                "Filter option: only managing pods where init container is named {}",
                self.init_container_name
            );
        }
        if !self.init_container_termination_message.is_empty() {
            info!(
                "Filter option: only managing pods where init container termination message is {}",
                self.init_container_termination_message
            );
        }
        if self.init_container_exit_code != 0 {
            info!(
                "Filter option: only managing pods where init container exit status is {}",
                self.init_container_exit_code
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> RepairConfig {
        RepairConfig::parse_from(std::iter::once("cni-repair").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_validation_container_signature() {
        let c = config(&[]);
        let f = c.filters();
        assert_eq!(f.sidecar_annotation, "sidecar.istio.io/status");
        assert_eq!(f.init_container_name, "istio-validation");
        assert_eq!(f.init_container_exit_code, VALIDATION_EXIT_CODE);
        assert!(f.init_container_termination_message.is_empty());
        assert!(c.enabled);
        assert!(!c.delete_pods);
        assert!(!c.label_pods);
    }

    #[test]
    fn node_name_is_folded_into_field_selectors() {
        let c = config(&["--node-name", "worker-1"]);
        assert_eq!(c.filters().field_selectors, "spec.nodeName=worker-1");
    }

    #[test]
    fn node_name_is_prepended_to_existing_field_selectors() {
        let c = config(&[
            "--node-name",
            "worker-1",
            "--field-selectors",
            "status.phase=Pending",
        ]);
        assert_eq!(
            c.filters().field_selectors,
            "spec.nodeName=worker-1,status.phase=Pending"
        );
    }

    #[test]
    fn label_options_resolve_from_flags() {
        let c = config(&["--label-pods", "--broken-pod-label-key", "example.com/broken"]);
        let o = c.options();
        assert!(o.label_pods);
        assert!(!o.delete_pods);
        assert_eq!(o.pod_label_key, "example.com/broken");
        assert_eq!(o.pod_label_value, "true");
    }
}
