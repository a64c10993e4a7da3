//! Broken pod detection
//!
//! A pod is "broken" when its sidecar-validation init container is
//! crash-looping because the network-namespace redirect was not installed
//! before the sidecar started. The failure signature lives in the init
//! container's *last* termination record: the current state may transiently
//! be "running" between restarts, while the last-terminated record reliably
//! captures the crash even mid-loop.

use k8s_openapi::api::core::v1::{ContainerStateTerminated, ContainerStatus, Pod};

/// Immutable matching rules for classifying a pod as broken.
///
/// All fields are AND-combined. An empty string (or a zero exit code) is a
/// wildcard that matches anything, never a "require empty" filter.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Annotation key marking pods expected to run a sidecar.
    /// Pods without this key are never in scope. Empty disables the gate.
    pub sidecar_annotation: String,
    /// Name of the init container to examine. Empty matches any container.
    pub init_container_name: String,
    /// Expected termination message, compared whitespace-trimmed.
    pub init_container_termination_message: String,
    /// Expected exit code. Zero matches any observed code.
    pub init_container_exit_code: i32,
    /// Server-side label selector applied when listing pods.
    pub label_selectors: String,
    /// Server-side field selector applied when listing pods.
    pub field_selectors: String,
}

/// Returns `true` if the pod matches the broken-pod filter criteria.
///
/// Pure and total over well-formed pods: no side effects, no state.
pub fn is_broken(pod: &Pod, filters: &FilterCriteria) -> bool {
    // Only check pods that carry the sidecar annotation; the rest can be
    // ignored outright.
    if !filters.sidecar_annotation.is_empty() {
        let annotated = pod
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(&filters.sidecar_annotation));
        if !annotated {
            return false;
        }
    }

    let Some(statuses) = pod
        .status
        .as_ref()
        .and_then(|s| s.init_container_statuses.as_ref())
    else {
        return false;
    };

    for container in statuses {
        if !filters.init_container_name.is_empty()
            && container.name != filters.init_container_name
        {
            continue;
        }

        // Check the container's *current* status first. A container that has
        // since exited cleanly must never be classified broken, even if it
        // crash-looped earlier.
        if exited_cleanly(container) {
            continue;
        }

        // The last termination record holds the reason the container last
        // exited; a crash-looping validation container populates it on every
        // restart.
        if let Some(state) = last_terminated(container) {
            if matches_termination_message(state, &filters.init_container_termination_message)
                && matches_exit_code(state, filters.init_container_exit_code)
            {
                return true;
            }
        }
    }
    false
}

fn exited_cleanly(container: &ContainerStatus) -> bool {
    container
        .state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .is_some_and(|t| t.reason.as_deref() == Some("Completed") || t.exit_code == 0)
}

fn last_terminated(container: &ContainerStatus) -> Option<&ContainerStateTerminated> {
    container
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
}

fn matches_termination_message(state: &ContainerStateTerminated, expected: &str) -> bool {
    let expected = expected.trim();
    expected.is_empty() || Some(expected) == state.message.as_deref().map(str::trim)
}

fn matches_exit_code(state: &ContainerStateTerminated, expected: i32) -> bool {
    expected == 0 || expected == state.exit_code
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerState, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    const SIDECAR_ANNOTATION: &str = "sidecar.istio.io/status";
    const VALIDATION_CONTAINER: &str = "istio-validation";

    fn filters() -> FilterCriteria {
        FilterCriteria {
            sidecar_annotation: SIDECAR_ANNOTATION.to_string(),
            init_container_name: VALIDATION_CONTAINER.to_string(),
            init_container_termination_message: String::new(),
            init_container_exit_code: 126,
            ..Default::default()
        }
    }

    fn terminated(exit_code: i32, reason: &str, message: &str) -> ContainerState {
        ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code,
                reason: (!reason.is_empty()).then(|| reason.to_string()),
                message: (!message.is_empty()).then(|| message.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn init_status(
        name: &str,
        state: Option<ContainerState>,
        last_state: Option<ContainerState>,
    ) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            state,
            last_state,
            ..Default::default()
        }
    }

    fn pod(annotations: &[(&str, &str)], statuses: Vec<ContainerStatus>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("test-pod".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            status: Some(PodStatus {
                init_container_statuses: Some(statuses),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Crash-looping validation container with a matching exit code and
    /// message is detected as broken.
    #[test]
    fn detects_crash_looping_validation_container() {
        let mut f = filters();
        f.init_container_termination_message = "driver not ready".to_string();
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                VALIDATION_CONTAINER,
                None,
                Some(terminated(126, "Error", "driver not ready")),
            )],
        );
        assert!(is_broken(&p, &f));
    }

    #[test]
    fn ignores_pod_without_sidecar_annotation() {
        let p = pod(
            &[("some.other/annotation", "x")],
            vec![init_status(
                VALIDATION_CONTAINER,
                None,
                Some(terminated(126, "Error", "")),
            )],
        );
        assert!(!is_broken(&p, &filters()));
    }

    /// A container whose current state shows a clean exit is never broken,
    /// even if its last termination record would otherwise match.
    #[test]
    fn clean_current_exit_is_never_broken() {
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                VALIDATION_CONTAINER,
                Some(terminated(0, "", "")),
                Some(terminated(126, "Error", "driver not ready")),
            )],
        );
        assert!(!is_broken(&p, &filters()));
    }

    #[test]
    fn completed_reason_is_never_broken() {
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                VALIDATION_CONTAINER,
                Some(terminated(126, "Completed", "")),
                Some(terminated(126, "Error", "")),
            )],
        );
        assert!(!is_broken(&p, &filters()));
    }

    #[test]
    fn name_filter_skips_other_containers() {
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                "istio-init",
                None,
                Some(terminated(126, "Error", "")),
            )],
        );
        assert!(!is_broken(&p, &filters()));
    }

    #[test]
    fn empty_name_filter_matches_any_container() {
        let mut f = filters();
        f.init_container_name = String::new();
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![
                init_status("istio-init", None, None),
                init_status("whatever", None, Some(terminated(126, "Error", ""))),
            ],
        );
        assert!(is_broken(&p, &f));
    }

    #[test]
    fn termination_message_match_trims_whitespace() {
        let mut f = filters();
        f.init_container_termination_message = "foo".to_string();
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                VALIDATION_CONTAINER,
                None,
                Some(terminated(126, "Error", " foo ")),
            )],
        );
        assert!(is_broken(&p, &f));
    }

    #[test]
    fn termination_message_mismatch_is_not_broken() {
        let mut f = filters();
        f.init_container_termination_message = "foo".to_string();
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                VALIDATION_CONTAINER,
                None,
                Some(terminated(126, "Error", "bar")),
            )],
        );
        assert!(!is_broken(&p, &f));
    }

    #[test]
    fn zero_exit_code_filter_matches_any_code() {
        let mut f = filters();
        f.init_container_exit_code = 0;
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                VALIDATION_CONTAINER,
                None,
                Some(terminated(55, "Error", "")),
            )],
        );
        assert!(is_broken(&p, &f));
    }

    #[test]
    fn nonzero_exit_code_filter_requires_exact_match() {
        let p = pod(
            &[(SIDECAR_ANNOTATION, "injected")],
            vec![init_status(
                VALIDATION_CONTAINER,
                None,
                Some(terminated(125, "Error", "")),
            )],
        );
        assert!(!is_broken(&p, &filters()));
    }

    #[test]
    fn pod_without_init_statuses_is_not_broken() {
        let p = pod(&[(SIDECAR_ANNOTATION, "injected")], vec![]);
        assert!(!is_broken(&p, &filters()));
    }
}
