//! Detection and remediation of pods broken by the CNI race condition
//!
//! When a pod is scheduled before the CNI plugin has installed its
//! network-namespace redirect, the sidecar-validation init container
//! crash-loops and the pod never becomes ready. This crate classifies such
//! pods from their init container termination history and remediates them
//! by labeling or deleting the pod so its controller recreates it.
//!
//! The watch loop that would feed pods in daemon mode lives outside this
//! crate; every operation here is a function of the pod snapshots handed to
//! it, with no state carried between invocations.

pub mod config;
pub mod detect;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod store;

pub use config::RepairConfig;
pub use detect::{is_broken, FilterCriteria};
pub use error::{Error, Result};
pub use metrics::{Metrics, RepairResult, RepairType};
pub use reconciler::{BrokenPodReconciler, RemediationOptions};
pub use store::{KubePodStore, PodStore};
