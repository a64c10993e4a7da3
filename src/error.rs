//! Central error types for the repair controller
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Central error type for the repair controller
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single remediation action failed for one pod
    #[error("failed to {action} pod {namespace}/{name}: {source}")]
    Repair {
        action: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// One or more per-pod failures collected by a bulk operation.
    /// The list is kept intact so callers can inspect each constituent
    /// failure rather than parsing a concatenated message.
    #[error("{} remediation error(s): {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<Error>),
}

/// Result type alias for repair operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Fold a list of per-pod errors into one combined error.
    /// Returns `Ok(())` exactly when the list is empty.
    pub fn from_failures(errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }
}
