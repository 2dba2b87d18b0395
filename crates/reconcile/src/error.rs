//! Error types for the reconciliation core.
//!
//! Graph-level errors (`Cycle`) abort a run before any operation executes.
//! Resource-level errors (`Validation`, `Provider`, `Timeout`) are recorded
//! against the failing resource and cascade to its dependents as skips;
//! independent branches keep going.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by planning, execution, and state handling.
#[derive(Debug, Error)]
pub enum Error {
    /// The desired graph contains a dependency cycle. Fatal: nothing runs.
    #[error("dependency cycle: {0}")]
    Cycle(Cycle),

    /// A resource declaration is malformed (bad name, unknown dependency,
    /// missing provider, rejected by type-specific validation) or the
    /// desired graph asks for something contradictory (deleting a resource
    /// that surviving resources still reference).
    #[error("invalid declaration for '{name}': {reason}")]
    Validation { name: String, reason: String },

    /// The provider rejected a create/update/delete call.
    #[error("provider error for '{name}': {message}")]
    Provider { name: String, message: String },

    /// The operation ran past its deadline.
    #[error("operation for '{name}' timed out after {elapsed:.1?}")]
    Timeout { name: String, elapsed: Duration },

    /// Recorded state disagrees with the physical resource (drift) or the
    /// state blob itself is unusable. Surfaced, never auto-resolved.
    #[error("state conflict for '{name}': {detail}")]
    StateConflict { name: String, detail: String },

    /// Executor infrastructure failure (worker pool setup)
    #[error("executor error: {0}")]
    Executor(String),

    /// IO error while persisting or loading state
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State blob (de)serialization error
    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a resource-level validation error.
    pub fn validation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a provider rejection.
    pub fn provider(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a drift/state mismatch.
    pub fn state_conflict(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::StateConflict {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error aborts the whole run rather than one resource.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cycle(_) | Self::Executor(_) | Self::Io(_) | Self::Json(_)
        )
    }
}

/// A dependency cycle, listed in traversal order.
///
/// The display form closes the loop: `a -> b -> c -> a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle(pub Vec<String>);

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.0 {
            write!(f, "{name} -> ")?;
        }
        match self.0.first() {
            Some(first) => write!(f, "{first}"),
            None => write!(f, "(empty)"),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display_closes_the_loop() {
        let cycle = Cycle(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(cycle.to_string(), "a -> b -> c -> a");
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::Cycle(Cycle(vec!["a".into()])).is_fatal());
        assert!(!Error::validation("a", "bad").is_fatal());
        assert!(!Error::provider("a", "rejected").is_fatal());
    }
}
