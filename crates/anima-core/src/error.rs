//! Core Error Types
//!
//! One taxonomy for the whole runtime:
//! - Validation: bad input, no state change
//! - Capacity: queue or concurrency exhausted, caller may retry
//! - Execution: a task closure failed (recorded, never propagates out of the stepper)
//! - Integrity: identity mismatch or sealed-core tampering
//! - Lockdown: the safety envelope refused the operation
//! - External/Persistence: collaborator or snapshot-store failures

use thiserror::Error;

/// Core error type
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid input (e.g. unknown hormone type, malformed config path)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A bounded resource is exhausted; retry later
    #[error("Capacity exhausted: {0}")]
    Capacity(String),

    /// A task closure failed during execution
    #[error("Execution error: {0}")]
    Execution(String),

    /// Identity or sealed-core integrity violation
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// The safety envelope is in lockdown or refused the operation
    #[error("Lockdown: {0}")]
    Lockdown(String),

    /// An external collaborator failed; caller retries with backoff
    #[error("External error: {0}")]
    External(String),

    /// Snapshot store failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Snapshot schema version does not match this build
    #[error("Snapshot schema mismatch for root '{root}': found v{found}, expected v{expected}")]
    SchemaMismatch {
        /// Snapshot root name
        root: String,
        /// Version found on disk
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Core result type
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Capacity(_) | CoreError::External(_))
    }

    /// Short stable code for event payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::Capacity(_) => "capacity",
            CoreError::Execution(_) => "execution",
            CoreError::Integrity(_) => "integrity",
            CoreError::Lockdown(_) => "lockdown",
            CoreError::External(_) => "external",
            CoreError::Persistence(_) => "persistence",
            CoreError::SchemaMismatch { .. } => "schema-mismatch",
            CoreError::Io(_) => "io",
            CoreError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::Capacity("queue full".into()).is_retryable());
        assert!(CoreError::External("storage unreachable".into()).is_retryable());
        assert!(!CoreError::Validation("bad hormone".into()).is_retryable());
        assert!(!CoreError::Lockdown("sealed".into()).is_retryable());
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(CoreError::Validation(String::new()).code(), "validation");
        assert_eq!(
            CoreError::SchemaMismatch {
                root: "hormones".into(),
                found: 1,
                expected: 2
            }
            .code(),
            "schema-mismatch"
        );
    }
}
