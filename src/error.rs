//! Engine error taxonomy.
//!
//! Every failure the engine can surface carries an explicit kind plus the
//! context (operation, target) the delivery layer needs to branch on without
//! parsing message text. Deliberate no-ops (disabled rule, out-of-scope
//! resource) are not errors; they are successful outcomes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by a remediation invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The raw payload could not be decoded into the expected schema.
    #[error("finding payload could not be decoded: {0}")]
    Unmarshal(String),

    /// The finding decoded, but a required identifier was empty or absent.
    #[error("finding is missing a required value: {0}")]
    ValueNotFound(&'static str),

    /// The finding names a category no rule handles.
    #[error("unsupported finding category: {0}")]
    UnsupportedCategory(String),

    /// A rule is enabled but a required setting is absent.
    #[error("rule {rule} is enabled but required setting {missing} is not configured")]
    Config {
        rule: &'static str,
        missing: &'static str,
    },

    /// An outbound call to an external system failed.
    #[error("{operation} failed for {target}: {message}")]
    Collaborator {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// The invocation deadline expired during an outbound call.
    #[error("deadline expired during {operation} for {target}")]
    Deadline {
        operation: &'static str,
        target: String,
    },

    /// Some independent sub-operations failed while others succeeded.
    /// All were attempted; successes are not rolled back.
    #[error("{} of {attempted} snapshot operations failed", .failures.len())]
    Partial {
        attempted: usize,
        failures: Vec<EngineError>,
    },
}

impl EngineError {
    /// Wrap a collaborator failure with the operation and target it occurred on.
    pub fn collaborator(
        operation: &'static str,
        target: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        EngineError::Collaborator {
            operation,
            target: target.into(),
            message: err.to_string(),
        }
    }

    /// Whether redelivering the triggering message can succeed.
    ///
    /// Parse and configuration failures are deterministic: the same payload
    /// and settings will fail the same way, so redelivery is pointless.
    /// Collaborator, deadline, and partial failures are transient and the
    /// engine's operations are safely repeatable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Collaborator { .. }
                | EngineError::Deadline { .. }
                | EngineError::Partial { .. }
        )
    }
}
