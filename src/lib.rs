//! Remediation Engine Library
//!
//! Automated response to classified cloud security findings. Each finding
//! is parsed into a typed request, gated on per-rule configuration and
//! resource scope, and applied as the minimal idempotent mutation through
//! collaborator seams.

pub mod clients;
pub mod config;
pub mod error;
pub mod finding;
pub mod remediation;
pub mod scope;

pub use clients::Services;
pub use config::Configuration;
pub use error::{EngineError, Result};
pub use finding::RemediationRequest;
pub use remediation::{remediate, Deadline, RemediationOutcome};
