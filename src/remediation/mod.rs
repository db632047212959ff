//! Remediation dispatcher.
//!
//! Routes a parsed finding to its rule, enforces the invocation deadline on
//! every outbound collaborator call, and reports a single outcome. Nothing
//! is applied speculatively: parse, gate, and scope checks all pass before
//! the first mutation call is issued.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::info;
use uuid::Uuid;

pub mod close_bucket;
pub mod revoke_grants;
pub mod snapshot_disk;

use crate::clients::Services;
use crate::config::Configuration;
use crate::error::{EngineError, Result};
use crate::finding::{self, RemediationRequest};

/// Absolute point in time after which no further collaborator call may start.
///
/// Supplied by the invoking environment and propagated to every outbound
/// call. Policy mutations are single atomic fetch-then-submit calls, so an
/// expired deadline leaves a policy entirely unedited or entirely updated,
/// never partially edited.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

/// Run one collaborator call under the invocation deadline, wrapping any
/// failure with the operation name and target identifier.
pub(crate) async fn with_deadline<T, F>(
    deadline: Deadline,
    operation: &'static str,
    target: &str,
    call: F,
) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let remaining = deadline.remaining();
    if remaining.is_zero() {
        return Err(EngineError::Deadline {
            operation,
            target: target.to_string(),
        });
    }
    match tokio::time::timeout(remaining, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(EngineError::collaborator(operation, target, err)),
        Err(_) => Err(EngineError::Deadline {
            operation,
            target: target.to_string(),
        }),
    }
}

/// Why an invocation finished without mutating anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The rule is disabled in configuration.
    RuleDisabled(&'static str),
    /// The target resource's ancestry is outside the allowed folder set.
    OutOfScope { project_id: String },
}

/// The terminal state of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    RevokedMembers {
        organization: String,
        members: Vec<String>,
    },
    BucketClosed {
        bucket: String,
        removed: Vec<String>,
    },
    SnapshotsCreated {
        instance: String,
        created: Vec<String>,
        fresh: usize,
    },
    Skipped(SkipReason),
}

impl RemediationOutcome {
    /// One human-readable line describing what happened.
    pub fn summary(&self) -> String {
        match self {
            RemediationOutcome::RevokedMembers {
                organization,
                members,
            } if members.is_empty() => {
                format!("no external members to remove from {organization}")
            }
            RemediationOutcome::RevokedMembers {
                organization,
                members,
            } => format!(
                "removed {} external member(s) from {organization}: {}",
                members.len(),
                members.join(", ")
            ),
            RemediationOutcome::BucketClosed { bucket, removed } if removed.is_empty() => {
                format!("bucket {bucket} has no public access to remove")
            }
            RemediationOutcome::BucketClosed { bucket, removed } => format!(
                "removed public access from bucket {bucket}: {}",
                removed.join(", ")
            ),
            RemediationOutcome::SnapshotsCreated {
                instance,
                created,
                fresh,
            } if created.is_empty() => {
                format!("all {fresh} disk(s) of {instance} have fresh snapshots")
            }
            RemediationOutcome::SnapshotsCreated {
                instance,
                created,
                fresh,
            } => format!(
                "created {} snapshot(s) for {instance} ({fresh} disk(s) already fresh): {}",
                created.len(),
                created.join(", ")
            ),
            RemediationOutcome::Skipped(SkipReason::RuleDisabled(rule)) => {
                format!("rule {rule} is disabled; no action taken")
            }
            RemediationOutcome::Skipped(SkipReason::OutOfScope { project_id }) => {
                format!("project {project_id} is outside the allowed folders; no action taken")
            }
        }
    }
}

/// Process one raw finding payload end to end.
pub async fn remediate(
    payload: &[u8],
    config: &Configuration,
    services: &Services,
    deadline: Deadline,
) -> Result<RemediationOutcome> {
    let request = finding::parse(payload)?;
    let invocation = Uuid::new_v4();
    info!(
        invocation = %invocation,
        category = request.category(),
        "processing finding"
    );

    let outcome = match &request {
        RemediationRequest::RevokeGrants(req) => {
            revoke_grants::execute(req, &config.revoke_grants, services, deadline).await?
        }
        RemediationRequest::CloseBucket(req) => {
            close_bucket::execute(req, &config.close_bucket, services, deadline).await?
        }
        RemediationRequest::SnapshotDisk(req) => {
            snapshot_disk::execute(req, &config.snapshot_disk, services, deadline).await?
        }
    };

    info!(invocation = %invocation, "{}", outcome.summary());
    Ok(outcome)
}
