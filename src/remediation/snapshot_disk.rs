//! Forensic disk snapshot creation.
//!
//! Reacts to suspicious network activity on an instance: for every attached
//! disk, checks whether a recent enough snapshot already exists and creates
//! one where it does not. Disks are evaluated independently and failures are
//! collected, never short-circuited: one disk's failure must not prevent
//! preserving evidence from the rest.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::{with_deadline, Deadline, RemediationOutcome, SkipReason};
use crate::clients::{ComputeHost, Services, Snapshot};
use crate::config::SnapshotDiskConfig;
use crate::error::{EngineError, Result};
use crate::finding::SnapshotDiskRequest;

/// Snapshots created by this rule carry this prefix.
const SNAPSHOT_PREFIX: &str = "forensic";

/// Upper bound on concurrent per-disk snapshot operations.
const SNAPSHOT_CONCURRENCY: usize = 4;

/// Apply the rule to one finding.
pub async fn execute(
    req: &SnapshotDiskRequest,
    conf: &SnapshotDiskConfig,
    services: &Services,
    deadline: Deadline,
) -> Result<RemediationOutcome> {
    if !conf.enabled {
        info!("snapshot creation is disabled; check configuration");
        return Ok(RemediationOutcome::Skipped(SkipReason::RuleDisabled(
            "snapshot_disk",
        )));
    }

    let disks = with_deadline(
        deadline,
        "listDisks",
        &req.instance,
        services
            .host
            .list_disks(&req.project_id, &req.zone, &req.instance),
    )
    .await?;

    let attempted = disks.len();
    let now = Utc::now();
    let freshness = conf.freshness;

    let mut reports: Vec<DiskReport> = stream::iter(disks.into_iter().map(|disk| {
        let host = Arc::clone(&services.host);
        let project = req.project_id.clone();
        let zone = req.zone.clone();
        async move {
            evaluate_disk(
                host.as_ref(),
                &project,
                &zone,
                &disk.name,
                freshness,
                now,
                deadline,
            )
            .await
        }
    }))
    .buffer_unordered(SNAPSHOT_CONCURRENCY)
    .collect()
    .await;

    // Completion order depends on scheduling; report deterministically.
    reports.sort_by(|a, b| a.disk.cmp(&b.disk));

    let mut created = Vec::new();
    let mut fresh = 0;
    let mut failures = Vec::new();
    for report in reports {
        match report.action {
            DiskAction::Created(name) => created.push(name),
            DiskAction::Fresh => fresh += 1,
            DiskAction::Failed(err) => {
                warn!(disk = %report.disk, "snapshot operation failed: {err}");
                failures.push(err);
            }
        }
    }

    if !failures.is_empty() {
        if !created.is_empty() {
            info!(
                instance = %req.instance,
                "created {} snapshot(s) before failure: {}",
                created.len(),
                created.join(", ")
            );
        }
        return Err(EngineError::Partial {
            attempted,
            failures,
        });
    }

    Ok(RemediationOutcome::SnapshotsCreated {
        instance: req.instance.clone(),
        created,
        fresh,
    })
}

struct DiskReport {
    disk: String,
    action: DiskAction,
}

enum DiskAction {
    Created(String),
    Fresh,
    Failed(EngineError),
}

async fn evaluate_disk(
    host: &dyn ComputeHost,
    project: &str,
    zone: &str,
    disk: &str,
    freshness: Duration,
    now: DateTime<Utc>,
    deadline: Deadline,
) -> DiskReport {
    let action = snapshot_if_stale(host, project, zone, disk, freshness, now, deadline).await;
    DiskReport {
        disk: disk.to_string(),
        action: match action {
            Ok(action) => action,
            Err(err) => DiskAction::Failed(err),
        },
    }
}

async fn snapshot_if_stale(
    host: &dyn ComputeHost,
    project: &str,
    zone: &str,
    disk: &str,
    freshness: Duration,
    now: DateTime<Utc>,
    deadline: Deadline,
) -> Result<DiskAction> {
    let snapshots = with_deadline(
        deadline,
        "listSnapshots",
        disk,
        host.list_snapshots(project, zone, disk),
    )
    .await?;

    if !needs_snapshot(&snapshots, freshness, now) {
        return Ok(DiskAction::Fresh);
    }

    let name = snapshot_name(disk, now);
    with_deadline(
        deadline,
        "createSnapshot",
        disk,
        host.create_snapshot(project, zone, disk, &name),
    )
    .await?;
    Ok(DiskAction::Created(name))
}

/// Whether the disk's most recent snapshot is missing or older than the
/// freshness threshold. Snapshots with unparseable timestamps are ignored,
/// so a disk whose history cannot be read gets a new snapshot.
pub fn needs_snapshot(snapshots: &[Snapshot], freshness: Duration, now: DateTime<Utc>) -> bool {
    let latest = snapshots
        .iter()
        .filter_map(|s| DateTime::parse_from_rfc3339(&s.creation_timestamp).ok())
        .map(|t| t.with_timezone(&Utc))
        .max();
    match latest {
        Some(created) => now.signed_duration_since(created) > freshness,
        None => true,
    }
}

/// Deterministic snapshot name: prefix, disk, creation time.
pub fn snapshot_name(disk: &str, at: DateTime<Utc>) -> String {
    format!("{SNAPSHOT_PREFIX}-{disk}-{}", at.format("%Y%m%d-%H%M%S"))
}
