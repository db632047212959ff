//! Per-rule configuration.
//!
//! Configuration is built once per invocation from environment variables and
//! passed explicitly into every handler; nothing reads an ambient global
//! mid-computation. List-valued settings arrive as comma-delimited strings
//! and are split into ordered sequences up front.
//!
//! A disabled rule is a deliberate no-op. An enabled rule with a required
//! setting missing is a fatal configuration error, raised before any
//! collaborator is invoked.

use std::env;

use chrono::Duration;

use crate::error::{EngineError, Result};

/// Default maximum age of an existing snapshot before a new one is taken.
/// Overridable via `SNAPSHOT_FRESHNESS_HOURS`; flagged for stakeholder
/// confirmation rather than assumed immutable.
pub const DEFAULT_SNAPSHOT_FRESHNESS_HOURS: i64 = 12;

/// Settings for the external IAM grant revocation rule.
#[derive(Debug, Clone, Default)]
pub struct RevokeGrantsConfig {
    pub enabled: bool,
    /// Domain substrings whose members are never auto-revoked.
    pub allowed_domains: Vec<String>,
    /// Folder IDs inside which remediation is permitted.
    pub folder_ids: Vec<String>,
    /// Keep a binding whose members were all removed, rather than deleting it.
    pub retain_empty_bindings: bool,
}

impl RevokeGrantsConfig {
    /// Fail fast if an enabled rule is missing a required setting.
    pub fn require(&self) -> Result<()> {
        if self.folder_ids.is_empty() {
            return Err(EngineError::Config {
                rule: "revoke_grants",
                missing: "folder_ids",
            });
        }
        if self.allowed_domains.is_empty() {
            return Err(EngineError::Config {
                rule: "revoke_grants",
                missing: "allowed_domains",
            });
        }
        Ok(())
    }
}

/// Settings for the public bucket access removal rule.
#[derive(Debug, Clone, Default)]
pub struct CloseBucketConfig {
    pub enabled: bool,
    pub folder_ids: Vec<String>,
    pub retain_empty_bindings: bool,
}

impl CloseBucketConfig {
    pub fn require(&self) -> Result<()> {
        if self.folder_ids.is_empty() {
            return Err(EngineError::Config {
                rule: "close_bucket",
                missing: "folder_ids",
            });
        }
        Ok(())
    }
}

/// Settings for the disk snapshot rule.
#[derive(Debug, Clone)]
pub struct SnapshotDiskConfig {
    pub enabled: bool,
    /// Maximum acceptable age of the most recent snapshot.
    pub freshness: Duration,
}

impl Default for SnapshotDiskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            freshness: Duration::hours(DEFAULT_SNAPSHOT_FRESHNESS_HOURS),
        }
    }
}

/// Process-wide configuration, one instance per invocation.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub revoke_grants: RevokeGrantsConfig,
    pub close_bucket: CloseBucketConfig,
    pub snapshot_disk: SnapshotDiskConfig,
}

impl Configuration {
    /// Build configuration from the process environment.
    ///
    /// Missing variables become empty lists or disabled flags here; whether
    /// that is fatal is decided per rule by `require` once the rule is known
    /// to be enabled.
    pub fn from_env() -> Self {
        let folder_ids = split_list(&env_string("FOLDER_IDS"));
        let retain_empty_bindings = env_flag_or("RETAIN_EMPTY_BINDINGS", true);

        let freshness_hours = env::var("SNAPSHOT_FRESHNESS_HOURS")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(DEFAULT_SNAPSHOT_FRESHNESS_HOURS);

        Self {
            revoke_grants: RevokeGrantsConfig {
                enabled: env_flag_or("REVOKE_GRANTS_ENABLED", false),
                allowed_domains: split_list(&env_string("ALLOWED_DOMAINS")),
                folder_ids: folder_ids.clone(),
                retain_empty_bindings,
            },
            close_bucket: CloseBucketConfig {
                enabled: env_flag_or("CLOSE_BUCKET_ENABLED", false),
                folder_ids,
                retain_empty_bindings,
            },
            snapshot_disk: SnapshotDiskConfig {
                enabled: env_flag_or("SNAPSHOT_DISK_ENABLED", false),
                freshness: Duration::hours(freshness_hours),
            },
        }
    }
}

fn env_string(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

fn env_flag_or(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

/// Split a comma-delimited list into an ordered sequence, trimming
/// whitespace and dropping empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
