//! Collaborator contracts and shared wire types.
//!
//! The engine never talks to a cloud API directly; every outbound call goes
//! through one of the trait seams below. Production implementations are thin
//! REST clients authenticated via Application Default Credentials; tests use
//! in-memory fakes. Handles are read-only after construction and safe to
//! reuse across warm invocations.

pub mod auth;
pub mod compute;
pub mod resource_manager;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use auth::TokenProvider;
pub use compute::ComputeEngine;
pub use resource_manager::CloudResourceManager;
pub use storage::CloudStorage;

/// An IAM policy snapshot. Treated as a value: a new policy is derived and
/// submitted, the fetched one is never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// A role-to-principals mapping within an IAM policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    /// Conditional binding expression, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

impl Policy {
    /// Derive a new policy with the given members removed from every binding.
    ///
    /// Role and condition structure are preserved. Members never appear in
    /// the output that were not in the input, so a binding can only shrink.
    /// A binding emptied of all members is retained or dropped according to
    /// `retain_empty_bindings`.
    pub fn without_members(&self, members: &[String], retain_empty_bindings: bool) -> Policy {
        let bindings = self
            .bindings
            .iter()
            .map(|binding| Binding {
                role: binding.role.clone(),
                members: binding
                    .members
                    .iter()
                    .filter(|m| !members.contains(*m))
                    .cloned()
                    .collect(),
                condition: binding.condition.clone(),
            })
            .filter(|binding| retain_empty_bindings || !binding.members.is_empty())
            .collect();
        Policy {
            bindings,
            etag: self.etag.clone(),
        }
    }
}

/// An organization resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    /// Canonical name, e.g. `organizations/1050000000008`.
    pub name: String,
    /// Display name, which for an organization is its primary domain.
    pub display_name: String,
}

/// One step in a project's resource ancestry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    /// `project`, `folder`, or `organization`.
    pub resource_type: String,
    pub id: String,
}

/// A disk attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub name: String,
}

/// An existing disk snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub name: String,
    /// RFC 3339 creation timestamp as reported by the API.
    pub creation_timestamp: String,
}

/// Resource Manager operations the engine consumes.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn organization(&self, name: &str) -> Result<Organization>;
    async fn organization_policy(&self, name: &str) -> Result<Policy>;
    async fn set_organization_policy(&self, name: &str, policy: &Policy) -> Result<Policy>;
    /// Canonical ancestry of a project, nearest first (project, folders,
    /// organization).
    async fn project_ancestry(&self, project_id: &str) -> Result<Vec<Ancestor>>;
}

/// Compute operations the engine consumes.
#[async_trait]
pub trait ComputeHost: Send + Sync {
    async fn list_disks(&self, project: &str, zone: &str, instance: &str) -> Result<Vec<Disk>>;
    async fn list_snapshots(&self, project: &str, zone: &str, disk: &str) -> Result<Vec<Snapshot>>;
    async fn create_snapshot(
        &self,
        project: &str,
        zone: &str,
        disk: &str,
        snapshot_name: &str,
    ) -> Result<()>;
}

/// Storage operations the engine consumes.
#[async_trait]
pub trait StorageControl: Send + Sync {
    async fn bucket_policy(&self, bucket: &str) -> Result<Policy>;
    async fn set_bucket_policy(&self, bucket: &str, policy: &Policy) -> Result<Policy>;
}

/// Lazily initialized, read-only collaborator handles shared by every
/// invocation in a warm process.
#[derive(Clone)]
pub struct Services {
    pub resource: Arc<dyn ResourceManager>,
    pub host: Arc<dyn ComputeHost>,
    pub storage: Arc<dyn StorageControl>,
}

impl Services {
    pub fn new(
        resource: Arc<dyn ResourceManager>,
        host: Arc<dyn ComputeHost>,
        storage: Arc<dyn StorageControl>,
    ) -> Self {
        Self {
            resource,
            host,
            storage,
        }
    }
}
