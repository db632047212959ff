//! Resource hierarchy scope checks.
//!
//! A rule only mutates resources whose ancestry intersects the deployment's
//! allowed folder set. Scoping lets one deployment act on a "production"
//! folder while leaving a "development" folder untouched. Being out of scope
//! is a normal terminal state, not an error.

use anyhow::Result;

use crate::clients::ResourceManager;

/// Whether any of the project's ancestor folders is in the allowed set.
///
/// The decision is computed from canonical ancestry resolved through the
/// Resource collaborator, never from string containment on a resource path.
pub async fn project_in_scope(
    resource: &dyn ResourceManager,
    project_id: &str,
    folder_ids: &[String],
) -> Result<bool> {
    let ancestry = resource.project_ancestry(project_id).await?;
    Ok(ancestry
        .iter()
        .filter(|a| a.resource_type == "folder")
        .any(|a| folder_ids.iter().any(|id| id == &a.id)))
}
