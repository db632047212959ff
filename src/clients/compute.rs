//! Compute Engine REST client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::auth::TokenProvider;
use super::{ComputeHost, Disk, Snapshot};

const BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Compute collaborator backed by the v1 REST API.
pub struct ComputeEngine {
    http_client: Client,
    token_provider: TokenProvider,
    base_url: String,
}

impl ComputeEngine {
    pub fn new(http_client: Client, token_provider: TokenProvider) -> Self {
        Self {
            http_client,
            token_provider,
            base_url: BASE_URL.to_string(),
        }
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{what} returned {status}: {body}");
        }
        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
struct InstanceResponse {
    #[serde(default)]
    disks: Vec<AttachedDisk>,
}

#[derive(Debug, Deserialize)]
struct AttachedDisk {
    #[serde(default)]
    source: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotList {
    #[serde(default)]
    items: Vec<SnapshotItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotItem {
    name: String,
    #[serde(default)]
    creation_timestamp: String,
    #[serde(default)]
    source_disk: String,
}

#[async_trait]
impl ComputeHost for ComputeEngine {
    async fn list_disks(&self, project: &str, zone: &str, instance: &str) -> Result<Vec<Disk>> {
        let token = self.token_provider.access_token().await?;
        let url = format!(
            "{}/projects/{}/zones/{}/instances/{}",
            self.base_url, project, zone, instance
        );
        debug!(instance = %instance, zone = %zone, "listing attached disks");

        let resp = self
            .http_client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("failed to get instance")?;
        let resp = Self::check(resp, "instances.get").await?;

        let instance: InstanceResponse = resp.json().await?;
        Ok(instance
            .disks
            .into_iter()
            .filter_map(|d| {
                d.source
                    .rsplit('/')
                    .next()
                    .filter(|n| !n.is_empty())
                    .map(|name| Disk {
                        name: name.to_string(),
                    })
            })
            .collect())
    }

    async fn list_snapshots(&self, project: &str, zone: &str, disk: &str) -> Result<Vec<Snapshot>> {
        let token = self.token_provider.access_token().await?;
        let url = format!("{}/projects/{}/global/snapshots", self.base_url, project);

        let resp = self
            .http_client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("failed to list snapshots")?;
        let resp = Self::check(resp, "snapshots.list").await?;

        // The list endpoint is project-global; keep only snapshots of this disk.
        let suffix = format!("zones/{zone}/disks/{disk}");
        let list: SnapshotList = resp.json().await?;
        Ok(list
            .items
            .into_iter()
            .filter(|s| s.source_disk.ends_with(&suffix))
            .map(|s| Snapshot {
                name: s.name,
                creation_timestamp: s.creation_timestamp,
            })
            .collect())
    }

    async fn create_snapshot(
        &self,
        project: &str,
        zone: &str,
        disk: &str,
        snapshot_name: &str,
    ) -> Result<()> {
        let token = self.token_provider.access_token().await?;
        let url = format!(
            "{}/projects/{}/zones/{}/disks/{}/createSnapshot",
            self.base_url, project, zone, disk
        );
        debug!(disk = %disk, snapshot = %snapshot_name, "creating snapshot");

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "name": snapshot_name }))
            .send()
            .await
            .context("failed to create snapshot")?;
        Self::check(resp, "disks.createSnapshot").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_disks_shape() {
        let raw = serde_json::json!({
            "disks": [
                {"source": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/disks/bastion-1"},
                {"source": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/disks/bastion-1-data"}
            ]
        });
        let parsed: InstanceResponse = serde_json::from_value(raw).unwrap();
        let names: Vec<&str> = parsed
            .disks
            .iter()
            .filter_map(|d| d.source.rsplit('/').next())
            .collect();
        assert_eq!(names, vec!["bastion-1", "bastion-1-data"]);
    }

    #[test]
    fn test_snapshot_list_shape() {
        let raw = serde_json::json!({
            "items": [
                {"name": "forensic-bastion-1-20250101",
                 "creationTimestamp": "2025-01-01T10:00:00.000-08:00",
                 "sourceDisk": "projects/p/zones/us-central1-a/disks/bastion-1"}
            ]
        });
        let parsed: SnapshotList = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert!(parsed.items[0]
            .source_disk
            .ends_with("zones/us-central1-a/disks/bastion-1"));
    }
}
