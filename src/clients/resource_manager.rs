//! Cloud Resource Manager REST client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::auth::TokenProvider;
use super::{Ancestor, Organization, Policy, ResourceManager};

const BASE_URL: &str = "https://cloudresourcemanager.googleapis.com/v1";

/// Resource Manager collaborator backed by the v1 REST API.
pub struct CloudResourceManager {
    http_client: Client,
    token_provider: TokenProvider,
    base_url: String,
}

impl CloudResourceManager {
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
struct AncestryResponse {
    #[serde(default)]
    ancestor: Vec<AncestryEntry>,
}

#[derive(Debug, Deserialize)]
struct AncestryEntry {
    #[serde(rename = "resourceId")]
    resource_id: AncestryResourceId,
}

#[derive(Debug, Deserialize)]
struct AncestryResourceId {
    #[serde(rename = "type")]
    resource_type: String,
    id: String,
}

#[async_trait]
impl ResourceManager for CloudResourceManager {
    async fn organization(&self, name: &str) -> Result<Organization> {
        let token = self.token_provider.access_token().await?;
        let url = format!("{}/{}", self.base_url, name);
        debug!(organization = %name, "fetching organization");

        let resp = self
            .http_client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("failed to get organization")?;
        let resp = Self::check(resp, "organizations.get").await?;
        Ok(resp.json().await?)
    }

    async fn organization_policy(&self, name: &str) -> Result<Policy> {
        let token = self.token_provider.access_token().await?;
        let url = format!("{}/{}:getIamPolicy", self.base_url, name);

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("failed to get organization policy")?;
        let resp = Self::check(resp, "organizations.getIamPolicy").await?;
        Ok(resp.json().await?)
    }

    async fn set_organization_policy(&self, name: &str, policy: &Policy) -> Result<Policy> {
        let token = self.token_provider.access_token().await?;
        let url = format!("{}/{}:setIamPolicy", self.base_url, name);
        debug!(organization = %name, bindings = policy.bindings.len(), "submitting policy");

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "policy": policy }))
            .send()
            .await
            .context("failed to set organization policy")?;
        let resp = Self::check(resp, "organizations.setIamPolicy").await?;
        Ok(resp.json().await?)
    }

    async fn project_ancestry(&self, project_id: &str) -> Result<Vec<Ancestor>> {
        let token = self.token_provider.access_token().await?;
        let url = format!("{}/projects/{}:getAncestry", self.base_url, project_id);

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("failed to get project ancestry")?;
        let resp = Self::check(resp, "projects.getAncestry").await?;

        let ancestry: AncestryResponse = resp.json().await?;
        Ok(ancestry
            .ancestor
            .into_iter()
            .map(|a| Ancestor {
                resource_type: a.resource_id.resource_type,
                id: a.resource_id.id,
            })
            .collect())
    }
}
