//! Cloud Storage REST client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::auth::TokenProvider;
use super::{Policy, StorageControl};

const BASE_URL: &str = "https://storage.googleapis.com/storage/v1";

/// Storage collaborator backed by the JSON API.
pub struct CloudStorage {
    http_client: Client,
    token_provider: TokenProvider,
    base_url: String,
}

impl CloudStorage {
    pub fn new(http_client: Client, token_provider: TokenProvider) -> Self {
        Self {
            http_client,
            token_provider,
            base_url: BASE_URL.to_string(),
        }
    }

    fn bucket_iam_url(&self, bucket: &str) -> String {
        format!("{}/b/{}/iam", self.base_url, urlencoding::encode(bucket))
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

#[async_trait]
impl StorageControl for CloudStorage {
    async fn bucket_policy(&self, bucket: &str) -> Result<Policy> {
        let token = self.token_provider.access_token().await?;
        debug!(bucket = %bucket, "fetching bucket policy");

        let resp = self
            .http_client
            .get(self.bucket_iam_url(bucket))
            .bearer_auth(&token)
            .send()
            .await
            .context("failed to get bucket policy")?;
        let resp = Self::check(resp, "buckets.getIamPolicy").await?;
        Ok(resp.json().await?)
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: &Policy) -> Result<Policy> {
        let token = self.token_provider.access_token().await?;
        debug!(bucket = %bucket, bindings = policy.bindings.len(), "submitting bucket policy");

        let resp = self
            .http_client
            .put(self.bucket_iam_url(bucket))
            .bearer_auth(&token)
            .json(policy)
            .send()
            .await
            .context("failed to set bucket policy")?;
        let resp = Self::check(resp, "buckets.setIamPolicy").await?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_iam_url_encodes_name() {
        let storage = CloudStorage::new(Client::new(), TokenProvider::new(Client::new()));
        assert_eq!(
            storage.bucket_iam_url("open-data-bucket"),
            "https://storage.googleapis.com/storage/v1/b/open-data-bucket/iam"
        );
        assert_eq!(
            storage.bucket_iam_url("bucket with space"),
            "https://storage.googleapis.com/storage/v1/b/bucket%20with%20space/iam"
        );
    }
}
