//! Application Default Credentials token source.
//!
//! Tries the GCE metadata server first (Workload Identity in GKE, service
//! account on GCE), then falls back to the gcloud CLI for local development.
//! No key files on disk, no hardcoded credentials.

use anyhow::{Context, Result};
use reqwest::Client;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Fetches ADC access tokens for outbound API calls.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    http_client: Client,
}

impl TokenProvider {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    /// Get an access token for cloud API calls.
    pub async fn access_token(&self) -> Result<String> {
        match self
            .http_client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                let token_response: serde_json::Value = resp.json().await?;
                Ok(token_response["access_token"]
                    .as_str()
                    .context("invalid token response")?
                    .to_string())
            }
            _ => {
                // Fall back to gcloud CLI (local development)
                let output = tokio::process::Command::new("gcloud")
                    .args(["auth", "application-default", "print-access-token"])
                    .output()
                    .await
                    .context("gcloud CLI not available")?;

                if !output.status.success() {
                    anyhow::bail!(
                        "gcloud auth failed - run 'gcloud auth application-default login'"
                    );
                }

                Ok(String::from_utf8(output.stdout)?.trim().to_string())
            }
        }
    }
}
