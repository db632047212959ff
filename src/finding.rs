//! Finding payload parsing.
//!
//! Deserializes a raw notification payload into a typed, rule-specific
//! request. Dispatch is a closed enum matched exhaustively: adding a
//! category without wiring its decoder is a compile-time gap, not a silent
//! runtime fallthrough. Parsing is a pure function of the payload with no
//! side effects, so a failed parse is always safe to redeliver.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::{EngineError, Result};

/// A typed request for one remediation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationRequest {
    RevokeGrants(RevokeGrantsRequest),
    CloseBucket(CloseBucketRequest),
    SnapshotDisk(SnapshotDiskRequest),
}

impl RemediationRequest {
    /// The finding category this request was decoded from.
    pub fn category(&self) -> &'static str {
        match self {
            RemediationRequest::RevokeGrants(_) => "NON_ORG_IAM_MEMBER",
            RemediationRequest::CloseBucket(_) => "PUBLIC_BUCKET_ACL",
            RemediationRequest::SnapshotDisk(_) => "BAD_IP",
        }
    }
}

/// Required values for external IAM grant revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeGrantsRequest {
    /// Canonical organization name, e.g. `organizations/1050000000008`.
    pub organization: String,
    /// Project the anomalous grant was observed on, used for scoping.
    pub project_id: String,
}

/// Required values for public bucket access removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseBucketRequest {
    pub project_id: String,
    pub bucket: String,
}

/// Required values for disk snapshot creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDiskRequest {
    pub project_id: String,
    pub zone: String,
    pub instance: String,
}

// Raw notification shapes. Only the fields the decoders read are modeled;
// everything else in the payload is ignored.

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    finding: Option<RawFinding>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    category: Option<String>,
    parent: Option<String>,
    resource_name: Option<String>,
    #[serde(default)]
    source_properties: RawProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProperties {
    project_id: Option<String>,
}

/// Deserialize a raw finding payload into a rule-specific request.
pub fn parse(payload: &[u8]) -> Result<RemediationRequest> {
    let envelope: RawEnvelope =
        serde_json::from_slice(payload).map_err(|e| EngineError::Unmarshal(e.to_string()))?;
    let finding = envelope
        .finding
        .ok_or(EngineError::ValueNotFound("finding"))?;
    let category = finding
        .category
        .as_deref()
        .ok_or(EngineError::ValueNotFound("category"))?;

    match category {
        "NON_ORG_IAM_MEMBER" => Ok(RemediationRequest::RevokeGrants(
            RevokeGrantsRequest::decode(&finding)?,
        )),
        "PUBLIC_BUCKET_ACL" => Ok(RemediationRequest::CloseBucket(CloseBucketRequest::decode(
            &finding,
        )?)),
        "BAD_IP" => Ok(RemediationRequest::SnapshotDisk(
            SnapshotDiskRequest::decode(&finding)?,
        )),
        other => Err(EngineError::UnsupportedCategory(other.to_string())),
    }
}

impl RevokeGrantsRequest {
    fn decode(finding: &RawFinding) -> Result<Self> {
        let organization = finding
            .parent
            .as_deref()
            .and_then(organization_name)
            .ok_or(EngineError::ValueNotFound("organization name"))?;
        let project_id = finding
            .source_properties
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(EngineError::ValueNotFound("project id"))?;
        Ok(Self {
            organization,
            project_id,
        })
    }
}

impl CloseBucketRequest {
    fn decode(finding: &RawFinding) -> Result<Self> {
        let bucket = finding
            .resource_name
            .as_deref()
            .and_then(bucket_name)
            .ok_or(EngineError::ValueNotFound("bucket name"))?;
        let project_id = finding
            .source_properties
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(EngineError::ValueNotFound("project id"))?;
        Ok(Self { project_id, bucket })
    }
}

impl SnapshotDiskRequest {
    fn decode(finding: &RawFinding) -> Result<Self> {
        let resource = finding
            .resource_name
            .as_deref()
            .ok_or(EngineError::ValueNotFound("resource name"))?;
        let project_id = path_segment_after(resource, "projects")
            .ok_or(EngineError::ValueNotFound("project id"))?;
        let zone =
            path_segment_after(resource, "zones").ok_or(EngineError::ValueNotFound("zone"))?;
        let instance = path_segment_after(resource, "instances")
            .ok_or(EngineError::ValueNotFound("instance"))?;
        Ok(Self {
            project_id,
            zone,
            instance,
        })
    }
}

/// Derive the canonical organization name from a finding's parent path,
/// e.g. `organizations/1050000000008/sources/222` -> `organizations/1050000000008`.
pub fn organization_name(parent: &str) -> Option<String> {
    let mut segments = parent.split('/');
    match (segments.next(), segments.next()) {
        (Some("organizations"), Some(id)) if !id.is_empty() => {
            Some(format!("organizations/{id}"))
        }
        _ => None,
    }
}

/// Extract the bucket name from a storage resource path,
/// e.g. `//storage.googleapis.com/open-data-bucket` -> `open-data-bucket`.
fn bucket_name(resource: &str) -> Option<String> {
    resource
        .strip_prefix("//storage.googleapis.com/")
        .filter(|b| !b.is_empty())
        .map(str::to_string)
}

/// Return the path segment following `key` in a resource path,
/// e.g. (`.../projects/p1/zones/us-central1-a/...`, "zones") -> `us-central1-a`.
fn path_segment_after(resource: &str, key: &str) -> Option<String> {
    let mut segments = resource.split('/').peekable();
    while let Some(segment) = segments.next() {
        if segment == key {
            return segments
                .peek()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string());
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    data: String,
}

/// Decode a pub/sub-style push envelope into the inner finding payload.
pub fn decode_push_envelope(body: &[u8]) -> Result<Vec<u8>> {
    let envelope: PushEnvelope =
        serde_json::from_slice(body).map_err(|e| EngineError::Unmarshal(e.to_string()))?;
    BASE64
        .decode(envelope.message.data.as_bytes())
        .map_err(|e| EngineError::Unmarshal(format!("message data is not valid base64: {e}")))
}
