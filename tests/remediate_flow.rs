//! End-to-end dispatcher flow against in-memory collaborators, driving the
//! engine exactly the way the one-shot CLI does: a finding payload written
//! to disk, read back, and handed to `remediate`.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use remediation_engine::clients::{
    Ancestor, Binding, ComputeHost, Disk, Organization, Policy, ResourceManager, Services,
    Snapshot, StorageControl,
};
use remediation_engine::{remediate, Configuration, Deadline, EngineError, RemediationOutcome};

struct StubResource {
    organization: Organization,
    policy: Mutex<Policy>,
    ancestry: Vec<Ancestor>,
}

#[async_trait]
impl ResourceManager for StubResource {
    async fn organization(&self, _name: &str) -> Result<Organization> {
        Ok(self.organization.clone())
    }

    async fn organization_policy(&self, _name: &str) -> Result<Policy> {
        Ok(self.policy.lock().unwrap().clone())
    }

    async fn set_organization_policy(&self, _name: &str, policy: &Policy) -> Result<Policy> {
        *self.policy.lock().unwrap() = policy.clone();
        Ok(policy.clone())
    }

    async fn project_ancestry(&self, _project_id: &str) -> Result<Vec<Ancestor>> {
        Ok(self.ancestry.clone())
    }
}

struct StubHost;

#[async_trait]
impl ComputeHost for StubHost {
    async fn list_disks(&self, _project: &str, _zone: &str, _instance: &str) -> Result<Vec<Disk>> {
        Ok(vec![])
    }

    async fn list_snapshots(
        &self,
        _project: &str,
        _zone: &str,
        _disk: &str,
    ) -> Result<Vec<Snapshot>> {
        Ok(vec![])
    }

    async fn create_snapshot(
        &self,
        _project: &str,
        _zone: &str,
        _disk: &str,
        _snapshot_name: &str,
    ) -> Result<()> {
        Ok(())
    }
}

struct StubStorage;

#[async_trait]
impl StorageControl for StubStorage {
    async fn bucket_policy(&self, _bucket: &str) -> Result<Policy> {
        Ok(Policy::default())
    }

    async fn set_bucket_policy(&self, _bucket: &str, policy: &Policy) -> Result<Policy> {
        Ok(policy.clone())
    }
}

fn services(resource: Arc<StubResource>) -> Services {
    Services::new(resource, Arc::new(StubHost), Arc::new(StubStorage))
}

fn stub_resource() -> Arc<StubResource> {
    Arc::new(StubResource {
        organization: Organization {
            name: "organizations/1050000000008".to_string(),
            display_name: "example.com".to_string(),
        },
        policy: Mutex::new(Policy {
            bindings: vec![Binding {
                role: "roles/owner".to_string(),
                members: vec![
                    "user:bob@example.com".to_string(),
                    "user:eve@gmail.com".to_string(),
                    "user:carl@contractor.example.com".to_string(),
                    "group:team@example.com".to_string(),
                ],
                condition: None,
            }],
            etag: Some("BwX1".to_string()),
        }),
        ancestry: vec![
            Ancestor {
                resource_type: "project".to_string(),
                id: "sandbox-project".to_string(),
            },
            Ancestor {
                resource_type: "folder".to_string(),
                id: "188906".to_string(),
            },
        ],
    })
}

fn configuration() -> Configuration {
    let mut config = Configuration::default();
    config.revoke_grants.enabled = true;
    config.revoke_grants.allowed_domains = vec!["contractor.example.com".to_string()];
    config.revoke_grants.folder_ids = vec!["188906".to_string()];
    config.revoke_grants.retain_empty_bindings = true;
    config
}

fn finding_payload() -> Vec<u8> {
    serde_json::json!({
        "finding": {
            "category": "NON_ORG_IAM_MEMBER",
            "parent": "organizations/1050000000008/sources/2230510",
            "resourceName": "//cloudresourcemanager.googleapis.com/organizations/1050000000008",
            "sourceProperties": {"projectId": "sandbox-project"}
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn revoke_flow_from_payload_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&finding_payload()).unwrap();
    let payload = std::fs::read(file.path()).unwrap();

    let resource = stub_resource();
    let services = services(resource.clone());

    let outcome = remediate(
        &payload,
        &configuration(),
        &services,
        Deadline::after(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(
        outcome,
        RemediationOutcome::RevokedMembers {
            organization: "organizations/1050000000008".to_string(),
            members: vec!["user:eve@gmail.com".to_string()],
        }
    );

    let updated = resource.policy.lock().unwrap().clone();
    assert_eq!(
        updated.bindings[0].members,
        vec![
            "user:bob@example.com",
            "user:carl@contractor.example.com",
            "group:team@example.com",
        ]
    );
}

#[tokio::test]
async fn unsupported_category_is_rejected_before_any_call() {
    let payload = serde_json::json!({
        "finding": {
            "category": "AUDIT_LOGGING_DISABLED",
            "parent": "organizations/1050000000008/sources/1"
        }
    })
    .to_string();

    let resource = stub_resource();
    let services = services(resource);

    let result = remediate(
        payload.as_bytes(),
        &configuration(),
        &services,
        Deadline::after(Duration::from_secs(10)),
    )
    .await;

    match &result {
        Err(EngineError::UnsupportedCategory(category)) => {
            assert_eq!(category, "AUDIT_LOGGING_DISABLED");
        }
        other => panic!("expected unsupported category, got {other:?}"),
    }
    assert!(!result.unwrap_err().is_retryable());
}
