//! Public bucket access removal.
//!
//! Strips the public principals `allUsers` and `allAuthenticatedUsers` from
//! a bucket's IAM policy. A bucket that is already closed produces an empty
//! removal set and a no-op, so redelivery is safe.

use tracing::info;

use super::{with_deadline, Deadline, RemediationOutcome, SkipReason};
use crate::clients::{Binding, Services};
use crate::config::CloseBucketConfig;
use crate::error::Result;
use crate::finding::CloseBucketRequest;
use crate::scope;

const PUBLIC_MEMBERS: [&str; 2] = ["allUsers", "allAuthenticatedUsers"];

/// Apply the rule to one finding.
pub async fn execute(
    req: &CloseBucketRequest,
    conf: &CloseBucketConfig,
    services: &Services,
    deadline: Deadline,
) -> Result<RemediationOutcome> {
    if !conf.enabled {
        info!("public bucket closing is disabled; check configuration");
        return Ok(RemediationOutcome::Skipped(SkipReason::RuleDisabled(
            "close_bucket",
        )));
    }
    conf.require()?;

    let in_scope = with_deadline(
        deadline,
        "getAncestry",
        &req.project_id,
        scope::project_in_scope(services.resource.as_ref(), &req.project_id, &conf.folder_ids),
    )
    .await?;
    if !in_scope {
        return Ok(RemediationOutcome::Skipped(SkipReason::OutOfScope {
            project_id: req.project_id.clone(),
        }));
    }

    let policy = with_deadline(
        deadline,
        "getBucketPolicy",
        &req.bucket,
        services.storage.bucket_policy(&req.bucket),
    )
    .await?;

    let removed = public_members(&policy.bindings);
    if removed.is_empty() {
        return Ok(RemediationOutcome::BucketClosed {
            bucket: req.bucket.clone(),
            removed,
        });
    }

    let updated = policy.without_members(&removed, conf.retain_empty_bindings);
    with_deadline(
        deadline,
        "setBucketPolicy",
        &req.bucket,
        services.storage.set_bucket_policy(&req.bucket, &updated),
    )
    .await?;

    Ok(RemediationOutcome::BucketClosed {
        bucket: req.bucket.clone(),
        removed,
    })
}

/// Public principals present in the policy, in binding then member order,
/// duplicates across bindings preserved.
fn public_members(bindings: &[Binding]) -> Vec<String> {
    let mut public = Vec::new();
    for binding in bindings {
        for member in &binding.members {
            if PUBLIC_MEMBERS.contains(&member.as_str()) {
                public.push(member.clone());
            }
        }
    }
    public
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::clients::fakes::{
        services, FakeComputeHost, FakeResourceManager, FakeStorageControl,
    };
    use crate::clients::{Ancestor, Policy};

    fn binding(role: &str, members: &[&str]) -> Binding {
        Binding {
            role: role.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            condition: None,
        }
    }

    fn public_policy() -> Policy {
        Policy {
            bindings: vec![
                binding(
                    "roles/storage.objectViewer",
                    &["allUsers", "user:admin@example.com"],
                ),
                binding("roles/storage.legacyBucketReader", &["allAuthenticatedUsers"]),
            ],
            etag: Some("CAE=".to_string()),
        }
    }

    fn in_scope_resource() -> FakeResourceManager {
        FakeResourceManager {
            ancestry: vec![
                Ancestor {
                    resource_type: "project".to_string(),
                    id: "exposed-project".to_string(),
                },
                Ancestor {
                    resource_type: "folder".to_string(),
                    id: "188906".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    fn request() -> CloseBucketRequest {
        CloseBucketRequest {
            project_id: "exposed-project".to_string(),
            bucket: "open-data-bucket".to_string(),
        }
    }

    fn enabled_conf() -> CloseBucketConfig {
        CloseBucketConfig {
            enabled: true,
            folder_ids: vec!["188906".to_string()],
            retain_empty_bindings: true,
        }
    }

    #[test]
    fn test_public_members_selection_and_order() {
        let members = public_members(&public_policy().bindings);
        assert_eq!(
            members,
            vec!["allUsers".to_string(), "allAuthenticatedUsers".to_string()]
        );
    }

    #[tokio::test]
    async fn test_execute_removes_public_access() {
        let resource = Arc::new(in_scope_resource());
        let host = Arc::new(FakeComputeHost::default());
        let storage = Arc::new(FakeStorageControl {
            policy: Mutex::new(public_policy()),
            ..Default::default()
        });
        let services = services(&resource, &host, &storage);

        let outcome = execute(
            &request(),
            &enabled_conf(),
            &services,
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RemediationOutcome::BucketClosed {
                bucket: "open-data-bucket".to_string(),
                removed: vec!["allUsers".to_string(), "allAuthenticatedUsers".to_string()],
            }
        );

        let submitted = storage.policy.lock().unwrap().clone();
        assert_eq!(submitted.bindings[0].members, vec!["user:admin@example.com"]);
        assert!(submitted.bindings[1].members.is_empty());
    }

    #[tokio::test]
    async fn test_execute_already_closed_bucket_is_a_noop() {
        let resource = Arc::new(in_scope_resource());
        let host = Arc::new(FakeComputeHost::default());
        let storage = Arc::new(FakeStorageControl {
            policy: Mutex::new(Policy {
                bindings: vec![binding(
                    "roles/storage.objectViewer",
                    &["user:admin@example.com"],
                )],
                etag: None,
            }),
            ..Default::default()
        });
        let services = services(&resource, &host, &storage);

        let outcome = execute(
            &request(),
            &enabled_conf(),
            &services,
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RemediationOutcome::BucketClosed {
                bucket: "open-data-bucket".to_string(),
                removed: vec![],
            }
        );
        assert_eq!(storage.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_disabled_rule_makes_no_calls() {
        let resource = Arc::new(in_scope_resource());
        let host = Arc::new(FakeComputeHost::default());
        let storage = Arc::new(FakeStorageControl {
            policy: Mutex::new(public_policy()),
            ..Default::default()
        });
        let services = services(&resource, &host, &storage);

        let conf = CloseBucketConfig {
            enabled: false,
            ..enabled_conf()
        };
        let outcome = execute(
            &request(),
            &conf,
            &services,
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RemediationOutcome::Skipped(SkipReason::RuleDisabled("close_bucket"))
        );
        assert_eq!(resource.call_count(), 0);
        assert_eq!(storage.call_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_out_of_scope_bucket_is_untouched() {
        let resource = Arc::new(in_scope_resource());
        let host = Arc::new(FakeComputeHost::default());
        let storage = Arc::new(FakeStorageControl {
            policy: Mutex::new(public_policy()),
            ..Default::default()
        });
        let services = services(&resource, &host, &storage);

        let conf = CloseBucketConfig {
            folder_ids: vec!["424242".to_string()],
            ..enabled_conf()
        };
        let outcome = execute(
            &request(),
            &conf,
            &services,
            Deadline::after(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            RemediationOutcome::Skipped(SkipReason::OutOfScope {
                project_id: "exposed-project".to_string(),
            })
        );
        assert_eq!(storage.call_count(), 0);
    }
}
