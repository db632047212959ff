//! External IAM grant revocation.
//!
//! Reacts to an anomalous grant on an organization policy: computes the set
//! of user members that belong neither to the organization's own domain nor
//! to any allow-listed domain, then submits a derived policy with exactly
//! those members removed. Removal is idempotent: recomputing the diff
//! against the updated policy yields an empty set, so redelivery is safe.

use tracing::info;

use super::{with_deadline, Deadline, RemediationOutcome, SkipReason};
use crate::clients::{Binding, Services};
use crate::config::RevokeGrantsConfig;
use crate::error::Result;
use crate::finding::RevokeGrantsRequest;
use crate::scope;

/// Apply the rule to one finding.
pub async fn execute(
    req: &RevokeGrantsRequest,
    conf: &RevokeGrantsConfig,
    services: &Services,
    deadline: Deadline,
) -> Result<RemediationOutcome> {
    if !conf.enabled {
        info!("external grant revocation is disabled; check configuration");
        return Ok(RemediationOutcome::Skipped(SkipReason::RuleDisabled(
            "revoke_grants",
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

    let organization = with_deadline(
        deadline,
        "getOrganization",
        &req.organization,
        services.resource.organization(&req.organization),
    )
    .await?;
    let policy = with_deadline(
        deadline,
        "getIamPolicy",
        &organization.name,
        services.resource.organization_policy(&organization.name),
    )
    .await?;

    let members = filter_external_members(
        &organization.display_name,
        &policy.bindings,
        &conf.allowed_domains,
    );
    if members.is_empty() {
        return Ok(RemediationOutcome::RevokedMembers {
            organization: organization.name,
            members,
        });
    }

    let updated = policy.without_members(&members, conf.retain_empty_bindings);
    with_deadline(
        deadline,
        "setIamPolicy",
        &organization.name,
        services
            .resource
            .set_organization_policy(&organization.name, &updated),
    )
    .await?;

    Ok(RemediationOutcome::RevokedMembers {
        organization: organization.name,
        members,
    })
}

/// Select the members to revoke, in binding order then member order.
///
/// A member is selected iff it carries the `user:` principal prefix, does
/// not contain the organization's own domain, and does not contain any
/// allow-listed domain substring. Service accounts, groups, and domain-wide
/// principals are never auto-revoked by this rule. Duplicate identifiers
/// across bindings are preserved verbatim; application treats them
/// idempotently.
pub fn filter_external_members(
    organization_domain: &str,
    bindings: &[Binding],
    allowed_domains: &[String],
) -> Vec<String> {
    let mut external = Vec::new();
    for binding in bindings {
        for member in &binding.members {
            if not_from_org(member, "user:", organization_domain)
                && not_allowed(member, allowed_domains)
            {
                external.push(member.clone());
            }
        }
    }
    external
}

fn not_allowed(member: &str, domains: &[String]) -> bool {
    !domains.iter().any(|d| member.contains(d.as_str()))
}

fn not_from_org(member: &str, prefix: &str, domain: &str) -> bool {
    member.starts_with(prefix) && !member.contains(domain)
}
