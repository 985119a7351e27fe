//! The Permission Remediator: turns an authorization-denied error message
//! into a minimally-scoped policy attached to the calling principal.
//!
//! Pipeline per attempt: parse denial -> resolve caller identity -> resolve
//! policy (lookup, else create, duplicate-name conflict -> relookup) ->
//! attach. No retries beyond that single race-absorption step, and no state
//! kept between attempts; concurrent attempts for the same denial converge
//! through the provider's own duplicate-name conflict detection.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::parser::{parse_denial, DeniedAction};
use super::policy::{policy_description_for, policy_name_for, PolicyDocument};
use super::principal::Principal;
use super::providers::{CreatePolicyOutcome, IdentityProvider, PolicyProvider};

#[derive(Debug, Error)]
pub enum RemediationError {
    /// The error text did not match the recognized denial shape; remediation
    /// was not attempted.
    #[error("unrecognized denial message: {0}")]
    Parse(String),
    #[error("identity resolution failed: {0}")]
    Identity(String),
    #[error("policy creation failed: {0}")]
    PolicyCreation(String),
    #[error("policy attachment failed: {0}")]
    Attachment(String),
}

#[derive(Debug, Clone)]
pub struct RemediationOutcome {
    pub summary: String,
}

/// Remediation engine over injected provider handles. Cheap to clone and
/// safe to invoke concurrently from independent failing routes.
#[derive(Clone)]
pub struct PermissionRemediator {
    identity: Arc<dyn IdentityProvider>,
    policies: Arc<dyn PolicyProvider>,
}

impl PermissionRemediator {
    pub fn new(identity: Arc<dyn IdentityProvider>, policies: Arc<dyn PolicyProvider>) -> Self {
        Self { identity, policies }
    }

    /// Remediate a single authorization denial described by `error_message`.
    /// Returns a human-readable summary of what was granted, or the first
    /// fatal failure in the pipeline.
    pub async fn remediate(&self, error_message: &str) -> Result<RemediationOutcome, RemediationError> {
        let denied = parse_denial(error_message)
            .ok_or_else(|| RemediationError::Parse(error_message.to_string()))?;
        info!(target: "remediation", "adding missing permission for {}", denied.qualified());

        let arn = self
            .identity
            .caller_identity_arn()
            .await
            .map_err(|e| RemediationError::Identity(e.to_string()))?;
        let principal = Principal::from_arn(&arn)
            .ok_or_else(|| RemediationError::Identity(format!("malformed caller identifier: {arn}")))?;

        let policy_arn = self.resolve_policy_arn(&denied).await?;

        self.policies
            .attach_user_policy(&principal.name, &policy_arn)
            .await
            .map_err(|e| RemediationError::Attachment(e.to_string()))?;
        info!(
            target: "remediation",
            "attached policy for {} to user {}", denied.qualified(), principal.name
        );

        Ok(RemediationOutcome {
            summary: format!(
                "Permission added: {} for user {}",
                denied.qualified(),
                principal.name
            ),
        })
    }

    /// Look up the deterministically-named policy, creating it when absent.
    /// A duplicate-name conflict from the provider means a concurrent attempt
    /// won the creation race; relist and use theirs.
    async fn resolve_policy_arn(&self, denied: &DeniedAction) -> Result<String, RemediationError> {
        let name = policy_name_for(denied);

        if let Some(arn) = self.find_policy_arn(&name).await? {
            info!(target: "remediation", "policy {} already exists, using existing policy", name);
            return Ok(arn);
        }

        let document = PolicyDocument::allow_single(denied);
        let description = policy_description_for(denied);
        match self
            .policies
            .create_policy(&name, &document, &description)
            .await
            .map_err(|e| RemediationError::PolicyCreation(e.to_string()))?
        {
            CreatePolicyOutcome::Created { arn } => {
                info!(target: "remediation", "created policy {}", name);
                Ok(arn)
            }
            CreatePolicyOutcome::AlreadyExists => {
                warn!(target: "remediation", "lost creation race for {}, relisting", name);
                self.find_policy_arn(&name).await?.ok_or_else(|| {
                    RemediationError::PolicyCreation(format!(
                        "policy {name} reported as existing but absent from listing"
                    ))
                })
            }
        }
    }

    async fn find_policy_arn(&self, name: &str) -> Result<Option<String>, RemediationError> {
        let policies = self
            .policies
            .list_local_policies()
            .await
            .map_err(|e| RemediationError::PolicyCreation(e.to_string()))?;
        Ok(policies.into_iter().find(|p| p.name == name).map(|p| p.arn))
    }
}
