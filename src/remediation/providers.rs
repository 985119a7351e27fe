//! Provider seams for the remediation engine. The engine only ever talks to
//! these traits; production wires in the IAM/STS HTTP client, tests wire in
//! fakes.

use async_trait::async_trait;
use thiserror::Error;

use super::policy::{PolicyDocument, PolicySummary};

/// A provider-side failure, carrying the provider's message verbatim.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Result of a create-policy request. Duplicate-name conflicts are a tagged
/// variant rather than an error so the race-absorption path in the engine is
/// statically checkable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatePolicyOutcome {
    Created { arn: String },
    AlreadyExists,
}

/// "Who am I" against the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// ARN-like identifier of the principal the process is calling as.
    async fn caller_identity_arn(&self) -> Result<String, ProviderError>;
}

/// Policy registry and attachment operations against the access-control
/// provider.
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// All locally-managed (non-provider-managed) policies.
    async fn list_local_policies(&self) -> Result<Vec<PolicySummary>, ProviderError>;

    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        description: &str,
    ) -> Result<CreatePolicyOutcome, ProviderError>;

    /// Attach a policy to a user. Expected to be idempotent provider-side;
    /// re-attaching an already-attached policy must come back as success.
    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str)
        -> Result<(), ProviderError>;
}
