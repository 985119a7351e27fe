//! Error-driven IAM permission remediation: parse an authorization denial,
//! synthesize a minimal single-action policy, and attach it to the calling
//! principal. Keep the public surface thin and split implementation across
//! sub-modules.

mod engine;
mod parser;
mod policy;
mod principal;
mod providers;

pub use engine::{PermissionRemediator, RemediationError, RemediationOutcome};
pub use parser::{parse_denial, DeniedAction};
pub use policy::{policy_description_for, policy_name_for, PolicyDocument, PolicyStatement, PolicySummary};
pub use principal::Principal;
pub use providers::{CreatePolicyOutcome, IdentityProvider, PolicyProvider, ProviderError};
