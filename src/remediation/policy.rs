//! Policy model: the managed-policy naming scheme and the single-statement
//! allow document synthesized for a denied action.

use serde::{Deserialize, Serialize};

use super::parser::DeniedAction;

const POLICY_DOCUMENT_VERSION: &str = "2012-10-17";

/// Deterministic name for the policy granting one denied action. Repeated
/// remediation of the same denial always resolves to this name, which is the
/// registry's uniqueness mechanism.
pub fn policy_name_for(denied: &DeniedAction) -> String {
    format!("Custom-{}-{}-Permission", denied.service, denied.action)
}

/// Description recorded on the provider side at creation time.
pub fn policy_description_for(denied: &DeniedAction) -> String {
    format!("Auto-generated policy for {}", denied.qualified())
}

/// A name/ARN pair as returned by the provider's policy listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(rename = "Effect")]
    pub effect: String,
    #[serde(rename = "Action")]
    pub action: Vec<String>,
    #[serde(rename = "Resource")]
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Single-statement allow for exactly one action over all resources.
    /// Broad resource scope with narrow action scope is deliberate and must
    /// be preserved for compatibility with previously created policies.
    pub fn allow_single(denied: &DeniedAction) -> PolicyDocument {
        PolicyDocument {
            version: POLICY_DOCUMENT_VERSION.to_string(),
            statement: vec![PolicyStatement {
                effect: "Allow".to_string(),
                action: vec![denied.qualified()],
                resource: vec!["*".to_string()],
            }],
        }
    }
}
