//! Denial parsing: pull the missing (service, action) pair out of a raw
//! provider error message. Anything that does not carry the standard
//! "is not authorized to perform" phrase is rejected rather than guessed at.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// Leading phrase is case-insensitive; the service:Action token is taken
// verbatim (policy evaluation is case-sensitive on action names) and stops
// at the first whitespace.
static DENIAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)is not authorized to perform:\s*(?-i)([^\s:]+):(\S+)").unwrap()
});

/// The single permission a provider reported as missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeniedAction {
    pub service: String,
    pub action: String,
}

impl DeniedAction {
    /// Qualified action name as it appears in a policy statement, e.g.
    /// `ec2:DescribeLaunchTemplates`.
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.service, self.action)
    }
}

/// Extract the denied (service, action) from an error message, or `None`
/// when the message does not have the recognized shape.
pub fn parse_denial(message: &str) -> Option<DeniedAction> {
    let caps = DENIAL_RE.captures(message)?;
    Some(DeniedAction {
        service: caps.get(1)?.as_str().to_string(),
        action: caps.get(2)?.as_str().to_string(),
    })
}
