use serde::{Deserialize, Serialize};

/// The identity a denied call ran under, and the attachment target for any
/// remediation policy. Resolved fresh on every attempt; never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
}

impl Principal {
    /// Derive the principal name from an ARN-like identifier by taking the
    /// final path segment, e.g. `arn:aws:iam::111111111:user/s3readwrite`
    /// yields `s3readwrite`. Identifiers without a separator or with an
    /// empty final segment are malformed and yield `None`.
    pub fn from_arn(arn: &str) -> Option<Principal> {
        let (_, name) = arn.rsplit_once('/')?;
        if name.is_empty() {
            return None;
        }
        Some(Principal { name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_final_path_segment() {
        let p = Principal::from_arn("arn:aws:iam::111111111:user/s3readwrite").unwrap();
        assert_eq!(p.name, "s3readwrite");
    }

    #[test]
    fn nested_paths_still_resolve_last_segment() {
        let p = Principal::from_arn("arn:aws:iam::1:user/division/subunit/alice").unwrap();
        assert_eq!(p.name, "alice");
    }

    #[test]
    fn malformed_identifiers_are_rejected() {
        assert_eq!(Principal::from_arn("arn:aws:iam::1:root"), None);
        assert_eq!(Principal::from_arn("arn:aws:iam::1:user/"), None);
        assert_eq!(Principal::from_arn(""), None);
    }
}
