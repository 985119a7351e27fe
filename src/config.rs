//! AWS settings resolution. Everything is resolved once at startup into an
//! explicit `AwsSettings` value handed to the client constructors; no global
//! mutable provider config.
//!
//! Region resolution order matches the original dashboard: the `region` line
//! of `~/.aws/config`, then the `AWS_REGION` environment variable, then
//! `us-east-1`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    /// True when neither the config file nor the environment named a region.
    pub region_is_default: bool,
    pub credentials: Option<Credentials>,
    /// Single endpoint override for all services (LocalStack-style targets).
    endpoint_override: Option<String>,
}

impl AwsSettings {
    /// Resolve settings from `~/.aws/*` and the process environment.
    pub fn from_env() -> AwsSettings {
        let home = home_dir();
        let config_text = home
            .as_ref()
            .map(|h| h.join(".aws").join("config"))
            .and_then(|p| std::fs::read_to_string(p).ok());
        let creds_text = home
            .as_ref()
            .map(|h| h.join(".aws").join("credentials"))
            .and_then(|p| std::fs::read_to_string(p).ok());
        Self::resolve(
            config_text.as_deref(),
            creds_text.as_deref(),
            &|key| std::env::var(key).ok(),
        )
    }

    /// Pure resolution over file contents and an env lookup, so tests can
    /// drive it without touching the real environment.
    fn resolve(
        config_text: Option<&str>,
        creds_text: Option<&str>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> AwsSettings {
        let file_region = config_text.and_then(region_from_config);
        let env_region = env("AWS_REGION").filter(|r| !r.is_empty());
        let region_is_default = file_region.is_none() && env_region.is_none();
        let region = file_region
            .or(env_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let credentials = match (env("AWS_ACCESS_KEY_ID"), env("AWS_SECRET_ACCESS_KEY")) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(Credentials {
                access_key_id: id,
                secret_access_key: secret,
                session_token: env("AWS_SESSION_TOKEN").filter(|t| !t.is_empty()),
            }),
            _ => creds_text.and_then(credentials_from_profile),
        };

        AwsSettings {
            region,
            region_is_default,
            credentials,
            endpoint_override: env("AWS_ENDPOINT_URL").filter(|e| !e.is_empty()),
        }
    }

    /// Base URL for a service, honoring the endpoint override.
    pub fn endpoint_for(&self, service: &str) -> String {
        if let Some(e) = &self.endpoint_override {
            return e.trim_end_matches('/').to_string();
        }
        match service {
            // IAM has a single global endpoint
            "iam" => "https://iam.amazonaws.com".to_string(),
            _ => format!("https://{}.{}.amazonaws.com", service, self.region),
        }
    }

    /// Region used when signing requests for a service. IAM's global
    /// endpoint signs against us-east-1.
    pub fn signing_region_for(&self, service: &str) -> &str {
        if service == "iam" && self.endpoint_override.is_none() {
            "us-east-1"
        } else {
            &self.region
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(|h| Path::new(&h).to_path_buf())
}

/// First `region = ...` assignment in an AWS config file, any profile.
fn region_from_config(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("region") {
            if let Some(value) = rest.trim_start().strip_prefix('=') {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Static credentials from the `[default]` profile of an AWS credentials file.
fn credentials_from_profile(text: &str) -> Option<Credentials> {
    let entries = profile_entries(text, "default");
    Some(Credentials {
        access_key_id: entries.get("aws_access_key_id")?.clone(),
        secret_access_key: entries.get("aws_secret_access_key")?.clone(),
        session_token: entries.get("aws_session_token").cloned(),
    })
}

fn profile_entries(text: &str, profile: &str) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    let mut in_profile = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_profile = line[1..line.len() - 1].trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            entries.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn config_file_region_wins_over_env() {
        let cfg = "[default]\noutput = json\nregion = eu-west-2\n";
        let env = |key: &str| (key == "AWS_REGION").then(|| "us-west-1".to_string());
        let s = AwsSettings::resolve(Some(cfg), None, &env);
        assert_eq!(s.region, "eu-west-2");
        assert!(!s.region_is_default);
    }

    #[test]
    fn env_region_used_when_no_config_file() {
        let env = |key: &str| (key == "AWS_REGION").then(|| "ap-southeast-2".to_string());
        let s = AwsSettings::resolve(None, None, &env);
        assert_eq!(s.region, "ap-southeast-2");
        assert!(!s.region_is_default);
    }

    #[test]
    fn falls_back_to_default_region() {
        let s = AwsSettings::resolve(None, None, &no_env);
        assert_eq!(s.region, "us-east-1");
        assert!(s.region_is_default);
    }

    #[test]
    fn credentials_from_env_take_priority() {
        let creds = "[default]\naws_access_key_id = FILEKEY\naws_secret_access_key = filesecret\n";
        let env = |key: &str| match key {
            "AWS_ACCESS_KEY_ID" => Some("ENVKEY".to_string()),
            "AWS_SECRET_ACCESS_KEY" => Some("envsecret".to_string()),
            _ => None,
        };
        let s = AwsSettings::resolve(None, Some(creds), &env);
        let c = s.credentials.expect("credentials");
        assert_eq!(c.access_key_id, "ENVKEY");
        assert_eq!(c.session_token, None);
    }

    #[test]
    fn credentials_fall_back_to_default_profile() {
        let creds = "\n[other]\naws_access_key_id = NOPE\n\n[default]\naws_access_key_id = FILEKEY\naws_secret_access_key = filesecret\naws_session_token = tok\n";
        let s = AwsSettings::resolve(None, Some(creds), &no_env);
        let c = s.credentials.expect("credentials");
        assert_eq!(c.access_key_id, "FILEKEY");
        assert_eq!(c.secret_access_key, "filesecret");
        assert_eq!(c.session_token.as_deref(), Some("tok"));
    }

    #[test]
    fn endpoint_override_applies_to_every_service() {
        let env = |key: &str| (key == "AWS_ENDPOINT_URL").then(|| "http://localhost:4566/".to_string());
        let s = AwsSettings::resolve(None, None, &env);
        assert_eq!(s.endpoint_for("iam"), "http://localhost:4566");
        assert_eq!(s.endpoint_for("ec2"), "http://localhost:4566");
        assert_eq!(s.signing_region_for("iam"), "us-east-1");
    }

    #[test]
    fn default_endpoints_derive_from_region() {
        let env = |key: &str| (key == "AWS_REGION").then(|| "eu-central-1".to_string());
        let s = AwsSettings::resolve(None, None, &env);
        assert_eq!(s.endpoint_for("iam"), "https://iam.amazonaws.com");
        assert_eq!(s.endpoint_for("ec2"), "https://ec2.eu-central-1.amazonaws.com");
        assert_eq!(s.signing_region_for("iam"), "us-east-1");
        assert_eq!(s.signing_region_for("ec2"), "eu-central-1");
    }
}
