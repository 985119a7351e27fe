//! IAM and STS client. This is the production backing for the remediation
//! engine's provider traits, plus the identity-detail lookup the dashboard's
//! user route serves.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::AwsSettings;
use crate::remediation::{
    CreatePolicyOutcome, IdentityProvider, PolicyDocument, PolicyProvider, PolicySummary,
    ProviderError,
};

use super::{query_request, xml, ApiError};

const IAM_API_VERSION: &str = "2010-05-08";
const STS_API_VERSION: &str = "2011-06-15";

#[derive(Debug, Clone, Serialize)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    pub user_name: String,
    pub user_id: String,
    pub arn: String,
    pub create_date: Option<String>,
    pub path: Option<String>,
}

#[derive(Clone)]
pub struct IamClient {
    http: reqwest::Client,
    settings: AwsSettings,
}

impl IamClient {
    pub fn new(http: reqwest::Client, settings: AwsSettings) -> Self {
        Self { http, settings }
    }

    pub async fn get_caller_identity(&self) -> Result<CallerIdentity, ApiError> {
        let body = query_request(
            &self.http,
            &self.settings,
            "sts",
            STS_API_VERSION,
            "GetCallerIdentity",
            &[],
        )
        .await?;
        Ok(CallerIdentity {
            account: xml::tag_text(&body, "Account").unwrap_or_default(),
            arn: xml::tag_text(&body, "Arn")
                .ok_or_else(|| ApiError::transport("caller identity response missing Arn"))?,
            user_id: xml::tag_text(&body, "UserId").unwrap_or_default(),
        })
    }

    pub async fn get_user(&self, user_name: &str) -> Result<UserDetail, ApiError> {
        let body = query_request(
            &self.http,
            &self.settings,
            "iam",
            IAM_API_VERSION,
            "GetUser",
            &[("UserName", user_name)],
        )
        .await?;
        Ok(UserDetail {
            user_name: xml::tag_text(&body, "UserName").unwrap_or_else(|| user_name.to_string()),
            user_id: xml::tag_text(&body, "UserId").unwrap_or_default(),
            arn: xml::tag_text(&body, "Arn").unwrap_or_default(),
            create_date: xml::tag_text(&body, "CreateDate"),
            path: xml::tag_text(&body, "Path"),
        })
    }

    /// All locally-managed policies, following `Marker` pagination so a
    /// truncated first page can never hide an existing policy name.
    async fn list_policies_local(&self) -> Result<Vec<PolicySummary>, ApiError> {
        let mut policies = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut params: Vec<(&str, &str)> = vec![("Scope", "Local")];
            if let Some(m) = &marker {
                params.push(("Marker", m.as_str()));
            }
            let body = query_request(
                &self.http,
                &self.settings,
                "iam",
                IAM_API_VERSION,
                "ListPolicies",
                &params,
            )
            .await?;
            for member in xml::tag_blocks(&body, "member") {
                if let (Some(name), Some(arn)) =
                    (xml::tag_text(member, "PolicyName"), xml::tag_text(member, "Arn"))
                {
                    policies.push(PolicySummary { name, arn });
                }
            }
            if xml::tag_text(&body, "IsTruncated").as_deref() == Some("true") {
                marker = xml::tag_text(&body, "Marker");
                if marker.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(policies)
    }
}

#[async_trait]
impl IdentityProvider for IamClient {
    async fn caller_identity_arn(&self) -> Result<String, ProviderError> {
        let identity = self
            .get_caller_identity()
            .await
            .map_err(|e| ProviderError(e.to_string()))?;
        Ok(identity.arn)
    }
}

#[async_trait]
impl PolicyProvider for IamClient {
    async fn list_local_policies(&self) -> Result<Vec<PolicySummary>, ProviderError> {
        self.list_policies_local()
            .await
            .map_err(|e| ProviderError(e.to_string()))
    }

    async fn create_policy(
        &self,
        name: &str,
        document: &PolicyDocument,
        description: &str,
    ) -> Result<CreatePolicyOutcome, ProviderError> {
        let document_json =
            serde_json::to_string(document).map_err(|e| ProviderError(e.to_string()))?;
        let result = query_request(
            &self.http,
            &self.settings,
            "iam",
            IAM_API_VERSION,
            "CreatePolicy",
            &[
                ("PolicyName", name),
                ("PolicyDocument", &document_json),
                ("Description", description),
            ],
        )
        .await;
        match result {
            Ok(body) => {
                let arn = xml::tag_text(&body, "Arn")
                    .ok_or_else(|| ProviderError("create policy response missing Arn".into()))?;
                Ok(CreatePolicyOutcome::Created { arn })
            }
            // The duplicate-name conflict is the one creation failure the
            // engine absorbs; keep it a tagged outcome, not an error.
            Err(e) if e.code.as_deref() == Some("EntityAlreadyExists") => {
                Ok(CreatePolicyOutcome::AlreadyExists)
            }
            Err(e) => Err(ProviderError(e.to_string())),
        }
    }

    async fn attach_user_policy(
        &self,
        user_name: &str,
        policy_arn: &str,
    ) -> Result<(), ProviderError> {
        query_request(
            &self.http,
            &self.settings,
            "iam",
            IAM_API_VERSION,
            "AttachUserPolicy",
            &[("UserName", user_name), ("PolicyArn", policy_arn)],
        )
        .await
        .map(|_| ())
        .map_err(|e| ProviderError(e.to_string()))
    }
}
