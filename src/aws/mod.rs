//! Outbound AWS control-plane clients. Each service gets a small reqwest
//! wrapper that signs requests (SigV4), issues the call, and reshapes the
//! wire response into the JSON the dashboard serves.

pub mod compute;
pub mod iam;
pub mod model;
pub mod sign;
pub mod storage;
pub(crate) mod xml;

use chrono::Utc;
use thiserror::Error;

use crate::config::{AwsSettings, Credentials};

/// A failed provider call. `code` is the provider's error code when the
/// response carried one; `message` is surfaced verbatim so denial text
/// reaches the remediation parser untouched.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> ApiError {
        ApiError { code: None, message: err.to_string() }
    }
}

pub(crate) fn require_credentials(settings: &AwsSettings) -> Result<&Credentials, ApiError> {
    settings
        .credentials
        .as_ref()
        .ok_or_else(|| ApiError::transport("AWS credentials are not configured"))
}

/// Host header value for an endpoint URL (host, plus port when non-default).
pub(crate) fn host_of(endpoint: &str) -> Result<String, ApiError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| ApiError::transport(format!("invalid endpoint {endpoint}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| ApiError::transport(format!("endpoint {endpoint} has no host")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Issue a signed Query-protocol call (`Action=` form POST, XML response).
/// Returns the response body on success; on an error response, extracts the
/// provider's `<Code>`/`<Message>` pair.
pub(crate) async fn query_request(
    http: &reqwest::Client,
    settings: &AwsSettings,
    service: &str,
    api_version: &str,
    action: &str,
    params: &[(&str, &str)],
) -> Result<String, ApiError> {
    let creds = require_credentials(settings)?;
    let endpoint = settings.endpoint_for(service);
    let host = host_of(&endpoint)?;

    let mut form: Vec<(&str, &str)> = vec![("Action", action), ("Version", api_version)];
    form.extend_from_slice(params);
    // The signed payload must match the wire bytes exactly, so the body is
    // built with the same encoder the signer hashes.
    let body = sign::canonical_query_string(&form);

    let content_type = "application/x-www-form-urlencoded; charset=utf-8";
    let sig = sign::sign(
        creds,
        settings.signing_region_for(service),
        service,
        "POST",
        &host,
        "/",
        &[],
        &[("content-type", content_type)],
        body.as_bytes(),
        Utc::now(),
    );

    let mut req = http
        .post(&endpoint)
        .header("content-type", content_type)
        .header("x-amz-date", &sig.amz_date)
        .header("authorization", &sig.authorization);
    if let Some(token) = &sig.security_token {
        req = req.header("x-amz-security-token", token);
    }

    let resp = req.body(body).send().await.map_err(ApiError::transport)?;
    let status = resp.status();
    let text = resp.text().await.map_err(ApiError::transport)?;
    if status.is_success() {
        return Ok(text);
    }
    Err(error_from_xml(&text, status.as_u16()))
}

/// Both the IAM/STS `<ErrorResponse>` and EC2 `<Response><Errors>` shapes
/// carry `<Code>` and `<Message>` leaves.
pub(crate) fn error_from_xml(body: &str, http_status: u16) -> ApiError {
    let code = xml::tag_text(body, "Code");
    let message = xml::tag_text(body, "Message")
        .unwrap_or_else(|| format!("provider returned HTTP {http_status}"));
    ApiError { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_includes_nonstandard_port() {
        assert_eq!(host_of("http://localhost:4566").unwrap(), "localhost:4566");
        assert_eq!(host_of("https://iam.amazonaws.com").unwrap(), "iam.amazonaws.com");
    }

    #[test]
    fn error_extraction_reads_code_and_message() {
        let body = "<ErrorResponse><Error><Type>Sender</Type><Code>EntityAlreadyExists</Code>\
                    <Message>A policy called Custom-ec2-X-Permission already exists.</Message>\
                    </Error></ErrorResponse>";
        let err = error_from_xml(body, 409);
        assert_eq!(err.code.as_deref(), Some("EntityAlreadyExists"));
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn error_extraction_tolerates_unparseable_bodies() {
        let err = error_from_xml("gateway exploded", 502);
        assert_eq!(err.code, None);
        assert_eq!(err.message, "provider returned HTTP 502");
    }
}
