//! AWS Signature Version 4 request signing, enough for the Query-protocol
//! and REST calls this service makes. Derivation follows the published
//! algorithm: canonical request, string-to-sign, HMAC key chain.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Headers produced by signing; callers attach all of them to the request.
#[derive(Debug, Clone)]
pub struct Signature {
    pub amz_date: String,
    pub authorization: String,
    /// Only populated for services that require the payload hash header (S3).
    pub content_sha256: Option<String>,
    pub security_token: Option<String>,
}

/// Sign a request. `path` is the canonical URI path (already segment-encoded,
/// `/` for the root), `query` the decoded key/value pairs, `extra_headers`
/// any additional headers that participate in signing (e.g. content-type).
#[allow(clippy::too_many_arguments)]
pub fn sign(
    creds: &Credentials,
    region: &str,
    service: &str,
    method: &str,
    host: &str,
    path: &str,
    query: &[(&str, &str)],
    extra_headers: &[(&str, &str)],
    payload: &[u8],
    now: DateTime<Utc>,
) -> Signature {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(payload));
    let wants_payload_header = service == "s3";

    // Canonical headers: lowercase names, trimmed values, sorted by name.
    let mut headers: Vec<(String, String)> = vec![
        ("host".to_string(), host.trim().to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    for (name, value) in extra_headers {
        headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
    }
    if wants_payload_header {
        headers.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
    }
    if let Some(token) = &creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        path,
        canonical_query_string(query),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac(format!("AWS4{}", creds.secret_access_key).as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    let k_signing = hmac(&k_service, b"aws4_request");
    let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        creds.access_key_id
    );

    Signature {
        amz_date,
        authorization,
        content_sha256: wants_payload_header.then_some(payload_hash),
        security_token: creds.session_token.clone(),
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Sorted, RFC 3986-encoded query string. Also used to build the request URL
/// and form bodies so the bytes on the wire match the bytes signed.
pub fn canonical_query_string(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// RFC 3986 encoding: unreserved characters pass through, everything else is
/// uppercase percent-escaped.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Encode a URI path, preserving `/` as the segment separator.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(percent_encode)
        .collect::<Vec<_>>()
        .join("/")
}
