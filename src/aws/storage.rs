//! S3 pass-through calls: bucket inventory and delimiter-based browsing of
//! a bucket prefix, reshaped into the folder/file items the dashboard shows.

use chrono::Utc;
use serde::Serialize;

use crate::config::AwsSettings;

use super::{error_from_xml, host_of, require_credentials, sign, xml, ApiError};

#[derive(Debug, Clone, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectListing {
    pub path: String,
    pub items: Vec<ObjectItem>,
}

#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct S3Client {
    http: reqwest::Client,
    settings: AwsSettings,
}

impl S3Client {
    pub fn new(http: reqwest::Client, settings: AwsSettings) -> Self {
        Self { http, settings }
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        extra_headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<reqwest::Response, ApiError> {
        let creds = require_credentials(&self.settings)?;
        let endpoint = self.settings.endpoint_for("s3");
        let host = host_of(&endpoint)?;
        let canonical_path = sign::encode_path(path);

        let sig = sign::sign(
            creds,
            self.settings.signing_region_for("s3"),
            "s3",
            method,
            &host,
            &canonical_path,
            query,
            extra_headers,
            &body,
            Utc::now(),
        );

        let query_string = sign::canonical_query_string(query);
        let url = if query_string.is_empty() {
            format!("{endpoint}{canonical_path}")
        } else {
            format!("{endpoint}{canonical_path}?{query_string}")
        };

        let mut req = match method {
            "PUT" => self.http.put(&url),
            _ => self.http.get(&url),
        };
        req = req
            .header("x-amz-date", &sig.amz_date)
            .header("authorization", &sig.authorization);
        for (name, value) in extra_headers {
            req = req.header(*name, *value);
        }
        if let Some(hash) = &sig.content_sha256 {
            req = req.header("x-amz-content-sha256", hash);
        }
        if let Some(token) = &sig.security_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req.body(body).send().await.map_err(ApiError::transport)?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let text = resp.text().await.map_err(ApiError::transport)?;
            Err(error_from_xml(&text, status.as_u16()))
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String, ApiError> {
        let resp = self.send("GET", path, query, &[], Vec::new()).await?;
        resp.text().await.map_err(ApiError::transport)
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ApiError> {
        let body = self.get("/", &[]).await?;
        let buckets = xml::tag_blocks(&body, "Bucket")
            .into_iter()
            .filter_map(|b| {
                Some(BucketSummary {
                    name: xml::tag_text(b, "Name")?,
                    creation_date: xml::tag_text(b, "CreationDate"),
                })
            })
            .collect();
        Ok(buckets)
    }

    /// Browse one level of a bucket under `prefix` (empty for the root),
    /// splitting common prefixes into folders and keys into files. The key
    /// equal to the prefix itself (the folder marker object) is dropped.
    pub async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<ObjectListing, ApiError> {
        let mut query: Vec<(&str, &str)> = vec![("list-type", "2"), ("delimiter", "/")];
        if !prefix.is_empty() {
            query.push(("prefix", prefix));
        }
        let body = self.get(&format!("/{bucket}"), &query).await?;

        let mut items = Vec::new();
        for block in xml::tag_blocks(&body, "CommonPrefixes") {
            let Some(full) = xml::tag_text(block, "Prefix") else { continue };
            let name = full
                .strip_prefix(prefix)
                .unwrap_or(&full)
                .trim_end_matches('/')
                .to_string();
            items.push(ObjectItem {
                name,
                kind: "folder",
                size: None,
                last_modified: None,
                path: format!("{bucket}/{full}"),
            });
        }
        for block in xml::tag_blocks(&body, "Contents") {
            let Some(key) = xml::tag_text(block, "Key") else { continue };
            if key == prefix {
                continue;
            }
            items.push(ObjectItem {
                name: key.strip_prefix(prefix).unwrap_or(&key).to_string(),
                kind: "file",
                size: xml::tag_text(block, "Size").and_then(|s| s.parse().ok()),
                last_modified: xml::tag_text(block, "LastModified"),
                path: format!("{bucket}/{key}"),
            });
        }

        Ok(ObjectListing { path: format!("{bucket}/{prefix}"), items })
    }

    /// Fetch one object's bytes plus the content type the store reports.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<FetchedObject, ApiError> {
        let resp = self
            .send("GET", &format!("/{bucket}/{key}"), &[], &[], Vec::new())
            .await?;
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await.map_err(ApiError::transport)?.to_vec();
        Ok(FetchedObject { body, content_type })
    }

    /// Create a folder marker: an empty object whose key ends in `/`.
    pub async fn create_folder(&self, bucket: &str, folder_path: &str) -> Result<(), ApiError> {
        let key = folder_key(folder_path);
        self.send("PUT", &format!("/{bucket}/{key}"), &[], &[], Vec::new())
            .await
            .map(|_| ())
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<(), ApiError> {
        let body = location_constraint_body(self.settings.signing_region_for("s3"))
            .map(String::into_bytes)
            .unwrap_or_default();
        self.send(
            "PUT",
            &format!("/{bucket}"),
            &[],
            &[("x-amz-acl", "private")],
            body,
        )
        .await
        .map(|_| ())
    }
}

fn folder_key(folder_path: &str) -> String {
    let trimmed = folder_path.trim_start_matches('/');
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// us-east-1 is the only region CreateBucket must not name explicitly.
fn location_constraint_body(region: &str) -> Option<String> {
    if region == "us-east-1" {
        return None;
    }
    Some(format!(
        "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <LocationConstraint>{region}</LocationConstraint></CreateBucketConfiguration>"
    ))
}

/// Last path segment of a key, for the download filename.
pub fn attachment_filename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_key_gains_exactly_one_trailing_slash() {
        assert_eq!(folder_key("reports"), "reports/");
        assert_eq!(folder_key("reports/2026/"), "reports/2026/");
        assert_eq!(folder_key("/reports"), "reports/");
    }

    #[test]
    fn bucket_location_is_omitted_only_for_us_east_1() {
        assert_eq!(location_constraint_body("us-east-1"), None);
        let body = location_constraint_body("eu-west-2").unwrap();
        assert!(body.contains("<LocationConstraint>eu-west-2</LocationConstraint>"));
    }

    #[test]
    fn download_filename_is_the_final_segment() {
        assert_eq!(attachment_filename("reports/2026/q1.csv"), "q1.csv");
        assert_eq!(attachment_filename("top-level.txt"), "top-level.txt");
    }
}
