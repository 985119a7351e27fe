//!
//! clouddeck HTTP server
//! ---------------------
//! Axum-based dashboard API. Every route is a thin proxy over one AWS
//! control-plane call; the interesting part is the failure path, where any
//! provider error is handed to the permission remediator so an authorization
//! denial self-heals before the user retries.
//!
//! Responsibilities:
//! - Identity and region info endpoints.
//! - Compute (EC2) inventory and launch endpoints.
//! - Object-storage (S3) browsing endpoints.
//! - Model (Bedrock) listing and invocation endpoints.
//! - Uniform error reporting: `{"error", "status"}` where status carries the
//!   remediation outcome (or "unknown" when the error was not a denial).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::aws::compute::Ec2Client;
use crate::aws::iam::IamClient;
use crate::aws::model::BedrockClient;
use crate::aws::storage::{attachment_filename, S3Client};
use crate::aws::ApiError;
use crate::config::AwsSettings;
use crate::remediation::{PermissionRemediator, Principal, RemediationError};

/// Shared server state injected into all handlers. Clients are constructed
/// once at startup and passed in explicitly; nothing here is lazily
/// initialized behind a global.
#[derive(Clone)]
pub struct AppState {
    pub settings: AwsSettings,
    pub iam: IamClient,
    pub ec2: Ec2Client,
    pub s3: S3Client,
    pub bedrock: BedrockClient,
    pub remediator: PermissionRemediator,
}

impl AppState {
    pub fn new(settings: AwsSettings) -> AppState {
        let http = reqwest::Client::new();
        let iam = IamClient::new(http.clone(), settings.clone());
        let remediator =
            PermissionRemediator::new(Arc::new(iam.clone()), Arc::new(iam.clone()));
        AppState {
            ec2: Ec2Client::new(http.clone(), settings.clone()),
            s3: S3Client::new(http.clone(), settings.clone()),
            bedrock: BedrockClient::new(http, settings.clone()),
            iam,
            settings,
            remediator,
        }
    }
}

/// Convenience entry point using the `CLOUDDECK_HTTP_PORT` env var
/// (default 3000).
pub async fn run() -> anyhow::Result<()> {
    let port = std::env::var("CLOUDDECK_HTTP_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000);
    run_with_port(port).await
}

pub async fn run_with_port(port: u16) -> anyhow::Result<()> {
    let settings = AwsSettings::from_env();
    info!(
        target: "startup",
        "clouddeck starting: region={} (default={}), credentials={}",
        settings.region,
        settings.region_is_default,
        if settings.credentials.is_some() { "configured" } else { "missing" }
    );

    let state = AppState::new(settings);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(target: "startup", "HTTP API listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/user", get(user_info))
        .route("/api/region", get(region_info))
        .route("/api/compute/instances", get(compute_instances))
        .route("/api/compute/templates", get(compute_templates))
        .route("/api/compute/launch", post(compute_launch))
        .route("/api/compute/status/{instance_id}", get(compute_status))
        .route(
            "/api/objectstore/buckets",
            get(objectstore_buckets).post(objectstore_create_bucket),
        )
        .route("/api/objectstore/buckets/{bucket}", get(objectstore_browse))
        .route("/api/objectstore/download/{bucket}/{*key}", get(objectstore_download))
        .route("/api/objectstore/folders", post(objectstore_create_folder))
        .route("/api/ai/models", get(ai_models))
        .route("/api/ai/models/{model_id}", get(ai_model_detail))
        .route("/api/ai/invoke", post(ai_invoke))
        .with_state(state)
}

/// Shared failure path for every AWS-backed route: report the original error
/// to the client, run remediation on it, and attach the remediation status.
/// The original error is always what the caller sees; the status is
/// auxiliary.
async fn aws_failure(state: &AppState, context: &str, err: ApiError) -> (StatusCode, Json<Value>) {
    let message = err.to_string();
    error!(target: "api", "{context} failed: {message}");
    let status = match state.remediator.remediate(&message).await {
        Ok(outcome) => outcome.summary,
        Err(RemediationError::Parse(_)) => "unknown".to_string(),
        Err(e) => {
            error!(target: "remediation", "remediation failed: {e}");
            e.to_string()
        }
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": message, "status": status})),
    )
}

async fn user_info(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let identity = match state.iam.get_caller_identity().await {
        Ok(i) => i,
        Err(e) => return aws_failure(&state, "get caller identity", e).await,
    };
    let mut out = json!({
        "account": identity.account,
        "arn": identity.arn,
        "user_id": identity.user_id,
    });
    // Extra detail is only available for IAM-user principals.
    if identity.arn.contains(":user/") {
        if let Some(principal) = Principal::from_arn(&identity.arn) {
            match state.iam.get_user(&principal.name).await {
                Ok(detail) => {
                    out["user_name"] = json!(detail.user_name);
                    out["path"] = json!(detail.path);
                    out["create_date"] = json!(detail.create_date);
                }
                Err(e) => return aws_failure(&state, "get user", e).await,
            }
        }
    }
    (StatusCode::OK, Json(out))
}

async fn region_info(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "region": state.settings.region,
            "is_default": state.settings.region_is_default,
        })),
    )
}

async fn compute_instances(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.ec2.running_instances().await {
        Ok(instances) => (StatusCode::OK, Json(json!(instances))),
        Err(e) => aws_failure(&state, "describe instances", e).await,
    }
}

async fn compute_templates(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.ec2.launch_templates().await {
        Ok(templates) => (StatusCode::OK, Json(json!(templates))),
        Err(e) => aws_failure(&state, "describe launch templates", e).await,
    }
}

#[derive(Debug, Deserialize)]
struct LaunchPayload {
    template_id: String,
}

async fn compute_launch(
    State(state): State<AppState>,
    Json(payload): Json<LaunchPayload>,
) -> (StatusCode, Json<Value>) {
    if payload.template_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "template_id is required"})),
        );
    }
    match state.ec2.launch_from_template(&payload.template_id).await {
        Ok(instance_id) => (
            StatusCode::OK,
            Json(json!({"launched": true, "instance_id": instance_id})),
        ),
        Err(e) => aws_failure(&state, "launch instance", e).await,
    }
}

async fn compute_status(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.ec2.instance_status(&instance_id).await {
        Ok(Some(status)) => (StatusCode::OK, Json(json!({"status": status}))),
        // No status entry yet: the instance is still coming up.
        Ok(None) => (StatusCode::OK, Json(json!({"status": "pending"}))),
        Err(e) => aws_failure(&state, "describe instance status", e).await,
    }
}

async fn objectstore_buckets(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.s3.list_buckets().await {
        Ok(buckets) => (StatusCode::OK, Json(json!(buckets))),
        Err(e) => aws_failure(&state, "list buckets", e).await,
    }
}

#[derive(Debug, Deserialize)]
struct BrowseQuery {
    prefix: Option<String>,
}

async fn objectstore_browse(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<BrowseQuery>,
) -> (StatusCode, Json<Value>) {
    // Browsing is folder-oriented: a non-empty prefix always ends in '/'.
    let prefix = match query.prefix {
        Some(p) if !p.is_empty() => {
            if p.ends_with('/') {
                p
            } else {
                format!("{p}/")
            }
        }
        _ => String::new(),
    };
    match state.s3.list_prefix(&bucket, &prefix).await {
        Ok(listing) => (StatusCode::OK, Json(json!(listing))),
        Err(e) => aws_failure(&state, "list objects", e).await,
    }
}

async fn objectstore_download(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Response {
    match state.s3.get_object(&bucket, &key).await {
        Ok(object) => {
            let content_type = object
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let disposition =
                format!("attachment; filename=\"{}\"", attachment_filename(&key));
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                object.body,
            )
                .into_response()
        }
        Err(e) => aws_failure(&state, "download object", e).await.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CreateFolderPayload {
    bucket_name: String,
    folder_path: String,
}

async fn objectstore_create_folder(
    State(state): State<AppState>,
    Json(payload): Json<CreateFolderPayload>,
) -> (StatusCode, Json<Value>) {
    if payload.bucket_name.is_empty() || payload.folder_path.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Bucket name and folder path are required"})),
        );
    }
    match state
        .s3
        .create_folder(&payload.bucket_name, &payload.folder_path)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"message": "Folder created successfully"})),
        ),
        Err(e) => aws_failure(&state, "create folder", e).await,
    }
}

#[derive(Debug, Deserialize)]
struct CreateBucketPayload {
    bucket_name: String,
}

async fn objectstore_create_bucket(
    State(state): State<AppState>,
    Json(payload): Json<CreateBucketPayload>,
) -> (StatusCode, Json<Value>) {
    if payload.bucket_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "bucket_name is required"})),
        );
    }
    match state.s3.create_bucket(&payload.bucket_name).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "message": "Bucket created successfully",
                "bucket": {"name": payload.bucket_name},
            })),
        ),
        Err(e) => aws_failure(&state, "create bucket", e).await,
    }
}

async fn ai_models(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.bedrock.list_models().await {
        Ok(models) => (StatusCode::OK, Json(Value::Array(models))),
        Err(e) => aws_failure(&state, "list foundation models", e).await,
    }
}

async fn ai_model_detail(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.bedrock.model_detail(&model_id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)),
        Err(e) => aws_failure(&state, "get foundation model", e).await,
    }
}

#[derive(Debug, Deserialize)]
struct InvokePayload {
    model_id: String,
    prompt: String,
    temperature: Option<f64>,
    top_p: Option<f64>,
}

async fn ai_invoke(
    State(state): State<AppState>,
    Json(payload): Json<InvokePayload>,
) -> (StatusCode, Json<Value>) {
    if payload.model_id.is_empty() || payload.prompt.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "model_id and prompt are required"})),
        );
    }
    match state
        .bedrock
        .invoke(&payload.model_id, &payload.prompt, payload.temperature, payload.top_p)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => aws_failure(&state, "invoke model", e).await,
    }
}
