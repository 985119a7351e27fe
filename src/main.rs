use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Log the filter in effect; the resolved AWS settings are announced once
    // by the server when it starts.
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("CLOUDDECK_HTTP_PORT").unwrap_or_else(|_| "3000".to_string());
    info!(
        target: "clouddeck",
        "clouddeck logging initialized: RUST_LOG='{}', http_port={}",
        rust_log, http_port
    );

    clouddeck::server::run().await
}
