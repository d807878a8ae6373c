//! HTTP servers for the three services, built on Axum.

use crate::handlers::{
    analysis, files, gateway, handle_analysis_ping, handle_analysis_root, handle_health,
    handle_storage_ping, handle_storage_root,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use textcloud_core::config::{NetworkConfig, StorageConfig};
use textcloud_core::{AnalysisApi, StorageApi};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use url::Url;

/// State of the storage service.
pub struct StorageState {
    pub api: StorageApi,
}

/// State of the analysis service.
pub struct AnalysisState {
    pub api: AnalysisApi,
}

/// State of the gateway.
pub struct GatewayState {
    pub client: reqwest::Client,
    pub storage_url: Url,
    pub analysis_url: Url,
}

impl GatewayState {
    pub fn new(storage_url: Url, analysis_url: Url) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NetworkConfig::GATEWAY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            storage_url,
            analysis_url,
        })
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn storage_router(api: StorageApi) -> Router {
    let state = Arc::new(StorageState { api });

    Router::new()
        .route("/", get(handle_storage_root))
        .route("/ping", get(handle_storage_ping))
        .route("/health", get(handle_health))
        .route("/upload", post(files::handle_upload))
        .route("/:file_id/download", get(files::handle_download))
        .route("/:file_id/metadata", get(files::handle_metadata))
        .layer(DefaultBodyLimit::max(StorageConfig::MAX_UPLOAD_BYTES + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

pub fn analysis_router(api: AnalysisApi) -> Router {
    let state = Arc::new(AnalysisState { api });

    Router::new()
        .route("/", get(handle_analysis_root))
        .route("/ping", get(handle_analysis_ping))
        .route("/health", get(handle_health))
        .route("/analysis", post(analysis::handle_trigger))
        .route("/analysis/", post(analysis::handle_trigger))
        .route("/analysis/:analysis_id", get(analysis::handle_get))
        .route("/analysis/file/:file_id", get(analysis::handle_list_for_file))
        .route(
            "/analysis/wordclouds/:analysis_id/:filename",
            get(analysis::handle_artifact),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

pub fn gateway_router(state: GatewayState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/", get(gateway::handle_root))
        .route("/ping", get(gateway::handle_ping))
        .route("/health", get(handle_health))
        .route("/api/v1/files/*path", any(gateway::handle_files))
        .route("/api/v1/analysis/", any(gateway::handle_analysis_root))
        .route("/api/v1/analysis/*path", any(gateway::handle_analysis))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

/// Serve `app` on an already bound listener.
///
/// Returns the address the server is bound to.
pub fn serve(name: &'static str, listener: TcpListener, app: Router) -> anyhow::Result<SocketAddr> {
    let addr = listener.local_addr()?;
    info!("{} listening on {}", name, addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("{} server error: {}", name, e);
        }
    });

    Ok(addr)
}

async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    Ok(TcpListener::bind((host, port)).await?)
}

/// Start the storage service. Returns the bound address (useful when port=0).
pub async fn start_storage_server(api: StorageApi, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    serve("Storage service", bind(host, port).await?, storage_router(api))
}

/// Start the analysis service. Returns the bound address (useful when port=0).
pub async fn start_analysis_server(
    api: AnalysisApi,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    serve("Analysis service", bind(host, port).await?, analysis_router(api))
}

/// Start the gateway. Returns the bound address (useful when port=0).
pub async fn start_gateway_server(
    state: GatewayState,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    serve("Gateway", bind(host, port).await?, gateway_router(state))
}
