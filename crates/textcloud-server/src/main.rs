//! Textcloud Server - runs one of the Textcloud services.
//!
//! ```text
//! textcloud-server storage   # content-addressed file storage (port 8001)
//! textcloud-server analysis  # word-cloud analysis (port 8002)
//! textcloud-server gateway   # request relay (port 8000)
//! ```

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use textcloud_core::config::{AnalysisConfig, AppConfig, StorageConfig, WordCloudConfig};
use textcloud_core::{AnalysisApi, AnalysisSettings, StorageApi, StorageSettings};
use textcloud_server::{
    start_analysis_server, start_gateway_server, start_storage_server, GatewayState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

const GATEWAY_DEFAULT_PORT: u16 = 8000;

#[derive(Parser, Debug)]
#[command(name = "textcloud-server")]
#[command(about = "File storage, word-cloud analysis and gateway services for Textcloud")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    service: Service,
}

#[derive(Subcommand, Debug)]
enum Service {
    /// File storage service
    Storage(StorageArgs),
    /// Analysis service
    Analysis(AnalysisArgs),
    /// Gateway relaying to the other two services
    Gateway(GatewayArgs),
}

#[derive(clap::Args, Debug)]
struct StorageArgs {
    /// Host to bind to
    #[arg(long, env = "TEXTCLOUD_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "FSS_PORT", default_value_t = StorageConfig::DEFAULT_PORT)]
    port: u16,

    /// Data directory (defaults to the platform data directory)
    #[arg(long, env = "TEXTCLOUD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Public base URL of this service, used in download references
    #[arg(long, env = "FSS_URL")]
    public_url: Option<Url>,

    /// Base URL of the analysis service; uploads are announced there
    #[arg(long, env = "FAS_URL")]
    analysis_url: Option<Url>,
}

#[derive(clap::Args, Debug)]
struct AnalysisArgs {
    /// Host to bind to
    #[arg(long, env = "TEXTCLOUD_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "FAS_PORT", default_value_t = AnalysisConfig::DEFAULT_PORT)]
    port: u16,

    /// Data directory (defaults to the platform data directory)
    #[arg(long, env = "TEXTCLOUD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Public base URL of this service, used in artifact URLs
    #[arg(long, env = "FAS_URL")]
    public_url: Option<Url>,

    /// Word-cloud rendering endpoint
    #[arg(long, env = "WORDCLOUD_API_URL", default_value = WordCloudConfig::DEFAULT_API_URL)]
    wordcloud_url: Url,
}

#[derive(clap::Args, Debug)]
struct GatewayArgs {
    /// Host to bind to
    #[arg(long, env = "TEXTCLOUD_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "GATEWAY_PORT", default_value_t = GATEWAY_DEFAULT_PORT)]
    port: u16,

    /// Base URL of the storage service
    #[arg(long, env = "FSS_URL", default_value = "http://127.0.0.1:8001")]
    storage_url: Url,

    /// Base URL of the analysis service
    #[arg(long, env = "FAS_URL", default_value = "http://127.0.0.1:8002")]
    analysis_url: Url,
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(path) => Ok(path),
        None => dirs::data_dir()
            .map(|dir| dir.join(AppConfig::DATA_DIR_NAME))
            .ok_or_else(|| anyhow!("No platform data directory; pass --data-dir")),
    }
}

fn local_url(host: &str, port: u16) -> Result<Url> {
    Ok(Url::parse(&format!("http://{}:{}", host, port))?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    info!("Starting {}", AppConfig::APP_NAME);

    let addr = match args.service {
        Service::Storage(args) => {
            let data_dir = resolve_data_dir(args.data_dir)?;
            let public_url = match args.public_url {
                Some(url) => url,
                None => local_url(&args.host, args.port)?,
            };

            let mut settings = StorageSettings::new(data_dir, public_url);
            settings.analysis_url = args.analysis_url;

            let api = StorageApi::new(settings).await?;
            start_storage_server(api, &args.host, args.port).await?
        }
        Service::Analysis(args) => {
            let data_dir = resolve_data_dir(args.data_dir)?;
            let public_url = match args.public_url {
                Some(url) => url,
                None => local_url(&args.host, args.port)?,
            };

            let settings = AnalysisSettings::new(data_dir, public_url, args.wordcloud_url);
            let api = AnalysisApi::new(settings).await?;
            start_analysis_server(api, &args.host, args.port).await?
        }
        Service::Gateway(args) => {
            info!(
                "Relaying to storage at {} and analysis at {}",
                args.storage_url, args.analysis_url
            );
            let state = GatewayState::new(args.storage_url, args.analysis_url)?;
            start_gateway_server(state, &args.host, args.port).await?
        }
    };

    info!("Running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
