//! vugrud: the Vugru music generation daemon.
//!
//! Serves the [`GenerationOrchestrator`](vugru::GenerationOrchestrator)
//! over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vugru::VugruError;
use vugru::server::config::{Config, Secrets};
use vugru::server::{AppState, StaticTokenAuthenticator, router};

/// Vugru daemon, serving music generation over HTTP.
#[derive(Parser)]
#[command(name = "vugrud")]
#[command(version = vugru::PKG_VERSION)]
#[command(about = "Vugru music generation daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "VUGRU_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to, overriding the config file.
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vugru=info,vugrud=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let api_key = secrets.elevenlabs_api_key().ok_or_else(|| {
        VugruError::Configuration(
            "No ElevenLabs API key. Set [elevenlabs] api_key in secrets.toml or ELEVENLABS_API_KEY"
                .to_string(),
        )
    })?;
    let orchestrator = Arc::new(config.orchestrator_builder().elevenlabs(api_key).build()?);

    if let Some(interval) = config.sweep_interval() {
        orchestrator.spawn_sweeper(interval);
    }

    let auth = StaticTokenAuthenticator::new(secrets.token_identities());
    if auth.is_empty() {
        warn!("no bearer tokens configured; every generation request will be rejected");
    }

    let address = args.address.unwrap_or(config.server.address);
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| VugruError::Configuration(format!("Invalid address {address:?}: {e}")))?;

    info!(version = vugru::version_string(), %addr, "vugrud starting");

    let app = router(AppState::new(orchestrator, Arc::new(auth)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
