use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relief::api::{self, AppState};
use relief::config::Config;
use relief::engine::Engine;
use relief::raster::FsOpener;
use relief::registry::Registry;

#[derive(Parser, Debug)]
#[command(
    name = "relief",
    version,
    about = "Read-only elevation API over tiled raster datasets"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "relief.toml")]
    config: PathBuf,

    /// Listen address override, e.g. 127.0.0.1:5000
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&args.config)?;
    let addr = args
        .listen
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    info!(config = %args.config.display(), "loading datasets");
    let started = Instant::now();
    let registry = Registry::load(&config, Arc::new(FsOpener))?;
    info!(
        datasets = registry.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "registry ready"
    );

    let state = Arc::new(AppState {
        engine: Engine::new(registry),
        max_locations: config.max_locations_per_request,
    });
    let app = api::router(state, config.access_control_allow_origin.as_deref());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install ctrl-c handler");
    }
}
