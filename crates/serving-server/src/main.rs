use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serving_runtime::{load_engine_config, BeamOutput, GenerationEngine};
use serving_server::{run_server, AppState, ServerConfig};
use tracing_subscriber::EnvFilter;

/// Serve every model under a model directory over HTTP.
#[derive(Parser, Debug)]
#[command(name = "serving-server", version, about)]
struct Args {
    /// Directory with one subdirectory per model.
    #[arg(long)]
    model_dir: PathBuf,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Model used when a request omits `model_name`.
    #[arg(long)]
    default_model: Option<String>,

    /// Decode slots shared by all requests (overrides serving.json).
    #[arg(long)]
    max_concurrent_requests: Option<usize>,

    /// Evict streaming sessions idle for this many milliseconds.
    #[arg(long)]
    session_idle_timeout_ms: Option<u64>,

    /// Return every beam from blocking beam-search requests.
    #[arg(long)]
    all_beams: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = load_engine_config(&args.model_dir)?;
    if let Some(n) = args.max_concurrent_requests {
        config = config.with_max_concurrent_requests(n);
    }
    if let Some(ms) = args.session_idle_timeout_ms {
        config = config.with_session_idle_timeout(Duration::from_millis(ms));
    }
    if args.all_beams {
        config = config.with_beam_output(BeamOutput::All);
    }

    let engine = Arc::new(GenerationEngine::init_with_config(&args.model_dir, config)?);
    let state = AppState::new(
        Arc::clone(&engine),
        ServerConfig {
            default_model: args.default_model,
        },
    );

    run_server(state, args.addr, shutdown_signal()).await?;

    engine.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
