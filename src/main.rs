use anyhow::{Context, Result};
use clap::Parser;
use loqa_capture::{create_router, AppState, BackendInput, Config, NatsClient};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Continuous segmented audio capture service
#[derive(Parser, Debug)]
#[command(name = "loqa-capture", version)]
struct Args {
    /// Config file path (extension optional)
    #[arg(short, long, default_value = "config/loqa-capture")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Loqa Capture v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Audio source: {}", cfg.capture.source);
    info!(
        "Segment duration: {}s, recordings in {}",
        cfg.capture.segment_duration_secs,
        cfg.storage.recordings_dir().display()
    );

    let input = BackendInput::new(cfg.capture.audio_source())
        .with_buffer_duration_ms(cfg.capture.buffer_duration_ms);

    let mut state = AppState::new(Arc::new(input), cfg.capture.clone(), cfg.storage.clone());
    if cfg.nats.enabled {
        match NatsClient::connect(&cfg.nats.url).await {
            Ok(client) => state = state.with_nats(client),
            Err(e) => warn!("NATS unavailable, segments go to disk only: {:#}", e),
        }
    }

    let app = create_router(state.clone());
    let addr = cfg.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("HTTP server failed")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Shutting down...");
    let discarded = state.discard_all().await;
    if discarded > 0 {
        warn!("Discarded {} unfinished recording(s)", discarded);
    }
}
