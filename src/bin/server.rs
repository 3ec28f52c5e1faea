//! `speechmod-server`: HTTP control surface over the speech pipeline.
//!
//! ```text
//! speechmod-server --config settings.json --port 5870
//! curl -X POST localhost:5870/speak -d '{"text":"Hello there."}' -H 'content-type: application/json'
//! ```

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use speechmod::{server, Settings, SettingsHandle, Speech};

#[derive(Debug, Parser)]
#[command(name = "speechmod-server", version, about = "HTTP control server for speechmod")]
struct Args {
    /// Settings JSON file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 5870)]
    port: u16,

    /// Log filter, e.g. `speechmod=debug,tower_http=debug`.
    #[arg(long, default_value = "speechmod=info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log);

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let speech = Speech::start_detected(SettingsHandle::new(settings))
        .await
        .context("speech backend unavailable")?;
    info!(backend = speech.backend_name(), "speech pipeline started");

    let speech = Arc::new(speech);
    let app = server::router(Arc::clone(&speech));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    match Arc::try_unwrap(speech) {
        Ok(speech) => speech.shutdown().await,
        Err(speech) => speech.stop(),
    }
    info!("server shutdown complete");
    Ok(())
}

fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
