use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use certwatch_core::{config, Config};
use certwatch_server::{jobs, router, AppState};

#[derive(Debug, Parser)]
#[command(name = "certwatch-server", about = "SSL certificate monitoring backend")]
struct Args {
    /// Environment file to load before reading configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match &args.env_file {
        Some(path) => dotenvy::from_path(path)?,
        None => config::load_dotenv()?,
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.log_summary();

    let state = AppState::build(config)?;
    jobs::register_standard_jobs(&state).await?;
    state.executor.start().await;
    state.scheduler.start().await;

    let addr = state.config.server.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    let app = router::build_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    state.scheduler.stop().await;
    state.executor.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    }
}
