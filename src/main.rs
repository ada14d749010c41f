mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use reelvault::av::ToolRegistry;
use reelvault::{config, server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults off the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelvault=trace,tower_http=debug".to_string()
        } else {
            "reelvault=debug,tower_http=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .init();

    let config = config::load(&cli.config)?;

    let tools = ToolRegistry::discover();
    let repos = server::build_repositories(&config, &tools).await?;
    let state = server::AppState::new(repos);

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.http.host)
        .await
        .with_context(|| format!("failed to bind {}", config.http.host))?;
    tracing::info!(addr = %config.http.host, "listening for http requests");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server errored");

    tracing::info!("shutting down gracefully");
    state.close_all().await;

    result
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
}
