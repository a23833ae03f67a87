//! toolgate binary: load config, bring up the upstream fleet, build the
//! index, and serve HTTP.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use toolgate::{
    config::AppConfig,
    index::ToolIndex,
    providers::{build_chat_provider, build_embedding_provider},
    server::{create_router, AppState},
};
use toolgate_mcp::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "toolgate", version, about = "MCP tool-aggregation gateway")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, env = "TOOLGATE_CONFIG", default_value = "toolgate.yaml")]
    config: String,

    /// Override the listen host from the config file
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port from the config file
    #[arg(long)]
    port: Option<u16>,

    /// Raise log verbosity to debug
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = AppConfig::from_file(&cli.config).await?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let shutdown = CancellationToken::new();

    let supervisor = Arc::new(Supervisor::new(config.upstream())?);
    let (started, total) = supervisor.start_all(&shutdown).await;
    info!(started, total, "upstream servers started");

    let embeddings = build_embedding_provider(&config.embedding);
    let chat = if config.index.use_enhanced_phrase_generation {
        Some(build_chat_provider(&config.chat))
    } else {
        None
    };

    let index = Arc::new(ToolIndex::new(
        Arc::clone(&supervisor) as Arc<dyn toolgate::UpstreamHub>,
        embeddings,
        chat,
        config.index.clone(),
        config.chat.temperature,
    ));

    match index.refresh(&shutdown).await {
        Ok(stats) => info!(
            indexed = stats.tools_indexed,
            skipped = stats.tools_skipped,
            "initial index build complete"
        ),
        Err(e) => warn!(error = %e, "initial index build failed; search will be empty until refresh"),
    }

    let state = AppState {
        index: Arc::clone(&index),
        cancel: shutdown.clone(),
    };
    let router = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "toolgate listening; MCP endpoint at /mcp");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await?;

    info!("shutting down upstream sessions");
    supervisor
        .stop_all(Duration::from_secs(config.shutdown_grace_secs))
        .await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
