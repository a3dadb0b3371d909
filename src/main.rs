// repofeed binary.
// Loads configuration, starts the background refresh, and serves the listing over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use repofeed::{Config, RepoFeed, server};

#[derive(Parser, Debug)]
#[command(name = "repofeed", version, about = "Cached GitHub repository listing")]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long, env = "REPOFEED_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file and PORT.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config =
        Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    tracing::info!(
        owner = %config.owner,
        authenticated = config.is_authenticated(),
        rate_limit = config.rate_limit,
        rate_limit_window_secs = config.rate_limit_window.as_secs(),
        cache_secs = config.cache_duration.as_secs(),
        refresh_secs = config.refresh_interval.as_secs(),
        "starting repofeed"
    );

    let feed = Arc::new(RepoFeed::new(&config).context("failed to build GitHub client")?);

    let cancel = CancellationToken::new();
    let refresher = feed.spawn_background_refresh(cancel.clone());

    let app = server::router(Arc::clone(&feed), config.cors_origin.as_deref())
        .context("failed to build router")?;
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!(addr = %config.listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    cancel.cancel();
    if let Err(e) = refresher.await {
        tracing::warn!(error = %e, "background refresh task ended abnormally");
    }

    tracing::info!("repofeed shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
