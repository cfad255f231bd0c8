use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use servicebridge::config::Config;
use servicebridge::notifications::WebPushSender;
use servicebridge::store::{GoTrueAuth, RestClient, RestStore};
use servicebridge::AppState;

#[derive(Parser, Debug)]
#[command(name = "servicebridge")]
#[command(author, version, about = "Lead forwarding, web push and page sessions for service-to-sales teams", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "servicebridge.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ServiceBridge v{}", env!("CARGO_PKG_VERSION"));

    if !config.store.is_configured() {
        tracing::warn!("Data store URL or service key missing; store calls will fail");
    }

    let client = RestClient::new(&config.store);
    let store = Arc::new(RestStore::new(client.clone()));
    let auth = Arc::new(GoTrueAuth::new(client));
    let mailer = servicebridge::mail::from_config(&config.mail);

    let mut state = AppState::new(config.clone(), auth, store.clone(), store, mailer);

    if config.push.is_configured() {
        let sender = WebPushSender::new(&config.push).context("Invalid VAPID configuration")?;
        state = state.with_push(Arc::new(sender));
    } else {
        tracing::warn!("VAPID keys not configured; push notifications disabled");
    }

    let handle = servicebridge::api::metrics::init_metrics()?;
    let state = Arc::new(state.with_metrics(handle));

    let app = servicebridge::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
