use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden_server::{
    create_app,
    infra::{
        app_state::AppState,
        config::{Config, ConfigLoad, ConfigLoader},
        history::JsonFileHistoryStore,
        jobs::{JobControlPlane, JobStoreSettings},
        notify::{Notifier, WebhookSink},
        upstream::HttpItemProcessor,
    },
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "warden-server")]
#[command(about = "Batch verification orchestrator with live job streams")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "WARDEN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Path to a .env file loaded before reading the environment
    #[arg(long, env = "WARDEN_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(load_runtime_config(&cli)?);

    let processor = HttpItemProcessor::from_config(&config.upstream)
        .context("failed to build upstream item processor")?;
    let history = JsonFileHistoryStore::new(config.history.path.clone());
    let notifier = if config.notifier.enabled {
        Notifier::new(Arc::new(WebhookSink::new()), config.notifier.timeout)
    } else {
        Notifier::disabled()
    };

    let jobs = JobControlPlane::new(
        Arc::new(processor),
        Arc::new(history),
        notifier,
        JobStoreSettings::from(&config.jobs),
    );
    let state = AppState::new(Arc::clone(&config), jobs);
    let app = create_app(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "warden server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("warden server stopped");
    Ok(())
}

fn load_runtime_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host.clone() {
        config.server.host = host;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "info,jobs::summary=info,tower_http=warn".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(
                    message = %warning.message,
                    hint = %hint,
                    "configuration warning"
                )
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        jobs.idle_retention =
            %humantime::format_duration(config.jobs.idle_retention),
        jobs.event_buffer = config.jobs.event_buffer,
        jobs.max_queue_len = config.jobs.max_queue_len,
        upstream.valuation = config.upstream.valuation_url.is_some(),
        notifier.enabled = config.notifier.enabled,
        history.path = %config.history.path.display(),
        "job configuration in effect"
    );

    Ok(config)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
