//! mw-studio - MaestroWarmup studio service
//!
//! Serves the warm-up builder UI and its JSON API on localhost.
//! Default port: 5730

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use mw_common::config::{
    default_config_path, load_toml_config, resolve_api_key, write_toml_config, TomlConfig,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mw_studio::audio::CpalSink;
use mw_studio::gemini::GeminiClient;
use mw_studio::{build_router, AppState, Studio};

/// Command-line arguments for mw-studio
#[derive(Parser, Debug)]
#[command(name = "mw-studio")]
#[command(about = "Classroom warm-up builder for language teachers")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "MW_STUDIO_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides config file)
    #[arg(short, long, env = "MW_STUDIO_BIND")]
    bind: Option<String>,

    /// Path to TOML config file
    #[arg(short, long, env = "MW_CONFIG")]
    config: Option<PathBuf>,

    /// List audio output devices and exit
    #[arg(long)]
    list_audio_devices: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TomlConfig::default(),
    };

    init_tracing(&config)?;

    // Build identification immediately after tracing init
    info!(
        "Starting MaestroWarmup studio (mw-studio) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) if path.exists() => info!("Config file: {}", path.display()),
        Some(path) => info!("Config file: {} (not found, using defaults)", path.display()),
        None => info!("No config directory available, using defaults"),
    }

    if args.init_config {
        let path = config_path.context("No config path available; pass --config")?;
        if path.exists() {
            anyhow::bail!("Config file {} already exists", path.display());
        }
        write_toml_config(&config, &path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    if args.list_audio_devices {
        for name in CpalSink::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let api_key = match resolve_api_key(&config) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!("{}", e);
            warn!("AI features will fail until an API key is configured");
            None
        }
    };
    let api_key_configured = api_key.is_some();

    let backend = GeminiClient::from_config(&config, api_key)
        .context("Failed to create Gemini client")?;
    let sink = CpalSink::new(config.audio_device.clone());
    info!(
        metadata = %config.models.metadata,
        generation = %config.models.generation,
        speech = %config.models.speech,
        voice = %config.voice,
        "Models configured"
    );

    let studio = Studio::new(&config, Arc::new(backend), Arc::new(sink));
    let app = build_router(AppState::new(studio, api_key_configured));

    let port = args.port.unwrap_or(config.port);
    let bind = args.bind.unwrap_or_else(|| config.bind_address.clone());
    let addr = format!("{}:{}", bind, port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("mw-studio listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Stderr logging plus an optional log file; `RUST_LOG` overrides the
/// configured level
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,mw_studio={0},mw_common={0},tower_http={0}",
            level
        ))
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
