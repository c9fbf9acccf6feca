//! mise-api - ingredient photos to recipes
//!
//! Startup order: logging (from the config file when it parses), config
//! validation, root folder, database, token secret, collaborators, then the
//! HTTP server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mise_api::{build_router, AppState};
use mise_common::auth::{resolve_token_secret, TokenSigner};
use mise_common::config::{
    database_path, resolve_root_folder, ConfigOverrides, LogFormat, LoggingConfig, TomlConfig,
};

/// Command-line arguments for mise-api
#[derive(Parser, Debug)]
#[command(name = "mise-api")]
#[command(about = "Turns photos of ingredients into recipes")]
#[command(version)]
struct Args {
    /// Root folder holding the database and temporary uploads
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, env = "MISE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MISE_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "MISE_BIND")]
    bind: Option<String>,

    /// Secret for signing access tokens
    #[arg(long, env = "MISE_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Access token lifetime in minutes
    #[arg(long, env = "MISE_TOKEN_EXPIRE_MINUTES")]
    token_expire_minutes: Option<i64>,

    /// API key for the generative text/vision service (falls back to OPENAI_API_KEY)
    #[arg(long, env = "MISE_OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "MISE_OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    /// Chat model used for recipe generation
    #[arg(long, env = "MISE_OPENAI_MODEL")]
    openai_model: Option<String>,

    /// Model used for ingredient recognition
    #[arg(long, env = "MISE_VISION_MODEL")]
    vision_model: Option<String>,

    /// URL of the local ingredient detection model
    #[arg(long, env = "MISE_LOCAL_DETECTOR_URL")]
    local_detector_url: Option<String>,

    /// Log output format: pretty or json
    #[arg(long, env = "MISE_LOG_FORMAT", value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(value: &str) -> std::result::Result<LogFormat, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format '{}', expected pretty or json", other)),
    }
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_address: self.bind.clone(),
            port: self.port,
            token_secret: self.token_secret.clone(),
            access_token_expire_minutes: self.token_expire_minutes,
            openai_api_key: self
                .openai_api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            openai_base_url: self.openai_base_url.clone(),
            openai_model: self.openai_model.clone(),
            vision_model: self.vision_model.clone(),
            local_detector_url: self.local_detector_url.clone(),
            log_format: self.log_format,
        }
    }
}

/// Logging settings to start with; a config file that failed to load falls
/// back to defaults so the failure itself still gets logged
fn startup_logging(
    loaded: &mise_common::Result<TomlConfig>,
    format: Option<LogFormat>,
) -> LoggingConfig {
    match loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig {
            format: format.unwrap_or_default(),
            ..LoggingConfig::default()
        },
    }
}

/// RUST_LOG wins over the configured level
fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=debug", level)));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = TomlConfig::load(args.config.as_deref())
        .map(|config| config.apply_overrides(args.overrides()));

    let logging = startup_logging(&loaded, args.log_format);
    init_tracing(&logging.level, logging.format);

    info!("Starting mise-api v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded.and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e).context("Invalid configuration");
        }
    };

    let root_folder =
        resolve_root_folder(args.root_folder.as_deref(), config.root_folder.as_deref());
    info!("Root folder: {}", root_folder.display());

    let db_path = database_path(&root_folder);
    let db = mise_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let secret = resolve_token_secret(&db, config.auth.token_secret.as_deref())
        .await
        .context("Failed to resolve token secret")?;
    let tokens = TokenSigner::new(secret, config.auth.access_token_expire_minutes);

    let state = AppState::from_config(db.clone(), tokens, &config, &root_folder)
        .context("Failed to initialize services")?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_logging_uses_loaded_config() {
        let config = TomlConfig::from_toml_str(
            r#"
            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        let logging = startup_logging(&Ok(config), Some(LogFormat::Pretty));
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, LogFormat::Json);
    }

    #[test]
    fn test_startup_logging_survives_broken_config() {
        let broken = TomlConfig::from_toml_str("[server\nport = ");
        assert!(broken.is_err());

        let logging = startup_logging(&broken, Some(LogFormat::Json));
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, LogFormat::Json);

        assert_eq!(startup_logging(&broken, None).format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!(parse_log_format(" JSON ").unwrap(), LogFormat::Json);
        assert!(parse_log_format("xml").is_err());
    }
}
