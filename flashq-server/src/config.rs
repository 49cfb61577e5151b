//! Runtime settings for flashq-server
//!
//! Resolution priority per key: command-line flag, then environment variable
//! (both captured by [`Overrides`]), then the TOML config file, then the
//! compiled default.

use clap::Args;
use flashq_common::config::{default_database_path, TomlConfig};
use flashq_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_GENERATION_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GENERATION_MODEL: &str = "gpt-5-mini";

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Address to bind
    #[arg(long, env = "FLASHQ_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "FLASHQ_PORT")]
    pub port: Option<u16>,

    /// SQLite database file
    #[arg(long, env = "FLASHQ_DATABASE")]
    pub database: Option<PathBuf>,

    /// Course corpus directory
    #[arg(long, env = "FLASHQ_CONTENT_DIR")]
    pub content_dir: Option<PathBuf>,

    /// Ingest the corpus before serving
    #[arg(long, env = "FLASHQ_INGEST_ON_STARTUP")]
    pub ingest_on_startup: Option<bool>,

    /// Per-user outbound event queue size
    #[arg(long, env = "FLASHQ_EVENT_QUEUE_CAPACITY")]
    pub event_queue_capacity: Option<usize>,

    /// Seconds in-flight requests get to finish on shutdown
    #[arg(long, env = "FLASHQ_SHUTDOWN_GRACE_SECS")]
    pub shutdown_grace_secs: Option<u64>,

    /// Enable recommendation generation
    #[arg(long, env = "FLASHQ_GENERATION_ENABLED")]
    pub generation_enabled: Option<bool>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "FLASHQ_GENERATION_BASE_URL")]
    pub generation_base_url: Option<String>,

    /// API key for the generation backend
    #[arg(long, env = "FLASHQ_GENERATION_API_KEY", hide_env_values = true)]
    pub generation_api_key: Option<String>,

    /// Model name sent to the generation backend
    #[arg(long, env = "FLASHQ_GENERATION_MODEL")]
    pub generation_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub content_dir: Option<PathBuf>,
    pub ingest_on_startup: bool,
    pub event_queue_capacity: usize,
    pub shutdown_grace: Duration,
    pub generation: GenerationSettings,
}

impl Settings {
    /// Merge overrides over the config file over defaults
    pub fn resolve(overrides: Overrides, file: TomlConfig) -> Result<Self> {
        let generation = GenerationSettings {
            enabled: overrides
                .generation_enabled
                .or(file.generation.enabled)
                .unwrap_or(true),
            base_url: overrides
                .generation_base_url
                .or(file.generation.base_url)
                .unwrap_or_else(|| DEFAULT_GENERATION_BASE_URL.to_string()),
            api_key: overrides
                .generation_api_key
                .or(file.generation.api_key)
                .filter(|k| !k.trim().is_empty()),
            model: overrides
                .generation_model
                .or(file.generation.model)
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
        };

        let settings = Settings {
            host: overrides
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            database: overrides
                .database
                .or(file.database)
                .unwrap_or_else(default_database_path),
            content_dir: overrides.content_dir.or(file.content_dir),
            ingest_on_startup: overrides
                .ingest_on_startup
                .or(file.ingest_on_startup)
                .unwrap_or(true),
            event_queue_capacity: overrides
                .event_queue_capacity
                .or(file.event_queue_capacity)
                .unwrap_or(DEFAULT_EVENT_QUEUE_CAPACITY),
            shutdown_grace: Duration::from_secs(
                overrides
                    .shutdown_grace_secs
                    .or(file.shutdown_grace_secs)
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
            generation,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.event_queue_capacity == 0 {
            return Err(Error::Config(
                "event_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.generation.enabled && self.generation.model.trim().is_empty() {
            return Err(Error::Config("generation model must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Log the effective settings (API key redacted)
    pub fn log_summary(&self) {
        info!("Database: {}", self.database.display());
        match &self.content_dir {
            Some(dir) => info!("Content directory: {}", dir.display()),
            None => info!("Content directory: not configured"),
        }
        if self.generation.enabled {
            info!(
                "Generation: {} via {}",
                self.generation.model, self.generation.base_url
            );
            if self.generation.api_key.is_none() {
                warn!("Generation enabled without an API key");
            }
        } else {
            info!("Generation: disabled");
        }
    }
}
