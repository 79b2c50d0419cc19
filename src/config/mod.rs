//! Configuration management for vidfetch
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use vidfetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `VIDFETCH__<section>__<key>`:
//! - `VIDFETCH__SERVER__BIND_ADDR=127.0.0.1:8000`
//! - `VIDFETCH__JOBS__TIMEOUT=15m`
//! - `VIDFETCH__STORAGE__VIDEOS_DIR=/srv/videos`
//!
//! # Configuration File
//!
//! Loaded from `config/vidfetch.toml` unless `VIDFETCH_CONFIG` points elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    AttemptProfile, Config, EventConfig, ExtractorConfig, JobConfig, ServerConfig,
    StageProfiles, StorageConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load from an explicit path when given, otherwise from the default sources
    pub fn load_with_override(path: Option<std::path::PathBuf>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Validate an already assembled configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}
