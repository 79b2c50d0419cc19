use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "VIDFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/vidfetch.toml";
const ENV_PREFIX: &str = "VIDFETCH";
const ENV_SEPARATOR: &str = "__";

/// Resolve the configuration file path: `VIDFETCH_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is the normal case
    let _ = dotenvy::dotenv();

    load_from_sources(default_path())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "Configuration file not found, using defaults and environment overrides"
        );
    }

    // VIDFETCH__JOBS__TIMEOUT -> jobs.timeout
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:5000");
        assert_eq!(config.extractor.binary, PathBuf::from("yt-dlp"));
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
max_payload_bytes = "16KB"

[storage]
videos_dir = "/srv/videos"
public_prefix = "/media"

[jobs]
timeout = "15m"
default_quality = "480p"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.max_payload_bytes.as_u64(), 16 * 1024);
        assert_eq!(config.storage.videos_dir, PathBuf::from("/srv/videos"));
        assert_eq!(config.storage.public_prefix, "/media");
        assert_eq!(config.storage.media_extension, "mp4");
        assert_eq!(config.jobs.timeout.as_secs(), 900);
        assert_eq!(config.jobs.default_quality, "480p");
    }

    #[test]
    fn test_extractor_profiles_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[extractor]
binary = "/opt/bin/yt-dlp"
fallback_clients = ["tv", "web"]

[extractor.probe.primary]
timeout = "20s"
socket_timeout = 10
retries = 1

[extractor.probe.fallback]
timeout = "15s"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.extractor.binary, PathBuf::from("/opt/bin/yt-dlp"));
        assert_eq!(config.extractor.fallback_clients, vec!["tv", "web"]);
        assert_eq!(config.extractor.probe.primary.timeout.as_secs(), 20);
        assert_eq!(config.extractor.probe.primary.socket_timeout.unwrap().as_secs(), 10);
        assert_eq!(config.extractor.probe.fallback.retries, None);
        // untouched stage keeps its defaults
        assert_eq!(config.extractor.download.primary.timeout.as_secs(), 180);
    }
}
