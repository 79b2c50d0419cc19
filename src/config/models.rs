use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub jobs: JobConfig,
    #[serde(default)]
    pub events: EventConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound for the submit request body
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024)
}

/// Permanent store and working area locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_videos_dir")]
    pub videos_dir: PathBuf,
    /// Parent directory for the scratch area; the system temp dir when unset
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// URL path under which stored videos are served
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    #[serde(default = "default_media_extension")]
    pub media_extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            videos_dir: default_videos_dir(),
            work_dir: None,
            public_prefix: default_public_prefix(),
            media_extension: default_media_extension(),
        }
    }
}

fn default_videos_dir() -> PathBuf {
    PathBuf::from("videos")
}

fn default_public_prefix() -> String {
    "/video".to_string()
}

fn default_media_extension() -> String {
    "mp4".to_string()
}

/// External extraction tool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Player clients requested by the primary identity
    #[serde(default = "default_primary_client")]
    pub primary_client: String,
    /// Delivery protocols the primary identity asks the extractor to skip
    #[serde(default = "default_skip_protocols")]
    pub skip_protocols: Vec<String>,
    /// User agent presented by the primary identity
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
    /// Identities tried in order after the primary one fails
    #[serde(default = "default_fallback_clients")]
    pub fallback_clients: Vec<String>,
    #[serde(default = "StageProfiles::probe_defaults")]
    pub probe: StageProfiles,
    #[serde(default = "StageProfiles::download_defaults")]
    pub download: StageProfiles,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            primary_client: default_primary_client(),
            skip_protocols: default_skip_protocols(),
            user_agent: default_user_agent(),
            fallback_clients: default_fallback_clients(),
            probe: StageProfiles::probe_defaults(),
            download: StageProfiles::download_defaults(),
        }
    }
}

fn default_binary() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_primary_client() -> String {
    "android,web".to_string()
}

fn default_skip_protocols() -> Vec<String> {
    vec!["dash".to_string(), "hls".to_string()]
}

fn default_user_agent() -> Option<String> {
    Some("Mozilla/5.0 (Linux; Android 11; SM-G973F) AppleWebKit/537.36".to_string())
}

fn default_fallback_clients() -> Vec<String> {
    ["web", "ios", "mweb"].map(String::from).to_vec()
}

/// Attempt profiles for one extraction stage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageProfiles {
    pub primary: AttemptProfile,
    pub fallback: AttemptProfile,
}

impl StageProfiles {
    pub fn probe_defaults() -> Self {
        Self {
            primary: AttemptProfile {
                timeout: HumanDuration::from_secs(45),
                socket_timeout: Some(HumanDuration::from_secs(30)),
                retries: Some(2),
                ..AttemptProfile::default()
            },
            fallback: AttemptProfile {
                timeout: HumanDuration::from_secs(30),
                ..AttemptProfile::default()
            },
        }
    }

    pub fn download_defaults() -> Self {
        Self {
            primary: AttemptProfile {
                timeout: HumanDuration::from_secs(180),
                socket_timeout: Some(HumanDuration::from_secs(45)),
                retries: Some(2),
                fragment_retries: Some(2),
                retry_sleep: Some(HumanDuration::from_secs(2)),
                extra_args: vec!["--no-continue".to_string(), "--geo-bypass".to_string()],
            },
            fallback: AttemptProfile {
                timeout: HumanDuration::from_secs(300),
                socket_timeout: None,
                retries: Some(2),
                fragment_retries: Some(2),
                retry_sleep: Some(HumanDuration::from_secs(1)),
                extra_args: Vec::new(),
            },
        }
    }
}

/// Bounds applied to a single invocation of the external tool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttemptProfile {
    /// Hard wall-clock limit for the child process
    pub timeout: HumanDuration,
    #[serde(default)]
    pub socket_timeout: Option<HumanDuration>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub fragment_retries: Option<u32>,
    #[serde(default)]
    pub retry_sleep: Option<HumanDuration>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for AttemptProfile {
    fn default() -> Self {
        Self {
            timeout: HumanDuration::from_secs(30),
            socket_timeout: None,
            retries: None,
            fragment_retries: None,
            retry_sleep: None,
            extra_args: Vec::new(),
        }
    }
}

/// Job lifecycle configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    /// Limit for the whole probe/fetch/finalize sequence
    #[serde(default = "default_job_timeout")]
    pub timeout: HumanDuration,
    #[serde(default = "default_quality")]
    pub default_quality: String,
    /// Accepted source URLs
    #[serde(default = "default_url_pattern")]
    pub url_pattern: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeout: default_job_timeout(),
            default_quality: default_quality(),
            url_pattern: default_url_pattern(),
        }
    }
}

fn default_job_timeout() -> HumanDuration {
    HumanDuration::from_secs(600)
}

fn default_quality() -> String {
    "720p".to_string()
}

fn default_url_pattern() -> String {
    r"^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+".to_string()
}

/// Event channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    /// Recent events kept for late subscribers
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: HumanDuration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            replay_capacity: default_replay_capacity(),
            keep_alive: default_keep_alive(),
        }
    }
}

fn default_replay_capacity() -> usize {
    1024
}

fn default_keep_alive() -> HumanDuration {
    HumanDuration::from_secs(15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:5000");
        assert_eq!(config.server.max_payload_bytes.as_u64(), 64 * 1024);
        assert_eq!(config.storage.public_prefix, "/video");
        assert_eq!(config.extractor.fallback_clients, vec!["web", "ios", "mweb"]);
        assert_eq!(config.extractor.probe.primary.timeout.as_secs(), 45);
        assert_eq!(config.extractor.download.fallback.timeout.as_secs(), 300);
        assert_eq!(config.jobs.timeout.as_secs(), 600);
        assert_eq!(config.jobs.default_quality, "720p");
    }

    #[test]
    fn test_download_primary_carries_extra_flags() {
        let profiles = StageProfiles::download_defaults();
        assert_eq!(profiles.primary.extra_args, vec!["--no-continue", "--geo-bypass"]);
        assert!(profiles.fallback.extra_args.is_empty());
        assert_eq!(profiles.fallback.retry_sleep, Some(HumanDuration::from_secs(1)));
    }
}
