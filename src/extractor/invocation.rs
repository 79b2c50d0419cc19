//! Command-line contract of the external extraction tool.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{AttemptProfile, ExtractorConfig};

/// What an invocation is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Metadata,
    Media,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Purpose::Metadata => f.write_str("metadata"),
            Purpose::Media => f.write_str("media"),
        }
    }
}

/// Emulated client profile presented to the upstream service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Short name used in logs, e.g. `android,web` or `ios`
    pub label: String,
    pub extractor_args: String,
    pub user_agent: Option<String>,
}

impl ClientIdentity {
    pub fn primary(config: &ExtractorConfig) -> Self {
        let mut extractor_args = format!("youtube:player_client={}", config.primary_client);
        if !config.skip_protocols.is_empty() {
            extractor_args.push_str(";skip=");
            extractor_args.push_str(&config.skip_protocols.join(","));
        }

        Self {
            label: config.primary_client.clone(),
            extractor_args,
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn fallback(client: &str) -> Self {
        Self {
            label: client.to_string(),
            extractor_args: format!("youtube:player_client={client}"),
            user_agent: None,
        }
    }

    /// Primary identity followed by the configured fallbacks, in order
    pub fn chain(config: &ExtractorConfig) -> Vec<Self> {
        std::iter::once(Self::primary(config))
            .chain(config.fallback_clients.iter().map(|c| Self::fallback(c)))
            .collect()
    }
}

/// One fully specified call of the external tool
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub purpose: Purpose,
    pub client: ClientIdentity,
    pub url: String,
    /// `-f` value; media only
    pub format: Option<String>,
    /// `-o` value; media only
    pub output_template: Option<PathBuf>,
    pub socket_timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub retry_sleep: Option<Duration>,
    pub extra_args: Vec<String>,
    /// Wall-clock bound enforced by the runner
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn metadata(url: &str, client: ClientIdentity, profile: &AttemptProfile) -> Self {
        Self::with_profile(Purpose::Metadata, url, client, profile)
    }

    pub fn media(
        url: &str,
        client: ClientIdentity,
        profile: &AttemptProfile,
        format: String,
        output_template: PathBuf,
    ) -> Self {
        let mut invocation = Self::with_profile(Purpose::Media, url, client, profile);
        invocation.format = Some(format);
        invocation.output_template = Some(output_template);
        invocation
    }

    fn with_profile(
        purpose: Purpose,
        url: &str,
        client: ClientIdentity,
        profile: &AttemptProfile,
    ) -> Self {
        Self {
            purpose,
            client,
            url: url.to_string(),
            format: None,
            output_template: None,
            socket_timeout: profile.socket_timeout.map(Into::into),
            retries: profile.retries,
            fragment_retries: profile.fragment_retries,
            retry_sleep: profile.retry_sleep.map(Into::into),
            extra_args: profile.extra_args.clone(),
            timeout: profile.timeout.into(),
        }
    }

    /// Argument vector, without the program name
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        match self.purpose {
            Purpose::Metadata => {
                args.push("--dump-json".to_string());
                args.push("--no-download".to_string());
            }
            Purpose::Media => {
                if let Some(format) = &self.format {
                    args.push("-f".to_string());
                    args.push(format.clone());
                }
                if let Some(template) = &self.output_template {
                    args.push("-o".to_string());
                    args.push(template.display().to_string());
                }
            }
        }

        args.push("--extractor-args".to_string());
        args.push(self.client.extractor_args.clone());
        if let Some(agent) = &self.client.user_agent {
            args.push("--user-agent".to_string());
            args.push(agent.clone());
        }
        args.push("--no-warnings".to_string());

        if let Some(timeout) = self.socket_timeout {
            args.push("--socket-timeout".to_string());
            args.push(timeout.as_secs().max(1).to_string());
        }
        if let Some(retries) = self.retries {
            args.push("--retries".to_string());
            args.push(retries.to_string());
        }
        if let Some(retries) = self.fragment_retries {
            args.push("--fragment-retries".to_string());
            args.push(retries.to_string());
        }
        if let Some(sleep) = self.retry_sleep {
            args.push("--retry-sleep".to_string());
            args.push(sleep.as_secs().to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args.push(self.url.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageProfiles;

    const URL: &str = "https://youtu.be/abc123";

    #[test]
    fn test_primary_identity_matches_defaults() {
        let identity = ClientIdentity::primary(&ExtractorConfig::default());
        assert_eq!(
            identity.extractor_args,
            "youtube:player_client=android,web;skip=dash,hls"
        );
        assert!(identity.user_agent.is_some());
    }

    #[test]
    fn test_chain_order() {
        let labels: Vec<String> = ClientIdentity::chain(&ExtractorConfig::default())
            .into_iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(labels, vec!["android,web", "web", "ios", "mweb"]);
    }

    #[test]
    fn test_primary_probe_args() {
        let config = ExtractorConfig::default();
        let invocation = ToolInvocation::metadata(
            URL,
            ClientIdentity::primary(&config),
            &StageProfiles::probe_defaults().primary,
        );

        let args = invocation.to_args();
        assert_eq!(&args[..2], ["--dump-json", "--no-download"]);
        let joined = args.join(" ");
        assert!(joined.contains("--socket-timeout 30"));
        assert!(joined.contains("--retries 2"));
        assert_eq!(args.last().map(String::as_str), Some(URL));
        assert_eq!(invocation.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_fallback_probe_args_are_minimal() {
        let invocation = ToolInvocation::metadata(
            URL,
            ClientIdentity::fallback("ios"),
            &StageProfiles::probe_defaults().fallback,
        );

        assert_eq!(
            invocation.to_args(),
            vec![
                "--dump-json",
                "--no-download",
                "--extractor-args",
                "youtube:player_client=ios",
                "--no-warnings",
                URL,
            ]
        );
    }

    #[test]
    fn test_primary_media_args() {
        let config = ExtractorConfig::default();
        let invocation = ToolInvocation::media(
            URL,
            ClientIdentity::primary(&config),
            &StageProfiles::download_defaults().primary,
            "best/worst".to_string(),
            PathBuf::from("/tmp/work/%(id)s.%(ext)s"),
        );

        let args = invocation.to_args();
        assert_eq!(&args[..4], ["-f", "best/worst", "-o", "/tmp/work/%(id)s.%(ext)s"]);
        let joined = args.join(" ");
        assert!(joined.contains("--socket-timeout 45"));
        assert!(joined.contains("--fragment-retries 2"));
        assert!(joined.contains("--retry-sleep 2"));
        assert!(joined.contains("--no-continue --geo-bypass"));
        assert_eq!(invocation.timeout, Duration::from_secs(180));
    }
}
