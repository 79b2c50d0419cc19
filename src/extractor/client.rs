use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::{AttemptFailure, ExtractError, ExtractionAttempt};
use super::invocation::{ClientIdentity, Purpose, ToolInvocation};
use super::metadata::VideoMetadata;
use super::quality::QualitySelector;
use super::runner::{InvocationError, ToolOutput, ToolRunner};
use crate::config::{AttemptProfile, ExtractorConfig, StageProfiles, StorageConfig};
use crate::observability::Metrics;
use crate::storage::{Artifact, ArtifactStore, StorageError, WorkArea};

/// Output template relative to the scratch directory
const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// Wraps the external tool: metadata probe, media fetch, and the
/// client-identity fallback chain shared by both
pub struct ExtractionClient {
    runner: Arc<dyn ToolRunner>,
    config: ExtractorConfig,
    store: ArtifactStore,
    work_area: WorkArea,
    metrics: Arc<Metrics>,
}

struct ChainSuccess {
    output: ToolOutput,
    attempts: Vec<ExtractionAttempt>,
}

impl ExtractionClient {
    pub fn new(
        extractor: &ExtractorConfig,
        storage: &StorageConfig,
        runner: Arc<dyn ToolRunner>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            runner,
            config: extractor.clone(),
            store: ArtifactStore::open(storage)?,
            work_area: WorkArea::create(storage.work_dir.as_deref())?,
            metrics,
        })
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Version string of the tool, or why it cannot be run
    pub async fn tool_version(&self) -> Result<String, InvocationError> {
        self.runner.version().await
    }

    /// Dump the video's metadata without downloading it
    pub async fn probe_metadata(&self, url: &str) -> Result<VideoMetadata, ExtractError> {
        let success = self
            .run_chain(
                Purpose::Metadata,
                &self.config.probe,
                |client, profile| ToolInvocation::metadata(url, client, profile),
                |primary| format!("Failed to get video info: {primary}"),
            )
            .await?;

        let metadata = VideoMetadata::from_json(&success.output.stdout)?;
        debug!(
            video_id = %metadata.id,
            duration = metadata.duration_secs(),
            attempts = success.attempts.len(),
            "Metadata probed"
        );
        Ok(metadata)
    }

    /// Download the media and promote it into the permanent store
    pub async fn fetch_media(
        &self,
        url: &str,
        video_id: &str,
        selector: &QualitySelector,
    ) -> Result<Artifact, ExtractError> {
        // Removed on return, whatever the outcome
        let scratch = self.work_area.scratch()?;
        let template = scratch.path().join(OUTPUT_TEMPLATE);
        let format = selector.to_format_arg();

        self.run_chain(
            Purpose::Media,
            &self.config.download,
            |client, profile| {
                ToolInvocation::media(url, client, profile, format.clone(), template.clone())
            },
            |_| "Download failed with all clients due to upstream restrictions".to_string(),
        )
        .await?;

        let produced = scratch
            .find_by_prefix(video_id)
            .await?
            .ok_or(ExtractError::ArtifactMissing)?;

        let filename = produced
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(ExtractError::ArtifactMissing)?;

        let artifact = self.store.promote(&produced, &filename).await?;
        info!(
            filename = %artifact.filename,
            size_bytes = artifact.size_bytes,
            "Download completed"
        );
        Ok(artifact)
    }

    /// Public location of a stored artifact, if it can be served
    pub fn public_url(&self, artifact: &Artifact) -> Option<String> {
        self.store.public_url(artifact)
    }

    /// Tries the primary identity, then each fallback, stopping at the first success
    async fn run_chain<B, M>(
        &self,
        purpose: Purpose,
        profiles: &StageProfiles,
        build: B,
        exhausted: M,
    ) -> Result<ChainSuccess, ExtractError>
    where
        B: Fn(ClientIdentity, &AttemptProfile) -> ToolInvocation,
        M: FnOnce(&AttemptFailure) -> String,
    {
        let mut attempts: Vec<ExtractionAttempt> = Vec::new();

        for (index, client) in ClientIdentity::chain(&self.config).into_iter().enumerate() {
            let is_fallback = index > 0;
            let profile = if is_fallback {
                &profiles.fallback
            } else {
                &profiles.primary
            };

            if is_fallback {
                self.metrics.fallback_attempted();
            }

            let invocation = build(client.clone(), profile);
            let failure = match self.runner.run(&invocation).await {
                Ok(output) if output.success => {
                    if is_fallback {
                        info!(%purpose, client = %client.label, "Fallback client succeeded");
                    }
                    attempts.push(ExtractionAttempt {
                        client,
                        purpose,
                        outcome: Ok(()),
                    });
                    return Ok(ChainSuccess { output, attempts });
                }
                Ok(output) => AttemptFailure::exit(output.exit_code, &output.stderr),
                Err(InvocationError::ToolMissing(path)) => {
                    return Err(ExtractError::DependencyUnavailable {
                        message: format!("extraction tool not found: {}", path.display()),
                        attempts,
                    });
                }
                Err(e) => AttemptFailure::from_invocation(&e),
            };

            warn!(
                %purpose,
                client = %client.label,
                error = %failure,
                "Extraction attempt failed"
            );
            attempts.push(ExtractionAttempt {
                client,
                purpose,
                outcome: Err(failure),
            });
        }

        let message = match attempts.first().map(|a| &a.outcome) {
            Some(Err(primary)) => exhausted(primary),
            _ => exhausted(&AttemptFailure::Spawn("no client identities configured".into())),
        };

        Err(ExtractError::DependencyUnavailable { message, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::scripted::ScriptedRunner;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn client_with(
        runner: ScriptedRunner,
        temp: &TempDir,
    ) -> (ExtractionClient, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let storage = StorageConfig {
            videos_dir: temp.path().join("videos"),
            work_dir: Some(temp.path().join("work")),
            ..StorageConfig::default()
        };
        let client = ExtractionClient::new(
            &ExtractorConfig::default(),
            &storage,
            runner.clone(),
            Arc::new(Metrics::new()),
        )
        .unwrap();
        (client, runner)
    }

    fn sample() -> serde_json::Value {
        json!({"id": "abc123", "title": "Sample", "duration": 225, "thumbnail": "t.jpg"})
    }

    #[tokio::test]
    async fn test_probe_uses_primary_when_it_works() {
        let temp = TempDir::new().unwrap();
        let (client, runner) = client_with(ScriptedRunner::new(sample()), &temp);

        let metadata = client.probe_metadata("https://youtu.be/abc123").await.unwrap();
        assert_eq!(metadata.id, "abc123");
        assert_eq!(runner.calls(), vec![(Purpose::Metadata, "android,web".to_string())]);
    }

    #[tokio::test]
    async fn test_probe_falls_back_in_order() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(sample())
            .fail_client(Purpose::Metadata, "android,web")
            .fail_client(Purpose::Metadata, "web");
        let (client, runner) = client_with(runner, &temp);

        let metadata = client.probe_metadata("https://youtu.be/abc123").await.unwrap();
        assert_eq!(metadata.title, "Sample");

        let clients: Vec<String> = runner.calls().into_iter().map(|(_, c)| c).collect();
        assert_eq!(clients, vec!["android,web", "web", "ios"]);
    }

    #[tokio::test]
    async fn test_probe_exhaustion_carries_primary_error() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(sample()).fail_all(Purpose::Metadata);
        let (client, runner) = client_with(runner, &temp);

        let err = client.probe_metadata("https://youtu.be/abc123").await.unwrap_err();
        match err {
            ExtractError::DependencyUnavailable { message, attempts } => {
                assert!(message.starts_with("Failed to get video info: "));
                assert!(message.contains("android,web"));
                assert_eq!(attempts.len(), 4);
                assert!(attempts.iter().all(|a| a.outcome.is_err()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_invocation_timeout_moves_to_next_client() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(sample())
            .stall_client("android,web", Duration::from_secs(3600));
        let (client, runner) = client_with(runner, &temp);

        let mut config = ExtractorConfig::default();
        config.probe.primary.timeout = crate::humanize::HumanDuration(Duration::from_millis(50));
        let client = ExtractionClient { config, ..client };

        let metadata = client.probe_metadata("https://youtu.be/abc123").await.unwrap();
        assert_eq!(metadata.id, "abc123");
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_tool_fails_fast() {
        let temp = TempDir::new().unwrap();
        let (client, runner) = client_with(ScriptedRunner::new(sample()).missing_tool(), &temp);

        let err = client.probe_metadata("https://youtu.be/abc123").await.unwrap_err();
        assert!(matches!(err, ExtractError::DependencyUnavailable { .. }));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_promotes_artifact() {
        let temp = TempDir::new().unwrap();
        let (client, _) = client_with(ScriptedRunner::new(sample()), &temp);

        let selector = QualitySelector::from_hint_str("720p");
        let artifact = client
            .fetch_media("https://youtu.be/abc123", "abc123", &selector)
            .await
            .unwrap();

        assert_eq!(artifact.filename, "abc123.mp4");
        assert!(artifact.storage_path.starts_with(temp.path().join("videos")));
        assert!(artifact.size_bytes > 0);
        assert_eq!(client.public_url(&artifact).as_deref(), Some("/video/abc123.mp4"));

        // scratch directory is gone once the fetch returns
        let work_entries = std::fs::read_dir(client.work_area.path()).unwrap().count();
        assert_eq!(work_entries, 0);
    }

    #[tokio::test]
    async fn test_fetch_falls_back_with_relaxed_profile() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(sample()).fail_client(Purpose::Media, "android,web");
        let (client, runner) = client_with(runner, &temp);

        let selector = QualitySelector::from_hint_str("720p");
        let artifact = client
            .fetch_media("https://youtu.be/abc123", "abc123", &selector)
            .await
            .unwrap();
        assert_eq!(artifact.filename, "abc123.mp4");
        assert_eq!(client.public_url(&artifact).as_deref(), Some("/video/abc123.mp4"));

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        let (primary, fallback) = (&invocations[0], &invocations[1]);
        assert_eq!(fallback.client.label, "web");

        let profiles = StageProfiles::download_defaults();
        assert_eq!(fallback.timeout, Duration::from(profiles.fallback.timeout));
        assert!(fallback.socket_timeout.is_none());
        assert!(fallback.extra_args.is_empty());
        assert_eq!(primary.extra_args, profiles.primary.extra_args);

        // Both attempts write into the same scratch directory
        assert_eq!(primary.output_template, fallback.output_template);
        assert_eq!(fallback.format, primary.format);
    }

    #[tokio::test]
    async fn test_fetch_without_output_is_artifact_missing() {
        let temp = TempDir::new().unwrap();
        let (client, _) = client_with(ScriptedRunner::new(sample()).without_output(), &temp);

        let selector = QualitySelector::from_hint_str("best");
        let err = client
            .fetch_media("https://youtu.be/abc123", "abc123", &selector)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ArtifactMissing));
    }

    #[tokio::test]
    async fn test_fetch_exhaustion_reports_restriction() {
        let temp = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(sample()).fail_all(Purpose::Media);
        let (client, runner) = client_with(runner, &temp);

        let selector = QualitySelector::from_hint_str("720p");
        let err = client
            .fetch_media("https://youtu.be/abc123", "abc123", &selector)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Download failed with all clients"));
        assert!(runner.calls().iter().all(|(purpose, _)| *purpose == Purpose::Media));
    }
}
