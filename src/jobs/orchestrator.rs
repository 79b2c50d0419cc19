use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::model::{
    Job, JobError, JobId, JobResult, JobState, NO_LOCATION_MESSAGE, TIMEOUT_MESSAGE, VideoSummary,
};
use super::validation::UrlPolicy;
use crate::config::JobConfig;
use crate::events::{EventBus, JobEvent};
use crate::extractor::{ExtractionClient, QualitySelector};
use crate::humanize::format_clock;
use crate::observability::Metrics;

/// Handle to a running job; dropping it leaves the job running
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    task: JoinHandle<JobState>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job's final state
    pub async fn wait(self) -> JobState {
        self.task.await.unwrap_or(JobState::Failed)
    }
}

/// Turns accepted URLs into background jobs and reports their progress
pub struct Orchestrator {
    extractor: Arc<ExtractionClient>,
    events: EventBus,
    metrics: Arc<Metrics>,
    policy: UrlPolicy,
    default_quality: String,
    timeout: Duration,
    active: Arc<Mutex<HashSet<JobId>>>,
}

impl Orchestrator {
    pub fn new(
        config: &JobConfig,
        extractor: Arc<ExtractionClient>,
        events: EventBus,
        metrics: Arc<Metrics>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            extractor,
            events,
            metrics,
            policy: UrlPolicy::new(&config.url_pattern)?,
            default_quality: config.default_quality.clone(),
            timeout: config.timeout.into(),
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Validate the URL, mint a job id and start the job in the background
    ///
    /// Returns as soon as the job is spawned. Rejected input mints no id and
    /// publishes nothing.
    pub fn submit(&self, source_url: &str, quality: Option<&str>) -> Result<JobHandle, JobError> {
        let url = match self.policy.check(source_url) {
            Ok(url) => url,
            Err(e) => {
                self.metrics.job_rejected();
                return Err(e);
            }
        };

        let quality = quality
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(&self.default_quality)
            .to_string();

        let id = Uuid::now_v7();
        let job = Job::new(id, url, quality);

        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        self.metrics.job_accepted();
        info!(job_id = %id, url = %job.source_url, quality = %job.quality, "Job accepted");

        let supervisor = Supervisor {
            extractor: self.extractor.clone(),
            reporter: Arc::new(JobReporter::new(job, self.events.clone(), self.metrics.clone())),
            timeout: self.timeout,
            active: self.active.clone(),
        };

        let span = info_span!("job", job_id = %id);
        let task = tokio::spawn(supervisor.run().instrument(span));

        Ok(JobHandle { id, task })
    }

    /// Whether a job with this id is still running
    pub fn is_active(&self, id: JobId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

struct Supervisor {
    extractor: Arc<ExtractionClient>,
    reporter: Arc<JobReporter>,
    timeout: Duration,
    active: Arc<Mutex<HashSet<JobId>>>,
}

impl Supervisor {
    async fn run(self) -> JobState {
        let (id, url, quality) = self.reporter.describe();
        let selector = QualitySelector::from_hint_str(&quality);

        let stages = tokio::spawn(
            run_stages(self.extractor.clone(), self.reporter.clone(), url, selector)
                .in_current_span(),
        );
        let abort = stages.abort_handle();

        let outcome = match tokio::time::timeout(self.timeout, stages).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                error!(error = %join_err, "Job task ended abnormally");
                Err(JobError::Unexpected(format!("Download error: {join_err}")))
            }
            Err(_) => {
                // Dropping the stage future kills any running child process
                abort.abort();
                warn!(timeout_secs = self.timeout.as_secs(), "Job timed out");
                Err(JobError::ProcessTimeout(TIMEOUT_MESSAGE.to_string()))
            }
        };

        let state = self.reporter.finish(outcome);
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        state
    }
}

async fn run_stages(
    extractor: Arc<ExtractionClient>,
    reporter: Arc<JobReporter>,
    url: String,
    selector: QualitySelector,
) -> Result<JobResult, JobError> {
    reporter.progress(0, JobState::Initializing, "Starting video download...");
    reporter.progress(10, JobState::ProbingMetadata, "Getting video information...");

    let metadata = extractor.probe_metadata(&url).await?;

    reporter.enter(JobState::Downloading);
    let artifact = extractor
        .fetch_media(&url, &metadata.id, &selector)
        .await?;

    reporter.progress(
        80,
        JobState::Finalizing,
        "Video download completed, preparing file...",
    );

    let artifact_url = extractor
        .public_url(&artifact)
        .ok_or_else(|| JobError::ArtifactMissing(NO_LOCATION_MESSAGE.to_string()))?;

    Ok(JobResult {
        artifact_url,
        metadata: VideoSummary {
            title: metadata.title.clone(),
            duration: format_clock(metadata.duration_secs()),
            thumbnail_url: metadata.thumbnail.clone(),
            file_size: artifact.size_bytes,
        },
    })
}

struct ReporterState {
    job: Job,
    closed: bool,
}

/// Owns the job record and is the only path to the event bus for it
///
/// Once the terminal event is out, later progress calls are dropped.
struct JobReporter {
    state: Mutex<ReporterState>,
    events: EventBus,
    metrics: Arc<Metrics>,
}

impl JobReporter {
    fn new(job: Job, events: EventBus, metrics: Arc<Metrics>) -> Self {
        Self {
            state: Mutex::new(ReporterState { job, closed: false }),
            events,
            metrics,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn describe(&self) -> (JobId, String, String) {
        let state = self.lock();
        (
            state.job.id,
            state.job.source_url.clone(),
            state.job.quality.clone(),
        )
    }

    fn progress(&self, percent: u8, stage: JobState, message: &str) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        // Initializing is the starting state, so its event needs no transition
        if stage != state.job.state {
            if let Err(e) = state.job.advance(stage) {
                warn!(error = %e, "Progress out of order, dropped");
                return;
            }
        }
        info!(percent, %stage, "{}", message);
        self.events.publish(
            state.job.id,
            JobEvent::Progress {
                percent,
                stage,
                message: message.to_string(),
            },
        );
    }

    /// Record a state change that clients are not told about
    fn enter(&self, stage: JobState) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        if let Err(e) = state.job.advance(stage) {
            warn!(error = %e, "State change refused");
        }
    }

    fn finish(&self, outcome: Result<JobResult, JobError>) -> JobState {
        let mut state = self.lock();
        if state.closed {
            return state.job.state;
        }
        state.closed = true;

        let id = state.job.id;
        let elapsed_ms = (Utc::now() - state.job.created_at).num_milliseconds();
        let event = match outcome {
            Ok(result) => {
                info!(artifact_url = %result.artifact_url, elapsed_ms, "Job completed");
                let event = JobEvent::Complete {
                    artifact_url: result.artifact_url.clone(),
                    metadata: result.metadata.clone(),
                };
                if let Err(e) = state.job.succeed(result) {
                    warn!(error = %e, "Completion recorded out of order");
                }
                self.metrics.job_succeeded();
                event
            }
            Err(err) => {
                if let Err(e) = state.job.fail(&err) {
                    warn!(error = %e, "Failure recorded out of order");
                }
                match err {
                    JobError::ProcessTimeout(_) => self.metrics.job_timed_out(),
                    _ => self.metrics.job_failed(),
                }
                warn!(kind = err.kind(), error = %err, elapsed_ms, "Job failed");
                JobEvent::Error {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                }
            }
        };

        self.events.publish(id, event);
        state.job.state
    }
}
