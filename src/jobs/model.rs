use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::extractor::ExtractError;

/// Job identity, minted on acceptance and never reused
pub type JobId = Uuid;

/// Message reported when the job-level timeout fires
pub const TIMEOUT_MESSAGE: &str = "Download timeout - please try with a shorter video";

/// Message reported when a stored artifact has no public location
pub const NO_LOCATION_MESSAGE: &str = "Video was downloaded but no download URL available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Initializing,
    ProbingMetadata,
    Downloading,
    Finalizing,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut
        )
    }

    /// Position in the lifecycle; all terminal states share the last rank
    fn rank(&self) -> u8 {
        match self {
            JobState::Initializing => 0,
            JobState::ProbingMetadata => 1,
            JobState::Downloading => 2,
            JobState::Finalizing => 3,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Initializing => "initializing",
            JobState::ProbingMetadata => "probing_metadata",
            JobState::Downloading => "downloading",
            JobState::Finalizing => "finalizing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobState,
    pub to: JobState,
}

/// Summary of a finished video, as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub title: String,
    /// `"{minutes}m{seconds}s"`
    pub duration: String,
    pub thumbnail_url: Option<String>,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub artifact_url: String,
    pub metadata: VideoSummary,
}

/// One user-initiated download
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub source_url: String,
    pub quality: String,
    pub state: JobState,
    pub result: Option<JobResult>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, source_url: String, quality: String) -> Self {
        Self {
            id,
            source_url,
            quality,
            state: JobState::Initializing,
            result: None,
            failure: None,
            created_at: Utc::now(),
        }
    }

    /// Move to `next`; only strictly later states are accepted
    pub fn advance(&mut self, next: JobState) -> Result<(), TransitionError> {
        if next.rank() <= self.state.rank() {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn succeed(&mut self, result: JobResult) -> Result<(), TransitionError> {
        self.advance(JobState::Succeeded)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: &JobError) -> Result<(), TransitionError> {
        let next = match error {
            JobError::ProcessTimeout(_) => JobState::TimedOut,
            _ => JobState::Failed,
        };
        self.advance(next)?;
        self.failure = Some(error.to_string());
        Ok(())
    }
}

/// Failure kinds surfaced to clients
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    DependencyUnavailable(String),

    #[error("{0}")]
    ProcessTimeout(String),

    #[error("{0}")]
    ArtifactMissing(String),

    #[error("{0}")]
    StorageFailure(String),

    #[error("{0}")]
    Unexpected(String),
}

impl JobError {
    /// Stable wire code
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidInput(_) => "invalid_input",
            JobError::DependencyUnavailable(_) => "dependency_unavailable",
            JobError::ProcessTimeout(_) => "process_timeout",
            JobError::ArtifactMissing(_) => "artifact_missing",
            JobError::StorageFailure(_) => "storage_failure",
            JobError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<ExtractError> for JobError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::DependencyUnavailable { message, .. } => {
                JobError::DependencyUnavailable(message)
            }
            ExtractError::ArtifactMissing => JobError::ArtifactMissing(err.to_string()),
            ExtractError::Storage(e) => JobError::StorageFailure(e.to_string()),
            ExtractError::MalformedMetadata(e) => {
                JobError::Unexpected(format!("Failed to parse video info: {e}"))
            }
        }
    }
}
