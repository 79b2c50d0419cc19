use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::invocation::{ClientIdentity, Purpose};
use super::runner::InvocationError;
use crate::storage::StorageError;

/// Longest stderr tail kept in attempt failures
const STDERR_EXCERPT_CHARS: usize = 600;

/// Failure of a single extraction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    Exit {
        code: Option<i32>,
        stderr: String,
    },
    Timeout(Duration),
    Spawn(String),
}

impl AttemptFailure {
    pub fn exit(code: Option<i32>, stderr: &str) -> Self {
        Self::Exit {
            code,
            stderr: excerpt(stderr),
        }
    }

    pub fn from_invocation(err: &InvocationError) -> Self {
        match err {
            InvocationError::Timeout(limit) => Self::Timeout(*limit),
            other => Self::Spawn(other.to_string()),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Exit { stderr, .. } if !stderr.is_empty() => f.write_str(stderr),
            AttemptFailure::Exit { code: Some(code), .. } => write!(f, "exited with status {code}"),
            AttemptFailure::Exit { code: None, .. } => f.write_str("terminated by signal"),
            AttemptFailure::Timeout(limit) => write!(f, "timed out after {}s", limit.as_secs()),
            AttemptFailure::Spawn(msg) => f.write_str(msg),
        }
    }
}

/// Keeps the tail of stderr, where the tool prints its final error
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect();
    format!("...{tail}")
}

/// One recorded invocation of the tool
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub client: ClientIdentity,
    pub purpose: Purpose,
    pub outcome: Result<(), AttemptFailure>,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The tool is absent or every client identity was rejected
    #[error("{message}")]
    DependencyUnavailable {
        message: String,
        attempts: Vec<ExtractionAttempt>,
    },

    /// The tool reported success but left no matching file
    #[error("Downloaded file not found")]
    ArtifactMissing,

    #[error("Failed to parse video info: {0}")]
    MalformedMetadata(#[from] serde_json::Error),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl ExtractError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::DependencyUnavailable {
            message: message.into(),
            attempts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_keeps_tail() {
        let long = format!("{}ERROR: Sign in to confirm", "x".repeat(2000));
        let failure = AttemptFailure::exit(Some(1), &long);
        let text = failure.to_string();
        assert!(text.starts_with("..."));
        assert!(text.ends_with("ERROR: Sign in to confirm"));
        assert!(text.chars().count() <= STDERR_EXCERPT_CHARS + 3);
    }

    #[test]
    fn test_display_without_stderr() {
        assert_eq!(AttemptFailure::exit(Some(2), "  ").to_string(), "exited with status 2");
        assert_eq!(
            AttemptFailure::Timeout(Duration::from_secs(45)).to_string(),
            "timed out after 45s"
        );
    }
}
