//! Request and response bodies of the HTTP API.
//!
//! Submitting a download (`POST /api/download-video`):
//!
//! ```json
//! { "youtube_url": "https://youtu.be/abc123", "quality": "720p" }
//! ```
//!
//! is answered with `202 Accepted`:
//!
//! ```json
//! { "success": true, "message": "Video download started", "job_id": "0192..." }
//! ```
//!
//! Progress then arrives on `GET /api/jobs/{job_id}/events` as
//! [`EventEnvelope`](crate::events::EventEnvelope) payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::observability::MetricsSnapshot;

pub const DOWNLOAD_STARTED: &str = "Video download started";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DownloadRequest {
    #[serde(default, alias = "url")]
    pub youtube_url: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DownloadAccepted {
    pub success: bool,
    pub message: String,
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: BTreeMap<String, String>,
    pub version: String,
    pub tool_version: Option<String>,
    pub active_jobs: usize,
    pub metrics: MetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_url_alias() {
        let request: DownloadRequest =
            serde_json::from_str(r#"{"url": "https://youtu.be/abc123"}"#).unwrap();
        assert_eq!(request.youtube_url.as_deref(), Some("https://youtu.be/abc123"));
        assert!(request.quality.is_none());
    }

    #[test]
    fn test_request_fields_are_optional() {
        let request: DownloadRequest = serde_json::from_str("{}").unwrap();
        assert!(request.youtube_url.is_none());
    }
}
