use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream::{self, Stream};
use std::collections::BTreeMap;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    error::ApiError,
    models::{DOWNLOAD_STARTED, DownloadAccepted, DownloadRequest, HealthResponse},
    state::AppState,
    utils::{parse_content_type, parse_range, read_body_limited},
};
use crate::events::JobEventStream;

/// Start a download job (POST /api/download-video)
///
/// Validates the URL synchronously and answers 202 with the new job id.
/// Everything after that is reported on the job's event stream.
pub async fn submit_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let max_size = state.config.server.max_payload_bytes.as_usize();
    let body_bytes = read_body_limited(body, max_size).await?;
    let request: DownloadRequest = serde_json::from_slice(&body_bytes)?;

    let url = request.youtube_url.unwrap_or_default();
    let handle = state
        .orchestrator
        .submit(&url, request.quality.as_deref())?;

    let response = DownloadAccepted {
        success: true,
        message: DOWNLOAD_STARTED.to_string(),
        job_id: handle.id().to_string(),
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Serve a stored video (GET /video/{filename})
///
/// Supports a single `Range: bytes=...` request.
pub async fn serve_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let store = state.extractor.store();
    store
        .validate_filename(&filename)
        .map_err(|_| ApiError::InvalidInput("Invalid filename".to_string()))?;

    let (mut file, size) = store
        .open_file(&filename)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("video {filename}")))?;

    let range = match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(value) => parse_range(value, size)?,
        None => None,
    };

    let mut response = match range {
        Some(range) => {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            let body = Body::from_stream(ReaderStream::new(file.take(range.length())));

            let mut response = (StatusCode::PARTIAL_CONTENT, body).into_response();
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                header_value(&format!("bytes {}-{}/{}", range.start, range.end, size))?,
            );
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(range.length()));
            response
        }
        None => {
            let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
            response
        }
    };

    debug!(filename, size, partial = range.is_some(), "Serving video");

    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_TYPE,
        header_value(&format!("video/{}", store.media_extension()))?,
    );

    Ok(response)
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::Internal(e.to_string()))
}

/// Progress stream of one job (GET /api/jobs/{job_id}/events)
///
/// Replays the job's buffered events, then follows it live; the stream
/// closes after the terminal `complete` or `error` event.
pub async fn stream_job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::InvalidInput(format!("invalid job id: {job_id}")))?;

    // Subscribe first so a job finishing in between is still replayed
    let subscription = state.events.subscribe(job_id);
    if !state.orchestrator.is_active(job_id) && !state.events.has_events(job_id) {
        return Err(ApiError::NotFound(format!("job {job_id}")));
    }

    let keep_alive = KeepAlive::new().interval(state.config.events.keep_alive.into());
    Ok(Sse::new(sse_events(subscription)).keep_alive(keep_alive))
}

fn sse_events(subscription: JobEventStream) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(subscription, |mut subscription| async move {
        let envelope = subscription.next().await?;
        let event = Event::default()
            .event(envelope.event.kind())
            .id(envelope.seq.to_string())
            .json_data(&envelope);
        Some((event, subscription))
    })
}

/// Health check endpoint (GET /health)
///
/// Reports the API, the extraction tool and the video store. Any unhealthy
/// component turns the answer into 503.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let tool_version = match state.extractor.tool_version().await {
        Ok(version) => {
            components.insert("extractor".to_string(), "healthy".to_string());
            Some(version)
        }
        Err(e) => {
            warn!(error = %e, "Extraction tool unavailable");
            components.insert("extractor".to_string(), format!("unavailable: {e}"));
            None
        }
    };

    let storage_status = match tokio::fs::metadata(state.extractor.store().root()).await {
        Ok(meta) if meta.is_dir() => "healthy".to_string(),
        Ok(_) => "unavailable: not a directory".to_string(),
        Err(e) => format!("unavailable: {e}"),
    };
    components.insert("storage".to_string(), storage_status);

    let all_healthy = components.values().all(|status| status == "healthy");
    let (status, status_code) = if all_healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        tool_version,
        active_jobs: state.orchestrator.active_count(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}
