//! HTTP API: device info for controllers, playback control, file
//! management and raw sequence uploads.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fseq_common::models::{
    MultiSyncSystems, PlaybackState, SequenceFile, SequenceFileList, SequenceName, StorageFile,
    StorageListing, SystemInfo, SystemStatus,
};
use fseq_wire::SyncAction;

use crate::playback::PlaybackError;
use crate::state::NodeState;
use crate::storage::{FileEntry, StorageError};
use crate::sync::normalize_path;
use crate::upload::{ChunkOutcome, UploadError};

/// Build the router over shared node state.
pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        // Controller-facing
        .route("/api/system/info", get(system_info))
        .route("/api/system/status", get(system_status))
        .route("/api/fppd/multiSyncSystems", get(multi_sync_systems))
        .route("/fseqfilelist", get(fseq_file_list))
        .route(
            "/fpp",
            post(upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/fpp/connect", get(fpp_connect))
        .route("/fpp/stop", get(fpp_stop))
        // Local control
        .route("/api/fseq/list", get(fseq_list))
        .route("/api/fseq/status", get(fseq_status))
        .route("/api/fseq/start", post(fseq_start))
        .route("/api/fseq/startloop", post(fseq_start_loop))
        .route("/api/fseq/stop", post(fseq_stop))
        .route("/api/sd/list", get(sd_list))
        .route(
            "/api/sd/upload",
            post(sd_upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/sd/delete", post(sd_delete))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    plain: bool,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }
    pub fn request_timeout(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::REQUEST_TIMEOUT, msg)
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Send the message as a `text/plain` body instead of JSON.
    pub fn plain(mut self) -> Self {
        self.plain = true;
        self
    }

    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            plain: false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.plain {
            return (self.status, self.message).into_response();
        }
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidPath(_) => ApiError::bad_request(e.to_string()),
            StorageError::NotFound(_) => ApiError::not_found(e.to_string()),
            StorageError::Io { .. } => ApiError::internal(e.to_string()),
        }
    }
}

fn upload_error(e: UploadError) -> ApiError {
    match e {
        UploadError::Busy(_) => ApiError::conflict("Upload already in progress"),
        UploadError::Open(_) => ApiError::internal("File open failed"),
        UploadError::NoSession => ApiError::conflict("Upload session lost"),
        UploadError::Write(_) | UploadError::Flush { .. } => ApiError::internal("Write failed"),
    }
    .plain()
}

/// File manager wording for a failed open; everything else as for `/fpp`.
fn multipart_upload_error(e: UploadError) -> ApiError {
    match e {
        UploadError::Open(_) => ApiError::internal("Failed to open file for writing").plain(),
        other => upload_error(other),
    }
}

// ── Queries ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

// ── Device info ─────────────────────────────────────────────────────

async fn system_info(State(state): State<Arc<NodeState>>) -> Json<SystemInfo> {
    Json(state.identity.system_info(state.local_ip()))
}

async fn system_status(State(state): State<Arc<NodeState>>) -> Json<SystemStatus> {
    let snap = state.controller.lock().await.snapshot();
    let advanced = state.identity.advanced_view(state.local_ip());
    let status = match snap.file {
        Some(file) if snap.playing => {
            SystemStatus::playing(&file, snap.elapsed_seconds as u32, advanced)
        }
        _ => SystemStatus::idle(advanced),
    };
    Json(status)
}

async fn multi_sync_systems(State(state): State<Arc<NodeState>>) -> Json<MultiSyncSystems> {
    Json(state.identity.multi_sync_systems(state.local_ip()))
}

// ── Files ───────────────────────────────────────────────────────────

fn sequence_files(state: &NodeState) -> Result<Vec<FileEntry>, ApiError> {
    Ok(state
        .storage
        .list()?
        .into_iter()
        .filter(FileEntry::is_sequence)
        .collect())
}

async fn fseq_file_list(
    State(state): State<Arc<NodeState>>,
) -> Result<Json<SequenceFileList>, ApiError> {
    let files = sequence_files(&state)?
        .into_iter()
        .map(|f| SequenceFile {
            name: f.name,
            size: f.size,
        })
        .collect();
    Ok(Json(SequenceFileList { files }))
}

async fn fseq_list(
    State(state): State<Arc<NodeState>>,
) -> Result<Json<Vec<SequenceName>>, ApiError> {
    let names = sequence_files(&state)?
        .into_iter()
        .map(|f| SequenceName { name: f.name })
        .collect();
    Ok(Json(names))
}

async fn sd_list(State(state): State<Arc<NodeState>>) -> Result<Json<StorageListing>, ApiError> {
    let files = state
        .storage
        .list()?
        .into_iter()
        .map(|f| StorageFile {
            name: f.name,
            size: f.size as f64 / 1024.0,
        })
        .collect();
    let usage = state.storage.usage()?;
    Ok(Json(StorageListing {
        files,
        used_kb: usage.used_bytes as f64 / 1024.0,
        total_kb: usage.total_bytes as f64 / 1024.0,
    }))
}

/// Delete a stored file. A failed delete still answers 200; the file
/// manager page only looks at the text.
async fn sd_delete(
    State(state): State<Arc<NodeState>>,
    Query(q): Query<PathQuery>,
) -> Result<&'static str, ApiError> {
    let path = q
        .path
        .ok_or_else(|| ApiError::bad_request("Missing path").plain())?;
    let path = normalize_path(&path);
    match state.storage.remove(&path) {
        Ok(()) => {
            tracing::info!(path = %path, "file deleted");
            Ok("File deleted")
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "delete failed");
            Ok("Delete failed")
        }
    }
}

// ── Playback ────────────────────────────────────────────────────────

fn required_file(q: FileQuery, missing: &'static str) -> Result<String, ApiError> {
    q.file.ok_or_else(|| ApiError::bad_request(missing).plain())
}

async fn fpp_connect(
    State(state): State<Arc<NodeState>>,
    Query(q): Query<FileQuery>,
) -> Result<String, ApiError> {
    let path = normalize_path(&required_file(q, "Missing 'file' parameter")?);
    state
        .controller
        .lock()
        .await
        .handle_action(SyncAction::Start, &path, 0.0);
    Ok(format!("FPP connect started: {path}"))
}

async fn fpp_stop(State(state): State<Arc<NodeState>>) -> &'static str {
    state
        .controller
        .lock()
        .await
        .handle_action(SyncAction::Stop, "", 0.0);
    "FPP connect stopped"
}

async fn start_local(state: &NodeState, q: FileQuery, looping: bool) -> Result<(), ApiError> {
    let file = required_file(q, "Missing file param")?;
    let result = state.controller.lock().await.play_local(&file, looping);
    match result {
        Ok(_) => Ok(()),
        Err(PlaybackError::NotFound(path)) => {
            Err(ApiError::not_found(format!("{path} not found")).plain())
        }
        Err(e) => Err(ApiError::internal(e.to_string()).plain()),
    }
}

async fn fseq_start(
    State(state): State<Arc<NodeState>>,
    Query(q): Query<FileQuery>,
) -> Result<&'static str, ApiError> {
    start_local(&state, q, false).await?;
    Ok("FSEQ started")
}

async fn fseq_start_loop(
    State(state): State<Arc<NodeState>>,
    Query(q): Query<FileQuery>,
) -> Result<&'static str, ApiError> {
    start_local(&state, q, true).await?;
    Ok("FSEQ loop started")
}

async fn fseq_stop(State(state): State<Arc<NodeState>>) -> &'static str {
    state.controller.lock().await.stop_local();
    "FSEQ stopped"
}

async fn fseq_status(State(state): State<Arc<NodeState>>) -> Json<PlaybackState> {
    let snap = state.controller.lock().await.snapshot();
    Json(PlaybackState {
        playing: snap.playing,
        file: snap.file.unwrap_or_default(),
    })
}

// ── Upload ──────────────────────────────────────────────────────────

/// Aborts the upload session of a request whose handler future is dropped
/// before it finished, e.g. when the client disconnects.
struct AbortOnDrop {
    state: Arc<NodeState>,
    request_id: u64,
    armed: bool,
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = self.state.clone();
        let request_id = self.request_id;
        handle.spawn(async move {
            state
                .uploads
                .lock()
                .await
                .abort(request_id, "request dropped");
        });
    }
}

/// Raw-body upload. The body is streamed through the upload endpoint in
/// the chunks it arrives in; each chunk read is bounded by the idle
/// timeout.
async fn upload(
    State(state): State<Arc<NodeState>>,
    Query(q): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<&'static str, ApiError> {
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let (request_id, idle_timeout) = {
        let mut uploads = state.uploads.lock().await;
        (uploads.next_request_id(), uploads.idle_timeout())
    };
    let mut guard = AbortOnDrop {
        state: state.clone(),
        request_id,
        armed: true,
    };
    let filename = q.filename.as_deref();
    // Without a length the session completes when the body ends.
    let total = content_length.unwrap_or(u64::MAX);

    let mut stream = body.into_data_stream();
    let mut index: u64 = 0;
    loop {
        let next = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                state.uploads.lock().await.abort(request_id, "idle timeout");
                return Err(ApiError::request_timeout("Upload timed out").plain());
            }
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "upload body error");
                state.uploads.lock().await.abort(request_id, "body error");
                return Err(ApiError::bad_request("Upload interrupted").plain());
            }
            None => break,
        };
        if chunk.is_empty() {
            continue;
        }

        let outcome = state
            .uploads
            .lock()
            .await
            .handle_chunk(request_id, filename, &chunk, index, total)
            .map_err(upload_error)?;
        index += chunk.len() as u64;
        if let ChunkOutcome::Finished(_) = outcome {
            guard.armed = false;
            return Ok("Upload complete");
        }
    }

    if index == 0 && content_length.is_some_and(|n| n > 0) {
        guard.armed = false;
        return Err(ApiError::bad_request("Upload incomplete").plain());
    }
    let mut uploads = state.uploads.lock().await;
    if index == 0 {
        // Empty body: open and close in one step.
        uploads
            .handle_chunk(request_id, filename, &[], 0, 0)
            .map_err(upload_error)?;
        guard.armed = false;
        return Ok("Upload complete");
    }
    if content_length.is_some() {
        uploads.abort(request_id, "body shorter than content-length");
        return Err(ApiError::bad_request("Upload incomplete").plain());
    }
    uploads.finish(request_id).map_err(upload_error)?;
    guard.armed = false;
    Ok("Upload complete")
}

/// Multipart upload from the file manager page. Each part that carries a
/// file name is stored under that name in turn; other parts are skipped.
async fn sd_upload(
    State(state): State<Arc<NodeState>>,
    mut multipart: Multipart,
) -> Result<&'static str, ApiError> {
    let (request_id, idle_timeout) = {
        let mut uploads = state.uploads.lock().await;
        (uploads.next_request_id(), uploads.idle_timeout())
    };
    let mut guard = AbortOnDrop {
        state: state.clone(),
        request_id,
        armed: true,
    };

    loop {
        let field = match tokio::time::timeout(idle_timeout, multipart.next_field()).await {
            Ok(Ok(Some(field))) => field,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "multipart body error");
                state.uploads.lock().await.abort(request_id, "body error");
                return Err(ApiError::bad_request("Upload interrupted").plain());
            }
            Err(_) => {
                state.uploads.lock().await.abort(request_id, "idle timeout");
                return Err(ApiError::request_timeout("Upload timed out").plain());
            }
        };
        let Some(path) = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .map(normalize_path)
        else {
            continue;
        };
        store_field(&state, request_id, &path, field, idle_timeout).await?;
    }

    guard.armed = false;
    Ok("Upload complete")
}

/// Stream one multipart field through the upload endpoint.
async fn store_field(
    state: &NodeState,
    request_id: u64,
    path: &str,
    mut field: Field<'_>,
    idle_timeout: Duration,
) -> Result<(), ApiError> {
    let mut index: u64 = 0;
    loop {
        let chunk = match tokio::time::timeout(idle_timeout, field.chunk()).await {
            Ok(Ok(Some(chunk))) => chunk,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                tracing::warn!(path, error = %e, "multipart field error");
                state.uploads.lock().await.abort(request_id, "body error");
                return Err(ApiError::bad_request("Upload interrupted").plain());
            }
            Err(_) => {
                state.uploads.lock().await.abort(request_id, "idle timeout");
                return Err(ApiError::request_timeout("Upload timed out").plain());
            }
        };
        if chunk.is_empty() {
            continue;
        }
        // Part length is unknown up front; the field end closes the session.
        state
            .uploads
            .lock()
            .await
            .handle_chunk(request_id, Some(path), &chunk, index, u64::MAX)
            .map_err(multipart_upload_error)?;
        index += chunk.len() as u64;
    }

    let mut uploads = state.uploads.lock().await;
    if index == 0 {
        uploads
            .handle_chunk(request_id, Some(path), &[], 0, 0)
            .map_err(multipart_upload_error)?;
    } else {
        uploads.finish(request_id).map_err(multipart_upload_error)?;
    }
    Ok(())
}
