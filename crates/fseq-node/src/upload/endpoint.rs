//! Single-slot upload state machine.
//!
//! ```text
//!          begin ok                    index + len == total
//!   Idle ───────────▶ Receiving ─────────────────────────────▶ Idle
//!     ▲                   │
//!     └───── abort ───────┘   (body error, disconnect, idle timeout)
//! ```
//!
//! Only one upload is accepted at a time. Each HTTP request gets its own
//! request id, and bytes are only written for the id that opened the
//! current session, so a rejected concurrent request can never touch the
//! file being received.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::buffer::UploadBuffer;
use crate::config::UploadConfig;
use crate::storage::{Storage, StorageError};
use crate::sync::normalize_path;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload of {0} already in progress")]
    Busy(String),
    #[error("file open failed: {0}")]
    Open(#[source] StorageError),
    #[error("no upload in progress for this request")]
    NoSession,
    #[error("write to {0} failed")]
    Write(String),
    #[error("flush of {path} failed: {source}")]
    Flush {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub path: String,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// What a chunk did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    InProgress { bytes_written: u64 },
    Finished(UploadReport),
}

pub struct UploadSession {
    pub id: u64,
    pub target_path: String,
    pub bytes_written: u64,
    pub started_at: Instant,
    pub last_activity: Instant,
    sink: UploadBuffer<Box<dyn Write + Send>>,
}

pub struct UploadEndpoint {
    storage: Arc<dyn Storage>,
    config: UploadConfig,
    session: Option<UploadSession>,
    next_id: u64,
}

impl UploadEndpoint {
    pub fn new(storage: Arc<dyn Storage>, config: UploadConfig) -> Self {
        Self {
            storage,
            config,
            session: None,
            next_id: 1,
        }
    }

    /// Allocate an id for a new request.
    pub fn next_request_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn is_receiving(&self) -> bool {
        self.session.is_some()
    }

    pub fn active_path(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.target_path.as_str())
    }

    pub fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout
    }

    /// Apply one chunk at byte offset `index` of a `total`-byte upload.
    ///
    /// `index == 0` opens the session; `index + data.len() == total`
    /// completes it.
    pub fn handle_chunk(
        &mut self,
        request_id: u64,
        filename: Option<&str>,
        data: &[u8],
        index: u64,
        total: u64,
    ) -> Result<ChunkOutcome, UploadError> {
        if index == 0 {
            self.begin(request_id, filename)?;
        }
        let bytes_written = self.write(request_id, data)?;
        if index + data.len() as u64 == total {
            return self.finish(request_id).map(ChunkOutcome::Finished);
        }
        Ok(ChunkOutcome::InProgress { bytes_written })
    }

    /// Open a session for `request_id`.
    ///
    /// A session idle for longer than the configured timeout is reclaimed;
    /// any other active session makes this fail with [`UploadError::Busy`]
    /// and is left as it was.
    pub fn begin(&mut self, request_id: u64, filename: Option<&str>) -> Result<(), UploadError> {
        if let Some(active) = &self.session {
            if active.last_activity.elapsed() <= self.config.idle_timeout {
                tracing::warn!(
                    active = %active.target_path,
                    request_id,
                    "upload rejected, another upload in progress"
                );
                return Err(UploadError::Busy(active.target_path.clone()));
            }
            let stale = active.id;
            self.abort(stale, "idle timeout");
        }

        let path = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(normalize_path)
            .unwrap_or_else(|| self.config.default_name.clone());

        if self.storage.exists(&path) {
            if let Err(e) = self.storage.remove(&path) {
                tracing::warn!(path = %path, error = %e, "could not remove previous file");
            }
        }

        let file = self.storage.create(&path).map_err(|e| {
            tracing::warn!(path = %path, error = %e, "upload file open failed");
            UploadError::Open(e)
        })?;

        tracing::info!(path = %path, request_id, "upload started");
        let now = Instant::now();
        self.session = Some(UploadSession {
            id: request_id,
            target_path: path,
            bytes_written: 0,
            started_at: now,
            last_activity: now,
            sink: UploadBuffer::new(file, self.config.buffer_size),
        });
        Ok(())
    }

    /// Forward `data` to the active session. Returns total bytes written.
    pub fn write(&mut self, request_id: u64, data: &[u8]) -> Result<u64, UploadError> {
        let session = self.session_for(request_id)?;
        let taken = session.sink.write(data);
        session.bytes_written += taken as u64;
        session.last_activity = Instant::now();
        if taken < data.len() {
            let path = session.target_path.clone();
            self.abort(request_id, "write failed");
            return Err(UploadError::Write(path));
        }
        Ok(session.bytes_written)
    }

    /// Flush and close the session.
    pub fn finish(&mut self, request_id: u64) -> Result<UploadReport, UploadError> {
        self.session_for(request_id)?;
        let Some(session) = self.session.take() else {
            return Err(UploadError::NoSession);
        };
        let path = session.target_path;
        if let Err(source) = session.sink.finish() {
            // The sink is gone; drop whatever partial file is left.
            let _ = self.storage.remove(&path);
            return Err(UploadError::Flush { path, source });
        }
        let report = UploadReport {
            path,
            bytes: session.bytes_written,
            elapsed: session.started_at.elapsed(),
        };
        tracing::info!(
            path = %report.path,
            bytes = report.bytes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "upload complete"
        );
        Ok(report)
    }

    /// Close the session opened by `request_id` and delete the partial
    /// file. A no-op for any other request id.
    pub fn abort(&mut self, request_id: u64, reason: &str) {
        if !matches!(&self.session, Some(s) if s.id == request_id) {
            return;
        }
        let Some(session) = self.session.take() else {
            return;
        };
        let path = session.target_path.clone();
        let bytes = session.bytes_written;
        drop(session);
        if let Err(e) = self.storage.remove(&path) {
            tracing::debug!(path = %path, error = %e, "partial upload not removed");
        }
        tracing::warn!(path = %path, bytes, reason, "upload aborted");
    }

    fn session_for(&mut self, request_id: u64) -> Result<&mut UploadSession, UploadError> {
        match self.session.as_mut() {
            Some(s) if s.id == request_id => Ok(s),
            _ => Err(UploadError::NoSession),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DirStorage;

    fn config(idle: Duration) -> UploadConfig {
        UploadConfig {
            buffer_size: 8,
            idle_timeout: idle,
            default_name: "/default.fseq".into(),
        }
    }

    fn endpoint(idle: Duration) -> (tempfile::TempDir, UploadEndpoint) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(DirStorage::open(dir.path()).unwrap());
        (dir, UploadEndpoint::new(storage, config(idle)))
    }

    #[test]
    fn chunked_upload_completes_on_last_chunk() {
        let (dir, mut ep) = endpoint(Duration::from_secs(30));
        let id = ep.next_request_id();
        let r = ep.handle_chunk(id, Some("show.fseq"), b"0123456789", 0, 15).unwrap();
        assert_eq!(r, ChunkOutcome::InProgress { bytes_written: 10 });
        assert!(ep.is_receiving());
        assert_eq!(ep.active_path(), Some("/show.fseq"));

        let ChunkOutcome::Finished(report) = ep.handle_chunk(id, None, b"abcde", 10, 15).unwrap()
        else {
            panic!("expected finished");
        };
        assert_eq!(report.path, "/show.fseq");
        assert_eq!(report.bytes, 15);
        assert!(!ep.is_receiving());
        let written = std::fs::read(dir.path().join("show.fseq")).unwrap();
        assert_eq!(written, b"0123456789abcde");
    }

    #[test]
    fn missing_filename_uses_default() {
        let (dir, mut ep) = endpoint(Duration::from_secs(30));
        let id = ep.next_request_id();
        ep.handle_chunk(id, Some("  "), b"x", 0, 1).unwrap();
        assert!(dir.path().join("default.fseq").exists());
    }

    #[test]
    fn empty_upload_finishes_immediately() {
        let (dir, mut ep) = endpoint(Duration::from_secs(30));
        let id = ep.next_request_id();
        let out = ep.handle_chunk(id, Some("/empty.fseq"), b"", 0, 0).unwrap();
        assert!(matches!(out, ChunkOutcome::Finished(UploadReport { bytes: 0, .. })));
        assert_eq!(std::fs::metadata(dir.path().join("empty.fseq")).unwrap().len(), 0);
    }

    #[test]
    fn second_begin_is_rejected_without_touching_first() {
        let (dir, mut ep) = endpoint(Duration::from_secs(30));
        let first = ep.next_request_id();
        let second = ep.next_request_id();

        ep.handle_chunk(first, Some("a.fseq"), b"first-", 0, 12).unwrap();
        let err = ep.handle_chunk(second, Some("b.fseq"), b"intruder", 0, 8).unwrap_err();
        assert!(matches!(err, UploadError::Busy(ref p) if p == "/a.fseq"));

        // Chunks from the rejected request never reach the active sink.
        assert!(matches!(
            ep.handle_chunk(second, None, b"more", 8, 12),
            Err(UploadError::NoSession)
        ));
        assert_eq!(ep.active_path(), Some("/a.fseq"));

        ep.handle_chunk(first, None, b"chunk", 6, 12).unwrap();
        ep.handle_chunk(first, None, b"!", 11, 12).unwrap();
        assert!(!ep.is_receiving());
        assert_eq!(std::fs::read(dir.path().join("a.fseq")).unwrap(), b"first-chunk!");
        assert!(!dir.path().join("b.fseq").exists());
    }

    #[test]
    fn begin_replaces_existing_file() {
        let (dir, mut ep) = endpoint(Duration::from_secs(30));
        std::fs::write(dir.path().join("a.fseq"), vec![9u8; 100]).unwrap();
        let id = ep.next_request_id();
        ep.handle_chunk(id, Some("a.fseq"), b"new", 0, 3).unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.fseq")).unwrap(), b"new");
    }

    #[test]
    fn abort_removes_partial_file() {
        let (dir, mut ep) = endpoint(Duration::from_secs(30));
        let id = ep.next_request_id();
        ep.handle_chunk(id, Some("p.fseq"), &[1u8; 20], 0, 100).unwrap();
        ep.abort(id + 1, "wrong request");
        assert!(ep.is_receiving());

        ep.abort(id, "client disconnected");
        assert!(!ep.is_receiving());
        assert!(!dir.path().join("p.fseq").exists());
    }

    #[test]
    fn open_failure_stays_idle() {
        let (_dir, mut ep) = endpoint(Duration::from_secs(30));
        let id = ep.next_request_id();
        let err = ep.handle_chunk(id, Some("../escape.fseq"), b"x", 0, 1).unwrap_err();
        assert!(matches!(err, UploadError::Open(StorageError::InvalidPath(_))));
        assert!(!ep.is_receiving());
    }

    #[test]
    fn stale_session_is_reclaimed() {
        let (dir, mut ep) = endpoint(Duration::from_millis(10));
        let stale = ep.next_request_id();
        ep.handle_chunk(stale, Some("old.fseq"), b"abc", 0, 10).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let fresh = ep.next_request_id();
        ep.handle_chunk(fresh, Some("new.fseq"), b"xyz", 0, 3).unwrap();
        assert!(!dir.path().join("old.fseq").exists());
        assert_eq!(std::fs::read(dir.path().join("new.fseq")).unwrap(), b"xyz");
        assert!(matches!(ep.write(stale, b"late"), Err(UploadError::NoSession)));
    }
}
