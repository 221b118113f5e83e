//! Sync session controller.
//!
//! Applies sync actions from the network (and local control requests) to
//! the playback engine and effect bridge, and mirrors the engine's state
//! into a [`SyncSession`] after every command.

use fseq_wire::SyncAction;

use crate::playback::{EffectBridge, PlaybackEngine, PlaybackError};

/// Playback as last commanded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSession {
    /// Absolute path of the playing sequence; `Some` iff the engine plays.
    pub active_file: Option<String>,
    pub requested_elapsed_seconds: f32,
    pub is_looping: bool,
    pub last_action: Option<SyncAction>,
}

/// Point-in-time view for status endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub playing: bool,
    pub file: Option<String>,
    pub elapsed_seconds: f32,
    pub looping: bool,
}

/// Prefix `/` unless already present.
pub fn normalize_path(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

pub struct SyncSessionController {
    engine: Box<dyn PlaybackEngine>,
    bridge: Box<dyn EffectBridge>,
    session: SyncSession,
}

impl SyncSessionController {
    pub fn new(engine: Box<dyn PlaybackEngine>, bridge: Box<dyn EffectBridge>) -> Self {
        Self {
            engine,
            bridge,
            session: SyncSession::default(),
        }
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    /// Apply a sync action received from a controller.
    pub fn handle_action(&mut self, action: SyncAction, file_name: &str, elapsed_seconds: f32) {
        tracing::debug!(%action, file = file_name, elapsed_seconds, "sync action");
        match action {
            SyncAction::Start => {
                self.start(&normalize_path(file_name), elapsed_seconds, false);
            }
            SyncAction::Stop => self.stop(),
            SyncAction::Resync => {
                if self.engine.is_playing() {
                    self.engine.sync_to(elapsed_seconds);
                    self.session.requested_elapsed_seconds = elapsed_seconds;
                } else {
                    self.start(&normalize_path(file_name), elapsed_seconds, false);
                }
            }
            SyncAction::Open => {
                tracing::debug!(file = file_name, "open request ignored");
            }
            SyncAction::Unknown(b) => {
                tracing::debug!(action = b, "unknown sync action ignored");
            }
        }
        self.session.last_action = Some(action);
        self.refresh();
    }

    /// Stop output for a blank packet. Leaves the bridge alone and does
    /// nothing when already stopped.
    pub fn blank(&mut self) {
        if self.engine.is_playing() {
            tracing::info!("blank received, stopping playback");
            self.engine.stop();
        }
        self.refresh();
    }

    /// Start `file` from the beginning on local request.
    ///
    /// If `file` is already playing only its loop mode changes; playback
    /// keeps its position.
    pub fn play_local(&mut self, file: &str, looping: bool) -> Result<String, PlaybackError> {
        let path = normalize_path(file);
        if self.engine.is_playing() && self.engine.file_name().as_deref() == Some(path.as_str()) {
            self.engine.set_looping(looping);
            self.session.is_looping = looping;
            tracing::info!(path = %path, looping, "loop mode changed");
            return Ok(path);
        }
        let result = self.engine.load(&path, 0.0, looping);
        match &result {
            Ok(()) => {
                self.bridge.enter_remote_playback();
                self.session.requested_elapsed_seconds = 0.0;
                self.session.is_looping = looping;
                tracing::info!(path = %path, looping, "local playback started");
            }
            Err(e) => tracing::warn!(path = %path, error = %e, "local playback failed"),
        }
        self.refresh();
        result.map(|()| path)
    }

    pub fn stop_local(&mut self) {
        self.stop();
        self.refresh();
    }

    /// Advance the engine by one frame while playing.
    pub fn render_tick(&mut self) {
        if self.engine.is_playing() {
            self.engine.render_next_frame();
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let playing = self.engine.is_playing();
        PlaybackSnapshot {
            playing,
            file: if playing { self.engine.file_name() } else { None },
            elapsed_seconds: if playing {
                self.engine.elapsed_seconds()
            } else {
                0.0
            },
            looping: self.session.is_looping,
        }
    }

    fn start(&mut self, path: &str, elapsed_seconds: f32, looping: bool) {
        match self.engine.load(path, elapsed_seconds, looping) {
            Ok(()) => {
                self.bridge.enter_remote_playback();
                self.session.requested_elapsed_seconds = elapsed_seconds;
                self.session.is_looping = looping;
                tracing::info!(path, elapsed_seconds, "sync playback started");
            }
            Err(e) => tracing::warn!(path, error = %e, "sync playback failed to start"),
        }
    }

    fn stop(&mut self) {
        self.engine.stop();
        self.bridge.release_realtime();
        tracing::info!("playback stopped");
    }

    fn refresh(&mut self) {
        if self.engine.is_playing() {
            self.session.active_file = self.engine.file_name();
        } else {
            self.session.active_file = None;
            self.session.is_looping = false;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Load(String, f32, bool),
        SyncTo(f32),
        SetLooping(bool),
        Stop,
        EnterRemote,
        Release,
    }

    pub(crate) type Log = Arc<Mutex<Vec<Call>>>;

    /// Engine that records calls and tracks play state.
    pub(crate) struct RecordingEngine {
        pub log: Log,
        pub playing: Option<String>,
        pub fail_load: bool,
    }

    impl PlaybackEngine for RecordingEngine {
        fn load(&mut self, path: &str, start: f32, looping: bool) -> Result<(), PlaybackError> {
            self.log
                .lock()
                .unwrap()
                .push(Call::Load(path.to_string(), start, looping));
            if self.fail_load {
                return Err(PlaybackError::NotFound(path.to_string()));
            }
            self.playing = Some(path.to_string());
            Ok(())
        }
        fn sync_to(&mut self, elapsed: f32) {
            self.log.lock().unwrap().push(Call::SyncTo(elapsed));
        }
        fn stop(&mut self) {
            self.log.lock().unwrap().push(Call::Stop);
            self.playing = None;
        }
        fn is_playing(&self) -> bool {
            self.playing.is_some()
        }
        fn file_name(&self) -> Option<String> {
            self.playing.clone()
        }
        fn elapsed_seconds(&self) -> f32 {
            0.0
        }
        fn set_looping(&mut self, looping: bool) {
            self.log.lock().unwrap().push(Call::SetLooping(looping));
        }
        fn render_next_frame(&mut self) {}
    }

    pub(crate) struct RecordingBridge {
        pub log: Log,
    }

    impl EffectBridge for RecordingBridge {
        fn enter_remote_playback(&mut self) {
            self.log.lock().unwrap().push(Call::EnterRemote);
        }
        fn release_realtime(&mut self) {
            self.log.lock().unwrap().push(Call::Release);
        }
    }

    pub(crate) fn recording_controller(fail_load: bool) -> (Log, SyncSessionController) {
        let log: Log = Arc::default();
        let engine = RecordingEngine {
            log: log.clone(),
            playing: None,
            fail_load,
        };
        let bridge = RecordingBridge { log: log.clone() };
        (log, SyncSessionController::new(Box::new(engine), Box::new(bridge)))
    }

    fn take(log: &Log) -> Vec<Call> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn start_normalizes_file_name() {
        let (log, mut c) = recording_controller(false);
        c.handle_action(SyncAction::Start, "show.fseq", 0.0);
        assert_eq!(
            take(&log),
            vec![Call::Load("/show.fseq".into(), 0.0, false), Call::EnterRemote]
        );
        assert_eq!(c.session().active_file.as_deref(), Some("/show.fseq"));
        assert_eq!(c.session().last_action, Some(SyncAction::Start));
    }

    #[test]
    fn absolute_names_are_kept() {
        assert_eq!(normalize_path("/a/b.fseq"), "/a/b.fseq");
        assert_eq!(normalize_path("b.fseq"), "/b.fseq");
    }

    #[test]
    fn resync_when_stopped_starts_at_offset() {
        let (log, mut c) = recording_controller(false);
        c.handle_action(SyncAction::Resync, "show.fseq", 42.5);
        let resync_calls = take(&log);

        let (log2, mut c2) = recording_controller(false);
        c2.handle_action(SyncAction::Start, "show.fseq", 42.5);
        assert_eq!(resync_calls, take(&log2));
        assert_eq!(
            resync_calls[0],
            Call::Load("/show.fseq".into(), 42.5, false)
        );
        assert_eq!(c.session().requested_elapsed_seconds, 42.5);
    }

    #[test]
    fn resync_while_playing_seeks_without_reload() {
        let (log, mut c) = recording_controller(false);
        c.handle_action(SyncAction::Start, "show.fseq", 0.0);
        take(&log);
        c.handle_action(SyncAction::Resync, "other.fseq", 10.0);
        assert_eq!(take(&log), vec![Call::SyncTo(10.0)]);
        assert_eq!(c.session().active_file.as_deref(), Some("/show.fseq"));
    }

    #[test]
    fn stop_releases_bridge() {
        let (log, mut c) = recording_controller(false);
        c.handle_action(SyncAction::Start, "show.fseq", 0.0);
        take(&log);
        c.handle_action(SyncAction::Stop, "", 0.0);
        assert_eq!(take(&log), vec![Call::Stop, Call::Release]);
        assert_eq!(c.session().active_file, None);
    }

    #[test]
    fn blank_stops_without_bridge_and_is_idempotent() {
        let (log, mut c) = recording_controller(false);
        c.handle_action(SyncAction::Start, "show.fseq", 0.0);
        take(&log);

        c.blank();
        assert_eq!(take(&log), vec![Call::Stop]);
        assert!(!c.snapshot().playing);

        c.blank();
        assert!(take(&log).is_empty());
        assert_eq!(c.session().active_file, None);
    }

    #[test]
    fn open_and_unknown_do_nothing() {
        let (log, mut c) = recording_controller(false);
        c.handle_action(SyncAction::Open, "show.fseq", 0.0);
        c.handle_action(SyncAction::Unknown(7), "show.fseq", 0.0);
        assert!(take(&log).is_empty());
        assert_eq!(c.session().last_action, Some(SyncAction::Unknown(7)));
    }

    #[test]
    fn failed_load_leaves_session_idle() {
        let (log, mut c) = recording_controller(true);
        c.handle_action(SyncAction::Start, "missing.fseq", 0.0);
        assert_eq!(
            take(&log),
            vec![Call::Load("/missing.fseq".into(), 0.0, false)]
        );
        assert_eq!(c.session().active_file, None);
        assert!(c.play_local("missing.fseq", true).is_err());
    }

    #[test]
    fn local_loop_playback() {
        let (log, mut c) = recording_controller(false);
        let path = c.play_local("loop.fseq", true).unwrap();
        assert_eq!(path, "/loop.fseq");
        assert_eq!(
            take(&log),
            vec![Call::Load("/loop.fseq".into(), 0.0, true), Call::EnterRemote]
        );
        let snap = c.snapshot();
        assert!(snap.playing && snap.looping);
        assert_eq!(snap.file.as_deref(), Some("/loop.fseq"));

        c.stop_local();
        assert_eq!(take(&log), vec![Call::Stop, Call::Release]);
        assert!(!c.snapshot().looping);
    }

    #[test]
    fn replaying_current_file_only_toggles_loop() {
        let (log, mut c) = recording_controller(false);
        c.play_local("show.fseq", false).unwrap();
        take(&log);

        assert_eq!(c.play_local("/show.fseq", true).unwrap(), "/show.fseq");
        assert_eq!(take(&log), vec![Call::SetLooping(true)]);
        assert!(c.snapshot().looping);

        c.play_local("other.fseq", false).unwrap();
        assert_eq!(
            take(&log),
            vec![Call::Load("/other.fseq".into(), 0.0, false), Call::EnterRemote]
        );
        assert!(!c.snapshot().looping);
    }
}
