//! The turn controller: Idle -> Recording -> Processing -> Idle/Error.
//!
//! Owns the single capture session and sequences it into the turn pipeline.
//! All transitions run on one thread; async results re-enter through
//! `dispatch`. Exactly one session and one in-flight request can exist, and
//! every exit path (manual stop, safety timeout, teardown) funnels through
//! the same finalize-and-release routine.

use std::time::Duration;

use holler_audio::{CaptureHandle, CaptureSource, LevelMeter};
use holler_core::{LogEntry, LogKind, TurnState};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::TurnError;
use crate::event::AppEvent;
use crate::pipeline::TurnPipeline;

pub struct TurnController<C: CaptureSource> {
    source: C,
    meter: LevelMeter,
    pipeline: TurnPipeline,
    ceiling: Duration,
    state: TurnState,
    session: Option<C::Session>,
    // Armed safety timer for the live session; released together with it.
    ceiling_timer: Option<AbortHandle>,
    // Monotonic session counter; lets a timer that fired before its abort
    // landed be ignored.
    session_seq: u64,
    last_error: Option<String>,
    log: Vec<LogEntry>,
}

impl<C: CaptureSource> TurnController<C> {
    pub fn new(source: C, pipeline: TurnPipeline, ceiling: Duration) -> Self {
        Self {
            source,
            meter: LevelMeter::new(),
            pipeline,
            ceiling,
            state: TurnState::Idle,
            session: None,
            ceiling_timer: None,
            session_seq: 0,
            last_error: None,
            log: vec![LogEntry::new(LogKind::System, "ready")],
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Current loudness for the indicator; silence whenever no session is
    /// feeding the meter.
    pub fn level(&self) -> f32 {
        self.meter.sample()
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// One line of state for the status area.
    pub fn status_line(&self) -> String {
        match self.state {
            TurnState::Idle => "Ready - space to talk, q to quit".to_string(),
            TurnState::Recording => "Listening... space to stop".to_string(),
            TurnState::Processing => "Processing...".to_string(),
            TurnState::Error => match &self.last_error {
                Some(message) => format!("Error: {message} - space to retry"),
                None => "Error - space to retry".to_string(),
            },
        }
    }

    /// The single user-facing action: start a recording, or stop the one in
    /// progress. Dead while a turn is in flight.
    pub fn on_toggle(&mut self) {
        match self.state {
            TurnState::Processing => debug!("toggle ignored while processing"),
            TurnState::Recording => self.stop_and_submit(),
            TurnState::Idle | TurnState::Error => self.begin_recording(),
        }
    }

    /// Apply an async result from the pipeline.
    pub fn dispatch(&mut self, event: AppEvent) {
        match event {
            AppEvent::RecordCeiling { session } => self.on_record_ceiling(session),
            AppEvent::ReplyReceived {
                transcript,
                response_text,
            } => self.on_reply(transcript, response_text),
            AppEvent::TurnFinished => self.on_turn_finished(),
            AppEvent::TurnFailed(e) => self.fail(e),
        }
    }

    /// Release everything the controller owns. Safe from any state.
    pub fn shutdown(&mut self) {
        self.release_ceiling_timer();
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.finish() {
                warn!("failed to finalize session during shutdown: {}", e);
            }
        }
        self.meter.reset();
        self.state = TurnState::Idle;
        info!("controller shut down");
    }

    fn begin_recording(&mut self) {
        self.session_seq += 1;
        match self.source.open(&self.meter) {
            Ok(session) => {
                self.session = Some(session);
                self.state = TurnState::Recording;
                self.last_error = None;
                self.ceiling_timer =
                    Some(self.pipeline.arm_safety_timer(self.session_seq, self.ceiling));
                info!(session = self.session_seq, "capture session started");
            }
            Err(e) => {
                self.fail(TurnError::Permission(e.to_string()));
            }
        }
    }

    /// Finalize the live session and hand the payload to the pipeline.
    /// Reached from the stop toggle and from the safety timer alike.
    fn stop_and_submit(&mut self) {
        let Some(mut session) = self.session.take() else {
            // stop() is idempotent: a second stop finds no session.
            return;
        };
        // The timer is released with the session it guards.
        self.release_ceiling_timer();
        match session.finish() {
            Ok(Some(recording)) if !recording.is_empty() => {
                self.state = TurnState::Processing;
                self.pipeline.submit(recording);
            }
            Ok(_) => {
                self.fail(TurnError::EmptyPayload);
            }
            Err(e) => {
                warn!("capture session failed to finalize: {}", e);
                self.fail(e.into());
            }
        }
    }

    fn release_ceiling_timer(&mut self) {
        if let Some(timer) = self.ceiling_timer.take() {
            timer.abort();
        }
    }

    fn on_record_ceiling(&mut self, session: u64) {
        if self.state != TurnState::Recording || session != self.session_seq {
            debug!(session, current = self.session_seq, "stale safety timer ignored");
            return;
        }
        info!(ceiling = ?self.ceiling, "safety timer elapsed, force-stopping");
        self.log.push(LogEntry::new(
            LogKind::System,
            "recording limit reached, processing",
        ));
        self.stop_and_submit();
    }

    fn on_reply(&mut self, transcript: String, response_text: String) {
        self.log.push(LogEntry::new(LogKind::User, transcript));
        self.log.push(LogEntry::new(LogKind::Agent, response_text));
    }

    fn on_turn_finished(&mut self) {
        if self.state == TurnState::Processing {
            self.state = TurnState::Idle;
        }
    }

    fn fail(&mut self, error: TurnError) {
        warn!("turn failed: {}", error);
        self.log.push(LogEntry::new(LogKind::Error, error.to_string()));
        self.last_error = Some(error.to_string());
        // Error is action-ready: the next toggle starts a fresh session.
        self.state = TurnState::Error;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    use async_trait::async_trait;
    use holler_audio::{CaptureError, PlayReply, Recording};
    use holler_client::{Bytes, ClientError, VoiceBackend, VoiceTurnReply};

    use super::*;

    /// Scripted microphone: yields a fixed number of samples per session.
    struct ScriptSource {
        samples: usize,
        fail_open: bool,
        fail_finish: bool,
        opens: Arc<AtomicUsize>,
        finishes: Arc<AtomicUsize>,
    }

    struct ScriptSession {
        recording: Option<Recording>,
        fail_finish: bool,
        finishes: Arc<AtomicUsize>,
    }

    impl CaptureSource for ScriptSource {
        type Session = ScriptSession;

        fn open(&self, _meter: &LevelMeter) -> Result<ScriptSession, CaptureError> {
            if self.fail_open {
                return Err(CaptureError::NoInputDevice);
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptSession {
                recording: Some(Recording::from_parts(
                    vec![0u8; self.samples.max(44)],
                    self.samples,
                    Duration::from_millis(self.samples as u64 / 16),
                )),
                fail_finish: self.fail_finish,
                finishes: self.finishes.clone(),
            })
        }
    }

    impl CaptureHandle for ScriptSession {
        fn finish(&mut self) -> Result<Option<Recording>, CaptureError> {
            if self.fail_finish {
                self.recording.take();
                return Err(CaptureError::Anyhow(anyhow::anyhow!(
                    "writer finalize failed"
                )));
            }
            let recording = self.recording.take();
            if recording.is_some() {
                self.finishes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(recording)
        }
    }

    struct MockBackend {
        fail_status: Option<u16>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VoiceBackend for MockBackend {
        async fn exchange(&self, _audio: Bytes) -> holler_client::Result<VoiceTurnReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_status {
                Some(status) => Err(ClientError::Backend {
                    status,
                    detail: "stt failed".to_string(),
                }),
                None => Ok(VoiceTurnReply {
                    transcript: "hello".to_string(),
                    response_text: "hola mundo".to_string(),
                    audio: Bytes::from_static(b"RIFFfake"),
                }),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct NullPlayer;

    impl PlayReply for NullPlayer {
        fn play(&self, _audio: &[u8]) -> Result<(), holler_audio::PlaybackError> {
            Ok(())
        }
    }

    struct Fixture {
        controller: TurnController<ScriptSource>,
        events: Receiver<AppEvent>,
        backend_calls: Arc<AtomicUsize>,
        opens: Arc<AtomicUsize>,
    }

    fn fixture(samples: usize, fail_status: Option<u16>, fail_open: bool) -> Fixture {
        fixture_with(samples, fail_status, fail_open, false, Duration::from_secs(10))
    }

    fn fixture_with(
        samples: usize,
        fail_status: Option<u16>,
        fail_open: bool,
        fail_finish: bool,
        ceiling: Duration,
    ) -> Fixture {
        let backend_calls = Arc::new(AtomicUsize::new(0));
        let opens = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let pipeline = TurnPipeline::new(
            Arc::new(MockBackend {
                fail_status,
                calls: backend_calls.clone(),
            }),
            Arc::new(NullPlayer),
            tx,
        )
        .unwrap();
        let source = ScriptSource {
            samples,
            fail_open,
            fail_finish,
            opens: opens.clone(),
            finishes: Arc::new(AtomicUsize::new(0)),
        };
        Fixture {
            controller: TurnController::new(source, pipeline, ceiling),
            events: rx,
            backend_calls,
            opens,
        }
    }

    /// Feed pipeline events into the controller until it settles.
    fn pump(fx: &mut Fixture) {
        while matches!(fx.controller.state(), TurnState::Processing) {
            let event = fx
                .events
                .recv_timeout(Duration::from_secs(5))
                .expect("pipeline event");
            fx.controller.dispatch(event);
        }
    }

    fn log_messages(fx: &Fixture, kind: LogKind) -> Vec<String> {
        fx.controller
            .log()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message.clone())
            .collect()
    }

    #[test]
    fn toggle_starts_and_stops_a_turn() {
        let mut fx = fixture(1600, None, false);
        assert_eq!(fx.controller.state(), TurnState::Idle);
        assert!(fx.controller.status_line().starts_with("Ready"));

        fx.controller.on_toggle();
        assert_eq!(fx.controller.state(), TurnState::Recording);
        assert!(fx.controller.has_session());

        fx.controller.on_toggle();
        assert_eq!(fx.controller.state(), TurnState::Processing);
        assert!(!fx.controller.has_session());

        pump(&mut fx);
        assert_eq!(fx.controller.state(), TurnState::Idle);
        assert_eq!(log_messages(&fx, LogKind::User), vec!["hello"]);
        assert_eq!(log_messages(&fx, LogKind::Agent), vec!["hola mundo"]);
    }

    #[test]
    fn empty_recording_never_reaches_the_backend() {
        let mut fx = fixture(0, None, false);

        fx.controller.on_toggle();
        fx.controller.on_toggle();

        assert_eq!(fx.controller.state(), TurnState::Error);
        assert_eq!(fx.backend_calls.load(Ordering::SeqCst), 0);
        assert!(!log_messages(&fx, LogKind::Error).is_empty());
        // Error is action-ready, not terminal.
        assert!(fx.controller.state().toggle_enabled());
    }

    #[test]
    fn permission_failure_surfaces_and_stays_action_ready() {
        let mut fx = fixture(1600, None, true);

        fx.controller.on_toggle();

        assert_eq!(fx.controller.state(), TurnState::Error);
        assert!(!fx.controller.has_session());
        let errors = log_messages(&fx, LogKind::Error);
        assert!(errors[0].contains("microphone unavailable"));
    }

    #[test]
    fn backend_error_logs_detail_and_resets() {
        let mut fx = fixture(1600, Some(500), false);

        fx.controller.on_toggle();
        fx.controller.on_toggle();
        pump(&mut fx);

        assert_eq!(fx.controller.state(), TurnState::Error);
        let errors = log_messages(&fx, LogKind::Error);
        assert!(errors[0].contains("stt failed"), "got {errors:?}");
        assert!(fx.controller.status_line().contains("stt failed"));
        assert!(fx.controller.state().toggle_enabled());
    }

    #[test]
    fn safety_ceiling_force_stops_and_second_stop_is_noop() {
        let mut fx = fixture(1600, None, false);

        fx.controller.on_toggle();
        let live_session = 1;
        fx.controller.dispatch(AppEvent::RecordCeiling {
            session: live_session,
        });
        assert_eq!(fx.controller.state(), TurnState::Processing);

        // The user's late stop press and a duplicate ceiling must both be
        // no-ops now.
        fx.controller.on_toggle();
        fx.controller.dispatch(AppEvent::RecordCeiling {
            session: live_session,
        });
        assert_eq!(fx.controller.state(), TurnState::Processing);
        pump(&mut fx);
        assert_eq!(fx.controller.state(), TurnState::Idle);
        assert_eq!(fx.backend_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_ceiling_from_previous_session_is_ignored() {
        let mut fx = fixture(1600, None, false);

        fx.controller.on_toggle();
        fx.controller.on_toggle();
        pump(&mut fx);

        fx.controller.on_toggle();
        assert_eq!(fx.controller.state(), TurnState::Recording);
        // Ceiling for session 1 arrives while session 2 is live.
        fx.controller.dispatch(AppEvent::RecordCeiling { session: 1 });
        assert_eq!(fx.controller.state(), TurnState::Recording);
        assert!(fx.controller.has_session());
    }

    #[test]
    fn finalize_failure_is_not_reported_as_silence() {
        let mut fx = fixture_with(1600, None, false, true, Duration::from_secs(10));

        fx.controller.on_toggle();
        fx.controller.on_toggle();

        assert_eq!(fx.controller.state(), TurnState::Error);
        assert_eq!(fx.backend_calls.load(Ordering::SeqCst), 0);
        let errors = log_messages(&fx, LogKind::Error);
        assert!(errors[0].contains("microphone unavailable"), "got {errors:?}");
        assert!(!errors[0].contains("nothing recorded"));
    }

    #[test]
    fn manual_stop_releases_the_safety_timer() {
        let mut fx = fixture_with(1600, None, false, false, Duration::from_millis(40));

        fx.controller.on_toggle();
        fx.controller.on_toggle();
        pump(&mut fx);
        assert_eq!(fx.controller.state(), TurnState::Idle);

        // The timer was released with the session, so nothing more arrives
        // after the ceiling would have elapsed.
        assert!(fx.events.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn toggle_is_dead_while_processing() {
        let mut fx = fixture(1600, None, false);

        fx.controller.on_toggle();
        fx.controller.on_toggle();
        assert_eq!(fx.controller.state(), TurnState::Processing);

        fx.controller.on_toggle();
        assert!(!fx.controller.has_session());
        assert_eq!(fx.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ten_sequential_turns_hold_at_most_one_session_and_timer() {
        let mut fx = fixture_with(1600, None, false, false, Duration::from_millis(50));

        for _ in 0..10 {
            fx.controller.on_toggle();
            assert_eq!(fx.controller.state(), TurnState::Recording);
            assert!(fx.controller.has_session());

            fx.controller.on_toggle();
            assert!(!fx.controller.has_session());
            pump(&mut fx);
            assert_eq!(fx.controller.state(), TurnState::Idle);
            assert!(fx.controller.status_line().starts_with("Ready"));
        }
        assert_eq!(fx.opens.load(Ordering::SeqCst), 10);
        assert_eq!(fx.backend_calls.load(Ordering::SeqCst), 10);
        // Every turn released its timer on stop; none of the ten survive to
        // fire after the fact.
        assert!(fx.events.recv_timeout(Duration::from_millis(250)).is_err());
    }

    #[test]
    fn shutdown_releases_a_live_session_and_timer() {
        let mut fx = fixture_with(1600, None, false, false, Duration::from_millis(40));

        fx.controller.on_toggle();
        assert!(fx.controller.has_session());

        fx.controller.shutdown();
        assert!(!fx.controller.has_session());
        assert_eq!(fx.controller.state(), TurnState::Idle);
        assert!(fx.events.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
