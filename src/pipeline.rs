//! Async half of a voice turn.
//!
//! The controller hands a finalized recording to this pipeline, which
//! performs the one-shot backend exchange and reply playback on its own
//! runtime, reporting progress back over the app event channel. The safety
//! timer for live capture sessions also runs here so the controller thread
//! never blocks.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use bytes::Bytes;
use holler_audio::{PlayReply, Recording};
use holler_client::VoiceBackend;
use tokio::runtime::Runtime;
use tokio::task::AbortHandle;
use tracing::{error, info};

use crate::error::TurnError;
use crate::event::AppEvent;

/// Runs backend exchanges and reply playback off the controller thread.
/// At most one turn is in flight at a time; the controller enforces this
/// by refusing to start a session while Processing.
pub struct TurnPipeline {
    runtime: Runtime,
    backend: Arc<dyn VoiceBackend>,
    player: Arc<dyn PlayReply>,
    events: Sender<AppEvent>,
}

impl TurnPipeline {
    /// Create a new pipeline instance with its own single-worker runtime.
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        player: Arc<dyn PlayReply>,
        events: Sender<AppEvent>,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            backend,
            player,
            events,
        })
    }

    /// Submit a finalized recording for one turn. Non-blocking; the outcome
    /// arrives as `ReplyReceived`/`TurnFinished`/`TurnFailed` events.
    pub fn submit(&self, recording: Recording) {
        info!(
            samples = recording.samples(),
            bytes = recording.data().len(),
            length_seconds = recording.duration().as_secs_f64(),
            backend = self.backend.name(),
            "audio submitted"
        );

        let backend = self.backend.clone();
        let player = self.player.clone();
        let events = self.events.clone();

        self.runtime.spawn(run_turn(backend, player, recording, events));
    }

    /// Arm the safety timer for capture session `session`. Returns the abort
    /// handle so the caller can release the timer together with the session
    /// it guards; the session counter in the event covers the race where the
    /// timer fires before the abort lands.
    pub fn arm_safety_timer(&self, session: u64, ceiling: Duration) -> AbortHandle {
        let events = self.events.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(ceiling).await;
            events.send(AppEvent::RecordCeiling { session }).ok();
        });
        task.abort_handle()
    }
}

/// One turn: exchange, then play the reply to completion.
async fn run_turn(
    backend: Arc<dyn VoiceBackend>,
    player: Arc<dyn PlayReply>,
    recording: Recording,
    events: Sender<AppEvent>,
) {
    let audio = Bytes::from(recording.into_data());

    let before = Instant::now();
    let reply = match backend.exchange(audio).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("voice turn exchange failed: {:?}", e);
            events.send(AppEvent::TurnFailed(e.into())).ok();
            return;
        }
    };
    info!(
        duration = ?before.elapsed(),
        reply_bytes = reply.audio.len(),
        "exchange completed"
    );

    events
        .send(AppEvent::ReplyReceived {
            transcript: reply.transcript,
            response_text: reply.response_text,
        })
        .ok();

    // Playback opens a device and blocks until the reply has played out.
    let audio = reply.audio;
    let outcome = tokio::task::spawn_blocking(move || player.play(&audio)).await;

    match outcome {
        Ok(Ok(())) => {
            events.send(AppEvent::TurnFinished).ok();
        }
        Ok(Err(e)) => {
            error!("reply playback failed: {:?}", e);
            events.send(AppEvent::TurnFailed(e.into())).ok();
        }
        Err(e) => {
            error!("playback task panicked: {:?}", e);
            events
                .send(AppEvent::TurnFailed(TurnError::Playback(e.to_string())))
                .ok();
        }
    }
}
