use std::sync::Arc;
use std::sync::mpsc;
use std::time::Instant;

use anyhow::Result;
use holler::controller::TurnController;
use holler::pipeline::TurnPipeline;
use holler::ui::{FRAME_INTERVAL, TerminalUi, UiAction, indicator_frame};
use holler::{
    ConfigManager, CpalPlayer, DEFAULT_LOG_LEVEL, HttpBackend, LEVEL_INTERVAL, PlayReply,
    Recorder, VoiceBackend,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize the logger. Stderr only: stdout belongs to the raw-mode
    // screen, so redirect 2>holler.log to keep traces.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HOLLER_LOG")
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load()?;
    // save back the config to create the file if it doesn't exist
    config_manager.save(&config)?;

    info!(
        endpoint = config.endpoint(),
        record_ceiling = ?config.record_ceiling(),
        config_path = ?config_manager.config_path(),
        "Holler starting"
    );

    // Async results from the pipeline land back on this channel.
    let (event_tx, event_rx) = mpsc::channel();

    let backend: Arc<dyn VoiceBackend> = Arc::new(HttpBackend::new(config.endpoint()));
    let player: Arc<dyn PlayReply> = Arc::new(CpalPlayer::new());
    let pipeline = TurnPipeline::new(backend, player, event_tx)?;

    let mut controller = TurnController::new(Recorder::new(), pipeline, config.record_ceiling());

    let mut ui = TerminalUi::new()?;
    let mut level = 0.0f32;
    let mut last_sample = Instant::now();

    info!("Holler ready");

    loop {
        // Apply whatever the pipeline finished since the last frame.
        while let Ok(event) = event_rx.try_recv() {
            controller.dispatch(event);
        }

        // Loudness is sampled on its own cadence so a throttled redraw
        // never yields stale pulses.
        if last_sample.elapsed() >= LEVEL_INTERVAL {
            level = controller.level();
            last_sample = Instant::now();
        }

        let frame = indicator_frame(level, controller.state());
        ui.draw(&frame, level, &controller.status_line(), controller.log())?;

        // Key polling doubles as the frame pacing.
        match ui.poll_action(FRAME_INTERVAL)? {
            Some(UiAction::Toggle) => controller.on_toggle(),
            Some(UiAction::Quit) => break,
            None => {}
        }
    }

    // Leave raw mode before the final log lines so they land on a sane
    // terminal, then release whatever the controller still owns.
    drop(ui);
    controller.shutdown();
    info!("Holler stopped");

    Ok(())
}
