//! Terminal surface: pulsing indicator, status line, conversation log.
//!
//! The render step is pure (state in, characters out) so it can be tested
//! without a terminal; `TerminalUi` owns the raw-mode screen and restores it
//! on drop, which kills the render loop on every exit path.

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
    enable_raw_mode,
};
use crossterm::{event, execute, queue};
use holler_core::{APP_NAME_PRETTY, LogEntry, TurnState};

use crate::VERSION;

/// Refresh cadence of the render loop.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Ring geometry: radius in character cells, idle to full loudness.
const RING_BASE: f32 = 3.0;
const RING_SPAN: f32 = 5.0;

/// Ring opacity while a session is live vs the idle pulse.
const ALPHA_RECORDING: f32 = 0.9;
const ALPHA_IDLE: f32 = 0.25;

/// Log lines shown under the status line.
const LOG_TAIL: usize = 12;

/// One rendered state of the pulsing indicator: an outer ring whose radius
/// tracks loudness and whose alpha tracks recording state, and an inner
/// disc that fills with loudness only while recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorFrame {
    pub ring_radius: f32,
    pub ring_alpha: f32,
    pub disc_intensity: f32,
}

/// Pure render step: current loudness and state in, frame out.
pub fn indicator_frame(level: f32, state: TurnState) -> IndicatorFrame {
    let level = level.clamp(0.0, 1.0);
    if state == TurnState::Recording {
        IndicatorFrame {
            ring_radius: RING_BASE + RING_SPAN * level,
            ring_alpha: ALPHA_RECORDING,
            disc_intensity: level,
        }
    } else {
        IndicatorFrame {
            ring_radius: RING_BASE,
            ring_alpha: ALPHA_IDLE,
            disc_intensity: 0.0,
        }
    }
}

/// Character rendition of a frame, centered in a fixed-width field.
pub fn render_indicator(frame: &IndicatorFrame) -> String {
    let radius = frame.ring_radius.round() as usize;
    let max = (RING_BASE + RING_SPAN).round() as usize;
    let radius = radius.clamp(1, max);

    const RAMP: [char; 6] = [' ', '\u{b7}', '\u{2591}', '\u{2592}', '\u{2593}', '\u{2588}'];
    let disc = RAMP[((frame.disc_intensity.clamp(0.0, 1.0)) * 5.0).round() as usize];
    let (open, close) = if frame.ring_alpha >= 0.5 {
        ('(', ')')
    } else {
        ('.', '.')
    };

    let outer_pad = " ".repeat(max - radius);
    let inner_pad = " ".repeat(radius - 1);
    format!("{outer_pad}{open}{inner_pad}{disc}{inner_pad}{close}{outer_pad}")
}

/// Horizontal loudness bar for the same level the ring pulses with.
pub fn render_level_bar(level: f32) -> String {
    const CELLS: usize = 20;
    let filled = ((level.clamp(0.0, 1.0)) * CELLS as f32).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "\u{2588}".repeat(filled),
        " ".repeat(CELLS - filled),
        level.clamp(0.0, 1.0) * 100.0
    )
}

/// The user's key presses, reduced to the two actions the app understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    /// Start or stop recording
    Toggle,
    /// Leave the app
    Quit,
}

/// Raw-mode terminal owner. Construction switches the terminal over;
/// dropping it restores the screen no matter how the loop ended.
pub struct TerminalUi {
    out: Stdout,
}

impl TerminalUi {
    pub fn new() -> io::Result<Self> {
        let mut out = io::stdout();
        enable_raw_mode()?;
        execute!(out, EnterAlternateScreen, Hide)?;
        Ok(Self { out })
    }

    /// Redraw the whole surface. Called every refresh tick, whether or not
    /// anything changed.
    pub fn draw(
        &mut self,
        frame: &IndicatorFrame,
        level: f32,
        status: &str,
        log: &[LogEntry],
    ) -> io::Result<()> {
        queue!(self.out, MoveTo(0, 0), Clear(ClearType::All))?;
        queue!(
            self.out,
            Print(format!("{APP_NAME_PRETTY} v{VERSION}")),
            MoveTo(0, 2),
            Print(render_indicator(frame)),
            MoveTo(0, 3),
            Print(render_level_bar(level)),
            MoveTo(0, 5),
            Print(status),
        )?;

        let tail_start = log.len().saturating_sub(LOG_TAIL);
        for (row, entry) in log[tail_start..].iter().enumerate() {
            queue!(
                self.out,
                MoveTo(0, 7 + row as u16),
                Print(format!(
                    "{} {:>6}: {}",
                    entry.time_hms(),
                    entry.kind.label(),
                    entry.message
                )),
            )?;
        }
        self.out.flush()
    }

    /// Wait up to `timeout` for a key press and map it to an action. The
    /// timeout doubles as the frame pacing for the render loop.
    pub fn poll_action(&mut self, timeout: Duration) -> io::Result<Option<UiAction>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        let Event::Key(key) = event::read()? else {
            return Ok(None);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(None);
        }
        Ok(match key.code {
            KeyCode::Char(' ') | KeyCode::Enter => Some(UiAction::Toggle),
            KeyCode::Char('q') | KeyCode::Esc => Some(UiAction::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(UiAction::Quit)
            }
            _ => None,
        })
    }
}

impl Drop for TerminalUi {
    fn drop(&mut self) {
        execute!(self.out, Show, LeaveAlternateScreen).ok();
        disable_raw_mode().ok();
    }
}
