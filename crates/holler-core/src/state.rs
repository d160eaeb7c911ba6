//! Turn state types.

/// The current phase of the voice turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for the user to start a recording
    Idle,
    /// A capture session is live and accumulating audio
    Recording,
    /// A finalized payload is in flight (request or reply playback)
    Processing,
    /// The previous turn failed; action-ready, not terminal
    Error,
}

impl TurnState {
    /// Whether the start/stop toggle is accepted in this state. Exactly one
    /// request may be in flight, so the toggle is dead while Processing.
    pub fn toggle_enabled(self) -> bool {
        !matches!(self, TurnState::Processing)
    }

    /// Whether a capture session may exist in this state.
    pub fn session_allowed(self) -> bool {
        matches!(self, TurnState::Recording)
    }
}
