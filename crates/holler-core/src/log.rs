//! Append-only conversation log shown under the status line.
//!
//! Entries are rendering-only; nothing reads them back for control flow.

use chrono::{DateTime, Local};

/// Who or what produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Transcript of what the user said
    User,
    /// The assistant's decoded reply text
    Agent,
    /// Lifecycle notices (ready, shutting down, ...)
    System,
    /// A failed turn, with the surfaced reason
    Error,
}

impl LogKind {
    pub fn label(self) -> &'static str {
        match self {
            LogKind::User => "user",
            LogKind::Agent => "agent",
            LogKind::System => "system",
            LogKind::Error => "error",
        }
    }
}

/// One line of the conversation log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub kind: LogKind,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    /// Wall-clock time of the entry, formatted for the log pane.
    pub fn time_hms(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_kinds() {
        assert_eq!(LogKind::User.label(), "user");
        assert_eq!(LogKind::Agent.label(), "agent");
        assert_eq!(LogKind::System.label(), "system");
        assert_eq!(LogKind::Error.label(), "error");
    }

    #[test]
    fn time_is_hms() {
        let entry = LogEntry::new(LogKind::System, "ready");
        assert_eq!(entry.time_hms().len(), 8);
        assert_eq!(entry.message, "ready");
    }
}
