use serde::{Deserialize, Serialize};

/// State of a recording session
///
/// This is the state-machine state only; turning it into display text is
/// the caller's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Initializing,
    Recording,
    Paused,
    SwitchingSegment,
    Finalizing,
    Completed,
    Empty,
    Error,
}

impl SessionStatus {
    /// Completed, Empty and Error end a session; only discard leaves them
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Empty | SessionStatus::Error
        )
    }

    /// States in which the session owns an open device
    pub fn is_capturing(self) -> bool {
        matches!(
            self,
            SessionStatus::Recording | SessionStatus::Paused | SessionStatus::SwitchingSegment
        )
    }

    /// States in which encoded chunks are still taken into the open segment
    pub fn accepts_chunks(self) -> bool {
        self.is_capturing() || self == SessionStatus::Finalizing
    }
}
