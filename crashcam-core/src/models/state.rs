use super::error::CrashCamError;

/// Persistence pipeline state machine.
///
/// State transitions:
/// ```text
/// idle → waiting_window → awaiting_handoff → draining → concatenating
///      → encrypting → persisting → cleaning_up → completed
/// any state → failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PersistState {
    Idle,
    WaitingWindow,
    AwaitingHandoff,
    Draining,
    Concatenating,
    Encrypting,
    Persisting,
    CleaningUp,
    Completed,
    Failed(CrashCamError),
}

impl PersistState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }

    /// Cancellation is only honoured before the handoff begins.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Idle | Self::WaitingWindow)
    }

    pub fn error(&self) -> Option<&CrashCamError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingWindow => "waiting_window",
            Self::AwaitingHandoff => "awaiting_handoff",
            Self::Draining => "draining",
            Self::Concatenating => "concatenating",
            Self::Encrypting => "encrypting",
            Self::Persisting => "persisting",
            Self::CleaningUp => "cleaning_up",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }
}
