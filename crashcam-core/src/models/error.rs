use thiserror::Error;

/// Errors raised by the fragment buffer and the persistence pipeline.
///
/// The pipeline only surfaces a boolean to the control thread, but the
/// failing variant is kept in `PersistState::Failed` and returned from
/// `PersistJob::join`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrashCamError {
    #[error("no recording metadata supplied")]
    MissingMetadata,

    #[error("fragment buffer is empty")]
    EmptyBuffer,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("fragments contain no video tracks")]
    NoVideoTracks,

    #[error("container error: {0}")]
    ContainerError(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("persisting was cancelled")]
    Cancelled,

    #[error("handoff with the control thread was broken")]
    HandoffBroken,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("fragment buffer has been destroyed")]
    BufferDestroyed,

    #[error("persist worker panicked")]
    WorkerPanicked,
}

/// Coarse failure classification for a `CrashCamError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Missing or invalid input (no metadata, empty drain, bad configuration).
    MissingInput,
    /// Unwritable file, unreadable fragment.
    Io,
    /// No video tracks, malformed or incompatible container.
    Transform,
    /// Crypto provider failure.
    Crypto,
    /// Cancelled wait, broken or expired handoff, destroyed buffer, lost worker.
    Coordination,
}

impl CrashCamError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::MissingMetadata | Self::EmptyBuffer | Self::ConfigurationFailed(_) => {
                FailureClass::MissingInput
            }
            Self::StorageError(_) => FailureClass::Io,
            Self::NoVideoTracks | Self::ContainerError(_) => FailureClass::Transform,
            Self::EncryptionFailed(_) => FailureClass::Crypto,
            Self::Cancelled
            | Self::HandoffBroken
            | Self::Timeout(_)
            | Self::BufferDestroyed
            | Self::WorkerPanicked => FailureClass::Coordination,
        }
    }

    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        Self::StorageError(format!("{}: {}", context, err))
    }
}
