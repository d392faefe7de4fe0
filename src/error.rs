//! Error types for the voice layer
//!
//! Platform callbacks never propagate these out of the crate; they are
//! returned by the trait seams and logged by the components that call them.

use crate::recognition::RecognitionMode;
use thiserror::Error;

/// Errors raised when starting a recognition session
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Speech recognition is not supported on this platform")]
    Unsupported,

    #[error("Recognition for {0} mode is locked out after a permission denial")]
    LockedOut(RecognitionMode),

    #[error("Recognition backend failed: {0}")]
    Backend(String),
}

/// Errors from the speech output chain
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Remote synthesis is not configured")]
    NotConfigured,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Remote synthesis returned no audio")]
    EmptyAudio,

    #[error("Audio playback failed: {0}")]
    Playback(String),

    #[error("Local speech synthesis is not available")]
    LocalUnavailable,

    #[error("Utterance was superseded by a newer request")]
    Superseded,
}

/// Errors reported by host collaborators while dispatching a command
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Target not found: {0}")]
    TargetMissing(String),

    #[error("Host action failed: {0}")]
    Host(String),
}
