//! Continuous speech recognition sessions
//!
//! One [`RecognitionSession`] exists per [`RecognitionMode`]. Each session runs
//! a small state machine and keeps listening for as long as its mode is
//! active, restarting after natural ends and transient errors.
//!
//! ## States
//!
//! ```text
//! ┌──────┐  start   ┌──────────┐  started  ┌───────────┐
//! │ IDLE │─────────►│ STARTING │──────────►│ LISTENING │
//! └──────┘          └──────────┘           └───────────┘
//!    ▲                  │  ▲                  │     │
//!    │        error     │  │  restart timer   │ end │ error
//!    │                  ▼  │                  ▼     ▼
//!    │              ┌─────────┐          ┌───────┐
//!    │◄─────────────│ ERRORED │          │ ENDED │
//!    │    stop      └─────────┘          └───────┘
//!    │◄──────────────────────────────────────┘ stop
//! ```
//!
//! Errors are classified by [`RecognitionErrorKind`]: `aborted` is the normal
//! shutdown path and returns to Idle, `no-speech` and unknown errors schedule a
//! restart, and a permission denial blocks the microphone for every mode until
//! voice is switched off and on again.
//!
//! Platform callbacks arrive through the controller as `on_start`,
//! `on_result`, `on_error` and `on_end`. Backends may deliver them from inside
//! [`RecognitionBackend::start`] or [`RecognitionBackend::stop`]; no lock is
//! held across those calls.

pub mod session;
pub mod state;

pub use session::RecognitionSession;
pub use state::{
    RestartPolicy, SessionEffect, SessionEvent, SessionState, SessionStateMachine,
    TransitionReason, TransitionResult,
};

use crate::error::RecognitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which listener owns a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionMode {
    /// Site-wide navigation commands
    Navigation,
    /// Profile-page commands (tabs, logout, admin)
    Profile,
    /// Hands-free login/signup form filling
    VoiceAuth,
}

impl RecognitionMode {
    pub const ALL: [RecognitionMode; 3] = [
        RecognitionMode::Navigation,
        RecognitionMode::Profile,
        RecognitionMode::VoiceAuth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMode::Navigation => "navigation",
            RecognitionMode::Profile => "profile",
            RecognitionMode::VoiceAuth => "voice-auth",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recognition event from the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    /// Recognised text
    pub text: String,
    /// Recogniser confidence, 0.0 to 1.0
    pub confidence: f32,
    /// False for interim hypotheses
    pub is_final: bool,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl TranscriptResult {
    /// A final result stamped with the current time
    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
            timestamp_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    /// An interim result stamped with the current time
    pub fn interim(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_final: false,
            ..Self::final_result(text, confidence)
        }
    }
}

/// Classified platform error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionErrorKind {
    /// Produced by our own stop; never a failure
    Aborted,
    /// Silence timeout
    NoSpeech,
    /// Microphone permission denied
    NotAllowed,
    /// Recognition service refused
    ServiceNotAllowed,
    Network,
    AudioCapture,
    Other(String),
}

impl RecognitionErrorKind {
    /// Classify a platform error code such as `"no-speech"`
    pub fn from_platform(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "aborted" => Self::Aborted,
            "no-speech" => Self::NoSpeech,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "network" => Self::Network,
            "audio-capture" => Self::AudioCapture,
            other => Self::Other(other.to_string()),
        }
    }

    /// Permission denials that disable the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotAllowed | Self::ServiceNotAllowed)
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => f.write_str("aborted"),
            Self::NoSpeech => f.write_str("no-speech"),
            Self::NotAllowed => f.write_str("not-allowed"),
            Self::ServiceNotAllowed => f.write_str("service-not-allowed"),
            Self::Network => f.write_str("network"),
            Self::AudioCapture => f.write_str("audio-capture"),
            Self::Other(code) => f.write_str(code),
        }
    }
}

/// Parameters handed to the backend on every start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl RecognitionSettings {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            continuous: true,
            interim_results: true,
        }
    }
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self::new("en-US")
    }
}

/// Platform speech recogniser
///
/// `start` only requests recognition; the platform confirms later through
/// the controller's `on_start` callback.
pub trait RecognitionBackend: Send + Sync {
    /// Whether the platform can recognise speech at all
    fn is_supported(&self) -> bool;

    /// Request a continuous session for `mode`
    fn start(
        &self,
        mode: RecognitionMode,
        settings: &RecognitionSettings,
    ) -> Result<(), RecognitionError>;

    /// Stop the session for `mode`; the platform answers with `aborted`
    fn stop(&self, mode: RecognitionMode);
}
