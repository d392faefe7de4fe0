//! Application event bus
//!
//! The voice layer never touches modals or panels directly. It publishes
//! [`AppEvent`]s and the host's components subscribe to the ones they own.
//!
//! - `voice-open-form` - open the login or signup modal
//! - `toggle-simplified-ui` - flip the simplified layout
//! - `toggle-reading-mode` - flip reading mode
//! - `voice-switch-profile-tab` - select a profile section
//! - `voice-permission-denied` - microphone access was refused (shown once)
//! - `voice-unsupported` - the platform has no speech recognition
//! - `voice-state-change` - a recognition session changed state

use crate::intent::AuthFormKind;
use crate::recognition::{RecognitionMode, SessionState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber
const DEFAULT_CAPACITY: usize = 64;

/// Events published to the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "detail", rename_all = "kebab-case")]
pub enum AppEvent {
    VoiceOpenForm {
        #[serde(rename = "formType")]
        form_type: AuthFormKind,
    },
    ToggleSimplifiedUi,
    ToggleReadingMode,
    VoiceSwitchProfileTab {
        index: usize,
    },
    VoicePermissionDenied {
        mode: RecognitionMode,
    },
    VoiceUnsupported,
    VoiceStateChange {
        mode: RecognitionMode,
        previous: SessionState,
        state: SessionState,
    },
}

impl AppEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::VoiceOpenForm { .. } => "voice-open-form",
            AppEvent::ToggleSimplifiedUi => "toggle-simplified-ui",
            AppEvent::ToggleReadingMode => "toggle-reading-mode",
            AppEvent::VoiceSwitchProfileTab { .. } => "voice-switch-profile-tab",
            AppEvent::VoicePermissionDenied { .. } => "voice-permission-denied",
            AppEvent::VoiceUnsupported => "voice-unsupported",
            AppEvent::VoiceStateChange { .. } => "voice-state-change",
        }
    }
}

/// Publish/subscribe channel shared by every voice component
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: AppEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!("Emitted {} to {} subscriber(s)", name, receivers),
            Err(_) => tracing::debug!("Emitted {} with no subscribers", name),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
