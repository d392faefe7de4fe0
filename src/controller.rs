//! Voice controller
//!
//! Owns the live toggles, the mode arbiter, the classifiers and the
//! dispatcher, and is the single entry point for platform recognition
//! callbacks. Every entry point returns `()`; failures are logged.

use crate::arbitration::{ArbitrationChange, ModeArbiter, ModeInputs};
use crate::binder::HoverSpeechBinder;
use crate::config::Config;
use crate::cooldown::CommandCooldown;
use crate::dispatch::{CommandDispatcher, DispatchOutcome};
use crate::events::AppEvent;
use crate::flags::LiveFlag;
use crate::host::Host;
use crate::intent::{
    AuthFormKind, ClassifyContext, Intent, NavigationClassifier, ProfileClassifier,
    VoiceAuthClassifier, VoiceAuthFieldState,
};
use crate::recognition::{
    RecognitionBackend, RecognitionErrorKind, RecognitionMode, RecognitionSession,
    RecognitionSettings, RestartPolicy, SessionState, TranscriptResult,
};
use crate::shortcuts::{ShortcutAction, ShortcutMap};
use crate::speech::{GatedSpeech, SpeechOutput};
use parking_lot::Mutex;
use std::sync::Arc;

/// Orchestrates recognition, classification and dispatch
///
/// Cheap to clone; clones share the same controller.
#[derive(Clone)]
pub struct VoiceController {
    shared: Arc<ControllerShared>,
}

struct ControllerShared {
    host: Host,
    /// Ungated output, used for explicit stops
    speech: Arc<dyn SpeechOutput>,
    /// Output gated by the spoken-feedback toggle
    feedback: GatedSpeech,
    tts_enabled: LiveFlag,
    reduced_motion: LiveFlag,
    arbiter: ModeArbiter,
    navigation: NavigationClassifier,
    profile: ProfileClassifier,
    voice_auth: VoiceAuthClassifier,
    cooldown: CommandCooldown,
    dispatcher: CommandDispatcher,
    fields: Mutex<VoiceAuthFieldState>,
    shortcuts: ShortcutMap,
    hover: HoverSpeechBinder,
}

impl VoiceController {
    /// Build the controller and apply the initial toggles from `config`
    pub fn new(
        config: &Config,
        backend: Arc<dyn RecognitionBackend>,
        speech: Arc<dyn SpeechOutput>,
        host: Host,
    ) -> Self {
        let recognition = &config.recognition;
        let tts_enabled = LiveFlag::new(config.voice.tts_enabled);
        let reduced_motion = LiveFlag::new(config.accessibility.reduced_motion);
        let feedback = GatedSpeech::new(speech.clone(), tts_enabled.clone());

        let mut inputs = ModeInputs::new(host.router.current_path());
        inputs.voice_control_enabled = config.voice.voice_control_enabled;
        inputs.voice_auth_enabled = config.voice.voice_auth_enabled;

        let arbiter = ModeArbiter::new(
            backend,
            RecognitionSettings::new(recognition.language.clone()),
            RestartPolicy::from(recognition),
            host.events.clone(),
            inputs,
        );

        let hover = HoverSpeechBinder::new(Arc::new(feedback.clone()), tts_enabled.clone());
        let dispatcher = CommandDispatcher::new(
            host.clone(),
            Arc::new(feedback.clone()),
            reduced_motion.clone(),
        );

        let controller = Self {
            shared: Arc::new(ControllerShared {
                host,
                speech,
                feedback,
                tts_enabled,
                reduced_motion,
                arbiter,
                navigation: NavigationClassifier::new(recognition.navigation_threshold),
                profile: ProfileClassifier::new(recognition.profile_threshold),
                voice_auth: VoiceAuthClassifier::new(recognition.voice_auth_threshold),
                cooldown: CommandCooldown::new(recognition.command_cooldown()),
                dispatcher,
                fields: Mutex::new(VoiceAuthFieldState::default()),
                shortcuts: ShortcutMap::from_config(&config.accessibility),
                hover,
            }),
        };

        controller.shared.arbiter.reconcile();
        tracing::info!("Voice controller ready");
        controller
    }

    pub fn active_mode(&self) -> Option<RecognitionMode> {
        self.shared.arbiter.active_mode()
    }

    pub fn inputs(&self) -> ModeInputs {
        self.shared.arbiter.inputs()
    }

    pub fn session(&self, mode: RecognitionMode) -> RecognitionSession {
        self.shared.arbiter.session(mode).clone()
    }

    pub fn session_state(&self, mode: RecognitionMode) -> SessionState {
        self.session(mode).state()
    }

    pub fn field_state(&self) -> VoiceAuthFieldState {
        self.shared.fields.lock().clone()
    }

    pub fn tts_enabled(&self) -> LiveFlag {
        self.shared.tts_enabled.clone()
    }

    pub fn reduced_motion(&self) -> LiveFlag {
        self.shared.reduced_motion.clone()
    }

    /// Speech output gated by the spoken-feedback toggle
    pub fn feedback(&self) -> GatedSpeech {
        self.shared.feedback.clone()
    }

    /// Hover/focus speech registry, silent while spoken feedback is off
    pub fn hover_binder(&self) -> HoverSpeechBinder {
        self.shared.hover.clone()
    }

    /// Whether a permission denial has blocked the microphone
    pub fn is_microphone_denied(&self) -> bool {
        self.shared.arbiter.is_microphone_denied()
    }

    // ---- toggles -------------------------------------------------------

    pub fn set_voice_control_enabled(&self, enabled: bool) {
        if enabled && !self.inputs().voice_control_enabled {
            self.shared.arbiter.clear_microphone_denial();
        }
        let change = self.update(|inputs| inputs.voice_control_enabled = enabled);
        tracing::info!("Voice control {}", if enabled { "enabled" } else { "disabled" });
        if change.switched() {
            self.shared.feedback.speak(if enabled {
                "Voice control enabled"
            } else {
                "Voice control disabled"
            });
        }
    }

    /// Returns the new state
    pub fn toggle_voice_control(&self) -> bool {
        let enabled = !self.inputs().voice_control_enabled;
        self.set_voice_control_enabled(enabled);
        enabled
    }

    pub fn set_voice_auth_enabled(&self, enabled: bool) {
        if !enabled {
            self.shared.fields.lock().clear();
        } else if !self.inputs().voice_auth_enabled {
            self.shared.arbiter.clear_microphone_denial();
        }
        self.update(|inputs| inputs.voice_auth_enabled = enabled);
        tracing::info!("Voice login {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn toggle_voice_auth(&self) -> bool {
        let enabled = !self.inputs().voice_auth_enabled;
        self.set_voice_auth_enabled(enabled);
        enabled
    }

    /// The host opened a login or signup form
    pub fn open_auth_form(&self, kind: AuthFormKind) {
        self.shared.fields.lock().clear();
        let change = self.update(|inputs| inputs.open_auth_form(kind));
        if change.current == Some(RecognitionMode::VoiceAuth) {
            self.shared.feedback.speak(match kind {
                AuthFormKind::Login => "Login form open. Say the name of a field to fill it in.",
                AuthFormKind::Signup => "Sign up form open. Say the name of a field to fill it in.",
            });
        }
    }

    /// The host closed the auth form
    pub fn close_auth_form(&self) {
        self.shared.fields.lock().clear();
        self.update(|inputs| inputs.close_auth_form());
    }

    /// The host's router moved to `path`
    pub fn route_changed(&self, path: &str) {
        self.update(|inputs| inputs.current_route = path.to_string());
    }

    pub fn set_tts_enabled(&self, enabled: bool) {
        self.shared.tts_enabled.set(enabled);
        if !enabled {
            self.shared.speech.stop();
        }
        tracing::info!("Spoken feedback {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn set_reduced_motion(&self, enabled: bool) {
        self.shared.reduced_motion.set(enabled);
    }

    /// Handle a key chord; returns the action it triggered
    pub fn handle_shortcut(&self, chord: &str) -> Option<ShortcutAction> {
        let action = self.shared.shortcuts.resolve(chord)?;
        tracing::debug!("Shortcut {} -> {:?}", chord, action);

        match action {
            ShortcutAction::ToggleVoiceControl => {
                self.toggle_voice_control();
            }
            ShortcutAction::ToggleSpeech => {
                let enabled = !self.shared.tts_enabled.get();
                self.set_tts_enabled(enabled);
                if enabled {
                    self.shared.feedback.speak("Speech enabled");
                }
            }
            ShortcutAction::StopSpeaking => self.shared.speech.stop(),
            ShortcutAction::ToggleSimplifiedUi => {
                self.shared.host.events.publish(AppEvent::ToggleSimplifiedUi)
            }
            ShortcutAction::ToggleReadingMode => {
                self.shared.host.events.publish(AppEvent::ToggleReadingMode)
            }
            ShortcutAction::ToggleVoiceAuth => {
                self.toggle_voice_auth();
            }
        }
        Some(action)
    }

    /// Stop every session and any speech
    pub fn shutdown(&self) {
        self.shared.arbiter.shutdown();
        self.shared.speech.stop();
    }

    // ---- platform callbacks ------------------------------------------

    pub fn on_start(&self, mode: RecognitionMode) {
        self.session(mode).handle_started();
    }

    pub fn on_end(&self, mode: RecognitionMode) {
        self.session(mode).handle_end();
    }

    /// `code` is the platform's error string, e.g. "no-speech"
    pub fn on_error(&self, mode: RecognitionMode, code: &str) {
        self.session(mode)
            .handle_error(RecognitionErrorKind::from_platform(code));
    }

    /// A recognition result arrived for `mode`
    pub fn on_result(&self, mode: RecognitionMode, result: TranscriptResult) {
        self.process_result(mode, &result);
    }

    /// Classify and dispatch one result; returns what was executed
    pub fn process_result(
        &self,
        mode: RecognitionMode,
        result: &TranscriptResult,
    ) -> Option<(Intent, DispatchOutcome)> {
        if !result.is_final {
            tracing::trace!("Ignoring interim result: {}", result.text);
            return None;
        }
        if self.active_mode() != Some(mode) {
            tracing::debug!("Ignoring result from inactive {} session", mode);
            return None;
        }
        if self.shared.cooldown.is_cooling_down() {
            tracing::debug!("Command cooldown active, ignoring: {}", result.text);
            return None;
        }

        let intent = self.classify(mode, result)?;
        if !self.shared.cooldown.try_acquire() {
            tracing::debug!("Another command won the cooldown, ignoring: {}", result.text);
            return None;
        }

        // Dispatch on a copy so no lock is held across host calls
        let mut fields = self.shared.fields.lock().clone();
        let outcome = self.shared.dispatcher.dispatch(&intent, &mut fields);
        *self.shared.fields.lock() = fields;

        tracing::info!(
            "{} command '{}' -> {} ({:?})",
            mode,
            result.text,
            intent.kind_name(),
            outcome
        );

        self.after_dispatch(&intent);
        Some((intent, outcome))
    }

    fn classify(&self, mode: RecognitionMode, result: &TranscriptResult) -> Option<Intent> {
        let path = self.shared.host.router.current_path();
        let intent = match mode {
            RecognitionMode::Navigation => {
                self.shared
                    .navigation
                    .classify(&result.text, result.confidence, &path)
            }
            RecognitionMode::Profile => {
                self.shared
                    .profile
                    .classify(&result.text, result.confidence, &path)
            }
            RecognitionMode::VoiceAuth => {
                let fields = self.shared.host.forms.rendered_fields();
                let state = self.shared.fields.lock().clone();
                let active_field = state
                    .active_field_id()
                    .and_then(|id| fields.iter().find(|f| f.id == id));
                let ctx = ClassifyContext {
                    current_path: &path,
                    fields: &fields,
                    active_field,
                };
                self.shared
                    .voice_auth
                    .classify(&result.text, result.confidence, &ctx)
            }
        };

        if intent.is_none() {
            tracing::debug!("No {} command in '{}'", mode, result.text);
        }
        intent
    }

    /// Keep arbitration in step with what the command did to the host
    fn after_dispatch(&self, intent: &Intent) {
        match intent {
            Intent::Cancel => self.close_auth_form(),
            Intent::Navigate { .. } | Intent::GoBack | Intent::GoForward => {
                let path = self.shared.host.router.current_path();
                if path != self.inputs().current_route {
                    self.route_changed(&path);
                }
            }
            _ => {}
        }
    }

    fn update(&self, change: impl FnOnce(&mut ModeInputs)) -> ArbitrationChange {
        self.shared.arbiter.update(change)
    }
}
