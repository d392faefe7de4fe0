//! Mode arbitration
//!
//! Decides which single recognition mode may own the microphone and applies
//! the decision with stop-before-start ordering. Listeners never call the
//! platform directly; they only change the inputs here.

use crate::events::EventBus;
use crate::flags::LiveFlag;
use crate::intent::AuthFormKind;
use crate::recognition::{
    RecognitionBackend, RecognitionMode, RecognitionSession, RecognitionSettings, RestartPolicy,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything the mode decision depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeInputs {
    /// Global voice-control toggle
    pub voice_control_enabled: bool,
    /// Voice-auth toggle
    pub voice_auth_enabled: bool,
    /// Current router path
    pub current_route: String,
    /// Login/signup form currently open, if any
    pub auth_form: Option<AuthFormKind>,
}

impl ModeInputs {
    pub fn new(current_route: impl Into<String>) -> Self {
        Self {
            voice_control_enabled: false,
            voice_auth_enabled: false,
            current_route: current_route.into(),
            auth_form: None,
        }
    }

    /// An open auth form auto-enables voice-auth and forces voice control on
    pub fn open_auth_form(&mut self, kind: AuthFormKind) {
        self.auth_form = Some(kind);
        self.voice_auth_enabled = true;
        self.voice_control_enabled = true;
    }

    pub fn close_auth_form(&mut self) {
        self.auth_form = None;
    }
}

impl Default for ModeInputs {
    fn default() -> Self {
        Self::new("/")
    }
}

/// Whether `path` belongs to the profile section
pub fn is_profile_route(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path == "/profile" || path.starts_with("/profile/")
}

/// The mode that should be listening for the given inputs
pub fn desired_mode(inputs: &ModeInputs) -> Option<RecognitionMode> {
    if inputs.auth_form.is_some() && inputs.voice_auth_enabled {
        return Some(RecognitionMode::VoiceAuth);
    }
    if !inputs.voice_control_enabled {
        return None;
    }
    if is_profile_route(&inputs.current_route) {
        Some(RecognitionMode::Profile)
    } else {
        Some(RecognitionMode::Navigation)
    }
}

/// What an update changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbitrationChange {
    pub previous: Option<RecognitionMode>,
    pub current: Option<RecognitionMode>,
}

impl ArbitrationChange {
    pub fn switched(&self) -> bool {
        self.previous != self.current
    }
}

/// Owns one session per mode and keeps at most one of them alive
///
/// The decision is made under `state`; sessions are started and stopped only
/// after that lock is released, so backend callbacks may re-enter the arbiter.
pub struct ModeArbiter {
    sessions: Vec<RecognitionSession>,
    microphone_denied: LiveFlag,
    state: Mutex<ArbiterState>,
}

struct ArbiterState {
    inputs: ModeInputs,
    active: Option<RecognitionMode>,
}

/// Work decided under the lock, carried out after it
enum Plan {
    Nothing,
    RouteCheck(RecognitionMode),
    Switch,
}

impl ModeArbiter {
    pub fn new(
        backend: Arc<dyn RecognitionBackend>,
        settings: RecognitionSettings,
        policy: RestartPolicy,
        events: EventBus,
        inputs: ModeInputs,
    ) -> Self {
        let microphone_denied = LiveFlag::default();
        let sessions = RecognitionMode::ALL
            .iter()
            .map(|mode| {
                RecognitionSession::new(
                    *mode,
                    backend.clone(),
                    settings.clone(),
                    policy,
                    events.clone(),
                    microphone_denied.clone(),
                )
            })
            .collect();

        Self {
            sessions,
            microphone_denied,
            state: Mutex::new(ArbiterState {
                inputs,
                active: None,
            }),
        }
    }

    pub fn inputs(&self) -> ModeInputs {
        self.state.lock().inputs.clone()
    }

    pub fn active_mode(&self) -> Option<RecognitionMode> {
        self.state.lock().active
    }

    pub fn session(&self, mode: RecognitionMode) -> &RecognitionSession {
        // Sessions are built from RecognitionMode::ALL, so every mode is present
        let index = RecognitionMode::ALL
            .iter()
            .position(|m| *m == mode)
            .unwrap_or_default();
        &self.sessions[index]
    }

    pub fn sessions(&self) -> &[RecognitionSession] {
        &self.sessions
    }

    /// Whether a permission denial has blocked the microphone
    pub fn is_microphone_denied(&self) -> bool {
        self.microphone_denied.get()
    }

    /// Lift a permission-denial block after the user re-enables voice
    pub fn clear_microphone_denial(&self) {
        if self.microphone_denied.set(false) {
            tracing::info!("Microphone block lifted; recognition may start again");
        }
        for session in &self.sessions {
            session.clear_lockout();
        }
    }

    /// Apply the current inputs without changing them
    pub fn reconcile(&self) -> ArbitrationChange {
        let (change, plan) = {
            let mut state = self.state.lock();
            Self::decide(&mut state, false)
        };
        self.execute(plan);
        change
    }

    /// Change the inputs and apply the resulting decision
    pub fn update(&self, change: impl FnOnce(&mut ModeInputs)) -> ArbitrationChange {
        let (result, plan) = {
            let mut state = self.state.lock();
            let previous_route = state.inputs.current_route.clone();
            change(&mut state.inputs);
            let route_changed = previous_route != state.inputs.current_route;
            Self::decide(&mut state, route_changed)
        };
        self.execute(plan);
        result
    }

    /// Stop everything (owner teardown)
    pub fn shutdown(&self) {
        self.state.lock().active = None;
        for session in &self.sessions {
            session.deactivate();
        }
        tracing::info!("All recognition sessions stopped");
    }

    fn decide(state: &mut ArbiterState, route_changed: bool) -> (ArbitrationChange, Plan) {
        let previous = state.active;
        let desired = desired_mode(&state.inputs);
        let change = ArbitrationChange {
            previous,
            current: desired,
        };

        if desired == previous {
            let plan = match (desired, route_changed) {
                (Some(mode), true) => Plan::RouteCheck(mode),
                _ => Plan::Nothing,
            };
            return (change, plan);
        }

        state.active = desired;
        tracing::info!(
            "Voice mode changed: {:?} -> {:?} (route: {})",
            previous,
            desired,
            state.inputs.current_route
        );
        (change, Plan::Switch)
    }

    fn execute(&self, plan: Plan) {
        match plan {
            Plan::Nothing => {}
            Plan::RouteCheck(mode) => self.session(mode).route_changed(),
            Plan::Switch => {
                // Re-read so that the latest of two racing updates wins
                let target = self.active_mode();

                // Stop before start: the microphone must be released first
                for session in &self.sessions {
                    let holds = session.is_active() || session.state().holds_microphone();
                    if Some(session.mode()) != target && holds {
                        session.deactivate();
                    }
                }
                if let Some(mode) = target {
                    self.session(mode).activate();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::session::tests::RecordingBackend;
    use crate::recognition::{RecognitionErrorKind, SessionState};

    fn arbiter(backend: Arc<RecordingBackend>) -> ModeArbiter {
        ModeArbiter::new(
            backend,
            RecognitionSettings::default(),
            RestartPolicy::default(),
            EventBus::new(),
            ModeInputs::default(),
        )
    }

    #[test]
    fn test_desired_mode_table() {
        let mut inputs = ModeInputs::new("/courses");
        assert_eq!(desired_mode(&inputs), None);

        inputs.voice_control_enabled = true;
        assert_eq!(desired_mode(&inputs), Some(RecognitionMode::Navigation));

        inputs.current_route = "/profile".to_string();
        assert_eq!(desired_mode(&inputs), Some(RecognitionMode::Profile));

        inputs.open_auth_form(AuthFormKind::Login);
        assert_eq!(desired_mode(&inputs), Some(RecognitionMode::VoiceAuth));

        inputs.voice_auth_enabled = false;
        assert_eq!(desired_mode(&inputs), Some(RecognitionMode::Profile));
    }

    #[test]
    fn test_auth_form_forces_voice_control_on() {
        let mut inputs = ModeInputs::new("/");
        inputs.open_auth_form(AuthFormKind::Signup);
        assert!(inputs.voice_control_enabled);
        assert!(inputs.voice_auth_enabled);

        inputs.close_auth_form();
        assert_eq!(desired_mode(&inputs), Some(RecognitionMode::Navigation));
    }

    #[test]
    fn test_profile_route_detection() {
        assert!(is_profile_route("/profile"));
        assert!(is_profile_route("/profile/settings"));
        assert!(is_profile_route("/profile?tab=2"));
        assert!(!is_profile_route("/profiles"));
        assert!(!is_profile_route("/courses/profile-design"));
    }

    #[test]
    fn test_switch_stops_before_start() {
        let backend = RecordingBackend::supported();
        let arbiter = arbiter(backend.clone());

        arbiter.update(|i| i.voice_control_enabled = true);
        arbiter.session(RecognitionMode::Navigation).handle_started();

        let change = arbiter.update(|i| i.current_route = "/profile".to_string());
        assert!(change.switched());
        assert_eq!(change.current, Some(RecognitionMode::Profile));

        let calls = backend.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                "start:navigation".to_string(),
                "stop:navigation".to_string(),
                "start:profile".to_string(),
            ]
        );
        assert_eq!(
            arbiter.session(RecognitionMode::Navigation).state(),
            SessionState::Idle
        );
    }

    #[test]
    fn test_same_mode_route_change_does_not_restart() {
        let backend = RecordingBackend::supported();
        let arbiter = arbiter(backend.clone());

        arbiter.update(|i| i.voice_control_enabled = true);
        arbiter.session(RecognitionMode::Navigation).handle_started();
        let change = arbiter.update(|i| i.current_route = "/courses".to_string());

        assert!(!change.switched());
        assert_eq!(backend.starts(RecognitionMode::Navigation), 1);
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let backend = RecordingBackend::supported();
        let arbiter = arbiter(backend.clone());

        arbiter.update(|i| i.open_auth_form(AuthFormKind::Login));
        arbiter.shutdown();

        assert_eq!(arbiter.active_mode(), None);
        assert!(arbiter
            .sessions()
            .iter()
            .all(|s| !s.state().holds_microphone() && !s.is_active()));
    }

    #[test]
    fn test_denial_survives_mode_switches_until_cleared() {
        let backend = RecordingBackend::supported();
        let arbiter = arbiter(backend.clone());

        arbiter.update(|i| i.voice_control_enabled = true);
        arbiter
            .session(RecognitionMode::Navigation)
            .handle_error(RecognitionErrorKind::NotAllowed);
        assert!(arbiter.is_microphone_denied());

        arbiter.update(|i| i.current_route = "/profile".to_string());
        arbiter.update(|i| i.current_route = "/courses".to_string());
        assert_eq!(arbiter.active_mode(), Some(RecognitionMode::Navigation));
        assert_eq!(backend.starts(RecognitionMode::Navigation), 1);
        assert_eq!(backend.starts(RecognitionMode::Profile), 0);
        assert!(arbiter.is_microphone_denied());

        arbiter.update(|i| i.voice_control_enabled = false);
        arbiter.clear_microphone_denial();
        arbiter.update(|i| i.voice_control_enabled = true);
        assert!(!arbiter.is_microphone_denied());
        assert_eq!(
            arbiter.session(RecognitionMode::Navigation).state(),
            SessionState::Starting
        );
    }
}
