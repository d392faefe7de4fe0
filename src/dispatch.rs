//! Command dispatch
//!
//! Turns an [`Intent`] into exactly one host side effect and speaks the
//! confirmation first. Failures are logged and reported as a
//! [`DispatchOutcome`]; nothing here panics or returns an error to the
//! recognition callback.

use crate::error::DispatchError;
use crate::events::AppEvent;
use crate::flags::LiveFlag;
use crate::host::{FieldKind, Host, ScrollBehavior};
use crate::intent::{AuthFormKind, Intent, ScrollDirection, VoiceAuthFieldState};
use crate::speech::SpeechOutput;
use std::sync::Arc;

/// Share of the viewport height moved by a relative scroll
pub const SCROLL_FRACTION: f64 = 0.8;

/// Result of dispatching one intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed,
    /// Navigation target was the current page
    AlreadyThere,
    /// The user lacks the role the command needs
    Denied,
    TargetMissing(String),
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, DispatchOutcome::Executed)
    }
}

impl From<DispatchError> for DispatchOutcome {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::TargetMissing(target) => DispatchOutcome::TargetMissing(target),
            DispatchError::Host(message) => DispatchOutcome::Failed(message),
        }
    }
}

pub struct CommandDispatcher {
    host: Host,
    speech: Arc<dyn SpeechOutput>,
    reduced_motion: LiveFlag,
}

impl CommandDispatcher {
    pub fn new(host: Host, speech: Arc<dyn SpeechOutput>, reduced_motion: LiveFlag) -> Self {
        Self {
            host,
            speech,
            reduced_motion,
        }
    }

    /// Execute `intent`, updating the voice-auth field state it touches
    pub fn dispatch(&self, intent: &Intent, fields: &mut VoiceAuthFieldState) -> DispatchOutcome {
        tracing::info!("Dispatching {}", intent.kind_name());

        let outcome = match intent {
            Intent::Navigate { path, page } => {
                self.speech.speak(&format!("Navigating to {}", page));
                self.host.router.navigate(path);
                DispatchOutcome::Executed
            }
            Intent::AlreadyOnPage { page, .. } => {
                self.speech
                    .speak(&format!("You are already on the {} page", page));
                DispatchOutcome::AlreadyThere
            }
            Intent::Scroll { direction } => {
                self.scroll(*direction);
                DispatchOutcome::Executed
            }
            Intent::OpenAuthForm { form } => {
                let spoken = match form {
                    AuthFormKind::Login => "Opening login form",
                    AuthFormKind::Signup => "Opening sign up form",
                };
                self.speech.speak(spoken);
                self.host
                    .events
                    .publish(AppEvent::VoiceOpenForm { form_type: *form });
                DispatchOutcome::Executed
            }
            Intent::SwitchProfileTab { tab } => {
                self.speech.speak(&format!("Showing {}", tab.label()));
                self.host
                    .events
                    .publish(AppEvent::VoiceSwitchProfileTab { index: tab.index() });
                DispatchOutcome::Executed
            }
            Intent::FocusField { field_id, label } => {
                match self.host.forms.focus(field_id) {
                    Ok(()) => {
                        fields.focus(field_id.clone());
                        self.speech.speak(&format!("Please say your {}", label));
                        DispatchOutcome::Executed
                    }
                    Err(e) => e.into(),
                }
            }
            Intent::FillField { field_id, value } => self.fill(field_id, value, fields),
            Intent::Submit => {
                self.speech.speak("Submitting form");
                fields.clear();
                self.run_action(|| self.host.actions.submit())
            }
            Intent::Cancel => {
                self.speech.speak("Form closed");
                fields.clear();
                self.run_action(|| self.host.actions.cancel())
            }
            Intent::Logout => {
                self.speech.speak("Logging out");
                self.run_action(|| self.host.actions.logout())
            }
            Intent::OpenAdmin { required_role } => {
                let role = self.host.actions.user_role();
                if role.as_deref() == Some(required_role.as_str()) {
                    self.speech.speak("Opening admin panel");
                    self.run_action(|| self.host.actions.open_admin())
                } else {
                    tracing::info!("Admin panel refused for role {:?}", role);
                    self.speech
                        .speak("Access denied. Administrator privileges are required.");
                    DispatchOutcome::Denied
                }
            }
            Intent::GoBack => {
                self.speech.speak("Going back");
                self.host.router.back();
                DispatchOutcome::Executed
            }
            Intent::GoForward => {
                self.speech.speak("Going forward");
                self.host.router.forward();
                DispatchOutcome::Executed
            }
            Intent::ToggleSimplifiedUi => {
                self.speech.speak("Toggling simplified mode");
                self.host.events.publish(AppEvent::ToggleSimplifiedUi);
                DispatchOutcome::Executed
            }
            Intent::ToggleReadingMode => {
                self.speech.speak("Toggling reading mode");
                self.host.events.publish(AppEvent::ToggleReadingMode);
                DispatchOutcome::Executed
            }
            Intent::StopSpeaking => {
                self.speech.stop();
                DispatchOutcome::Executed
            }
        };

        match &outcome {
            DispatchOutcome::TargetMissing(target) => {
                tracing::warn!("{}: target not found: {}", intent.kind_name(), target)
            }
            DispatchOutcome::Failed(message) => {
                tracing::warn!("{} failed: {}", intent.kind_name(), message)
            }
            _ => {}
        }
        outcome
    }

    fn scroll(&self, direction: ScrollDirection) {
        let behavior = if self.reduced_motion.get() {
            ScrollBehavior::Instant
        } else {
            ScrollBehavior::Smooth
        };
        let viewport = &self.host.viewport;
        let step = viewport.viewport_height() * SCROLL_FRACTION;

        match direction {
            ScrollDirection::Down => {
                self.speech.speak("Scrolling down");
                viewport.scroll_by(step, behavior);
            }
            ScrollDirection::Up => {
                self.speech.speak("Scrolling up");
                viewport.scroll_by(-step, behavior);
            }
            ScrollDirection::Top => {
                self.speech.speak("Scrolling to the top");
                viewport.scroll_to_top(behavior);
            }
            ScrollDirection::Bottom => {
                self.speech.speak("Scrolling to the bottom");
                viewport.scroll_to_bottom(behavior);
            }
        }
    }

    fn fill(
        &self,
        field_id: &str,
        value: &str,
        fields: &mut VoiceAuthFieldState,
    ) -> DispatchOutcome {
        let Some(field) = self
            .host
            .forms
            .rendered_fields()
            .into_iter()
            .find(|f| f.id == field_id)
        else {
            fields.release();
            return DispatchOutcome::TargetMissing(field_id.to_string());
        };

        let spoken = match field.kind {
            FieldKind::Password => format!("{} entered", capitalise(&field.label)),
            _ => format!("{} set to {}", capitalise(&field.label), value),
        };
        self.speech.speak(&spoken);

        let outcome = match self.host.forms.set_value(field_id, value) {
            Ok(()) => DispatchOutcome::Executed,
            Err(e) => e.into(),
        };
        fields.release();
        outcome
    }

    fn run_action(&self, action: impl FnOnce() -> Result<(), DispatchError>) -> DispatchOutcome {
        match action() {
            Ok(()) => DispatchOutcome::Executed,
            Err(e) => e.into(),
        }
    }
}

fn capitalise(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{ConsoleHost, ScrollRecord};
    use crate::events::EventBus;
    use crate::intent::ProfileTab;
    use crate::speech::tests::RecordingSpeech;

    struct Rig {
        console: ConsoleHost,
        events: EventBus,
        speech: Arc<RecordingSpeech>,
        reduced_motion: LiveFlag,
        dispatcher: CommandDispatcher,
    }

    fn rig() -> Rig {
        let console = ConsoleHost::new("/", 1000.0);
        let events = EventBus::new();
        let speech = RecordingSpeech::new();
        let reduced_motion = LiveFlag::new(false);
        let dispatcher = CommandDispatcher::new(
            console.host(events.clone()),
            speech.clone(),
            reduced_motion.clone(),
        );
        Rig {
            console,
            events,
            speech,
            reduced_motion,
            dispatcher,
        }
    }

    fn dispatch(rig: &Rig, intent: Intent) -> DispatchOutcome {
        rig.dispatcher
            .dispatch(&intent, &mut VoiceAuthFieldState::default())
    }

    #[test]
    fn test_navigate_speaks_then_routes() {
        let rig = rig();
        let outcome = dispatch(&rig, Intent::navigate("/profile", "profile"));

        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(rig.console.router.current(), "/profile");
        assert_eq!(rig.speech.last().as_deref(), Some("Navigating to profile"));
    }

    #[test]
    fn test_already_on_page_is_a_spoken_no_op() {
        let rig = rig();
        let outcome = dispatch(
            &rig,
            Intent::AlreadyOnPage {
                path: "/".to_string(),
                page: "home".to_string(),
            },
        );

        assert_eq!(outcome, DispatchOutcome::AlreadyThere);
        assert_eq!(rig.console.router.history(), vec!["/".to_string()]);
        assert!(rig.speech.last().unwrap().contains("already"));
    }

    #[test]
    fn test_scroll_uses_viewport_fraction() {
        let rig = rig();
        dispatch(
            &rig,
            Intent::Scroll {
                direction: ScrollDirection::Down,
            },
        );
        rig.reduced_motion.set(true);
        dispatch(
            &rig,
            Intent::Scroll {
                direction: ScrollDirection::Up,
            },
        );
        dispatch(
            &rig,
            Intent::Scroll {
                direction: ScrollDirection::Top,
            },
        );

        assert_eq!(
            rig.console.viewport.records(),
            vec![
                ScrollRecord::By(800.0, ScrollBehavior::Smooth),
                ScrollRecord::By(-800.0, ScrollBehavior::Instant),
                ScrollRecord::Top(ScrollBehavior::Instant),
            ]
        );
    }

    #[test]
    fn test_events_are_published() {
        let rig = rig();
        let mut rx = rig.events.subscribe();

        dispatch(
            &rig,
            Intent::OpenAuthForm {
                form: AuthFormKind::Signup,
            },
        );
        dispatch(
            &rig,
            Intent::SwitchProfileTab {
                tab: ProfileTab::Progress,
            },
        );
        dispatch(&rig, Intent::ToggleReadingMode);

        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::VoiceOpenForm {
                form_type: AuthFormKind::Signup
            }
        );
        assert_eq!(rx.try_recv().unwrap(), AppEvent::VoiceSwitchProfileTab { index: 2 });
        assert_eq!(rx.try_recv().unwrap(), AppEvent::ToggleReadingMode);
    }

    #[test]
    fn test_two_phase_fill() {
        let rig = rig();
        rig.console.forms.show(Some(AuthFormKind::Login));
        let mut state = VoiceAuthFieldState::default();

        let outcome = rig.dispatcher.dispatch(
            &Intent::FocusField {
                field_id: "email".to_string(),
                label: "email".to_string(),
            },
            &mut state,
        );
        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(state.active_field_id(), Some("email"));
        assert_eq!(rig.console.forms.focused().as_deref(), Some("email"));

        rig.dispatcher.dispatch(
            &Intent::FillField {
                field_id: "email".to_string(),
                value: "john@example.com".to_string(),
            },
            &mut state,
        );
        assert_eq!(
            rig.console.forms.value("email").as_deref(),
            Some("john@example.com")
        );
        assert_eq!(state.active_field_id(), None);
        assert!(state.is_filling_active());
    }

    #[test]
    fn test_password_is_never_spoken() {
        let rig = rig();
        rig.console.forms.show(Some(AuthFormKind::Login));
        let mut state = VoiceAuthFieldState::default();

        rig.dispatcher.dispatch(
            &Intent::FillField {
                field_id: "password".to_string(),
                value: "hunter2".to_string(),
            },
            &mut state,
        );

        assert_eq!(rig.speech.last().as_deref(), Some("Password entered"));
        assert!(rig.speech.spoken.lock().iter().all(|s| !s.contains("hunter2")));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let rig = rig();
        let mut state = VoiceAuthFieldState::default();

        let outcome = rig.dispatcher.dispatch(
            &Intent::FocusField {
                field_id: "email".to_string(),
                label: "email".to_string(),
            },
            &mut state,
        );

        assert_eq!(outcome, DispatchOutcome::TargetMissing("email".to_string()));
        assert_eq!(state.active_field_id(), None);
    }

    #[test]
    fn test_submit_and_cancel_clear_field_state() {
        let rig = rig();
        let mut state = VoiceAuthFieldState::default();
        state.focus("email");

        rig.dispatcher.dispatch(&Intent::Submit, &mut state);
        assert!(!state.is_filling_active());

        state.focus("password");
        rig.dispatcher.dispatch(&Intent::Cancel, &mut state);
        assert!(!state.is_filling_active());
        assert_eq!(rig.console.actions.calls(), vec!["submit", "cancel"]);
    }

    #[test]
    fn test_admin_requires_role() {
        let rig = rig();
        let intent = Intent::OpenAdmin {
            required_role: "admin".to_string(),
        };

        assert_eq!(dispatch(&rig, intent.clone()), DispatchOutcome::Denied);
        assert!(rig.speech.last().unwrap().starts_with("Access denied"));

        rig.console.actions.set_role(Some("admin"));
        assert_eq!(dispatch(&rig, intent), DispatchOutcome::Executed);
        assert_eq!(rig.console.actions.calls(), vec!["open_admin"]);
    }

    #[test]
    fn test_history_and_stop() {
        let rig = rig();
        dispatch(&rig, Intent::navigate("/courses", "courses"));
        dispatch(&rig, Intent::GoBack);
        assert_eq!(rig.console.router.current(), "/");
        dispatch(&rig, Intent::GoForward);
        assert_eq!(rig.console.router.current(), "/courses");

        dispatch(&rig, Intent::StopSpeaking);
        assert_eq!(*rig.speech.stops.lock(), 1);
    }
}
