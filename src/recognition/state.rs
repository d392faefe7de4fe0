//! Recognition session state machine
//!
//! Pure transition logic. Timers and backend calls are returned as
//! [`SessionEffect`]s and carried out by [`super::RecognitionSession`].

use super::RecognitionErrorKind;
use crate::config::RecognitionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Start requested, waiting for the platform to confirm
    Starting,
    Listening,
    /// The platform stopped on its own (usually silence)
    Ended,
    Errored,
}

impl SessionState {
    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Not listening",
            SessionState::Starting => "Starting microphone",
            SessionState::Listening => "Listening for commands",
            SessionState::Ended => "Paused, resuming shortly",
            SessionState::Errored => "Recognition error",
        }
    }

    /// Whether the microphone is claimed (or about to be)
    pub fn holds_microphone(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Listening)
    }

    /// Whether a start request is allowed from this state
    pub fn can_start(&self) -> bool {
        !self.holds_microphone()
    }
}

/// Events that drive a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Explicit start request
    Start,
    /// Platform confirmed the session started
    Started,
    /// Platform ended the session on its own
    Ended,
    /// Platform reported an error
    Error(RecognitionErrorKind),
    /// Explicit stop request
    Stop,
    /// A scheduled restart timer fired
    RestartDue,
    /// The host navigated to a new route
    RouteChanged,
    /// The owning mode was switched off and on again
    Reactivate,
}

/// Why a transition happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    StartRequested,
    PlatformStarted,
    NaturalEnd,
    /// `aborted`, produced by our own stop
    ExpectedShutdown,
    TransientError { kind: RecognitionErrorKind },
    FatalError { kind: RecognitionErrorKind },
    Stopped,
    Restarting,
    RouteCheck,
    Reactivated,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    StartBackend,
    StopBackend,
    ScheduleRestart(Duration),
    CancelRestart,
    /// Surface the permission notice (once per lockout)
    NotifyFatal,
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub previous_state: SessionState,
    pub new_state: SessionState,
    pub reason: TransitionReason,
    pub effects: Vec<SessionEffect>,
}

/// Restart delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// After a natural end
    pub after_end: Duration,
    /// After `no-speech` or an unknown error
    pub after_error: Duration,
    /// After a route change finds the session dropped
    pub after_route_change: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from(&RecognitionConfig::default())
    }
}

impl From<&RecognitionConfig> for RestartPolicy {
    fn from(config: &RecognitionConfig) -> Self {
        Self {
            after_end: Duration::from_millis(config.end_restart_delay_ms),
            after_error: Duration::from_millis(config.error_restart_delay_ms),
            after_route_change: Duration::from_millis(config.route_restart_delay_ms),
        }
    }
}

/// Recognition session state machine
///
/// `mode_active` is passed on every event rather than stored, so restart
/// decisions always use the owner's current view.
pub struct SessionStateMachine {
    state: SessionState,
    policy: RestartPolicy,
    state_entered_at: Instant,
    last_error_kind: Option<RecognitionErrorKind>,
    /// Set by a permission denial; cleared only by `Reactivate`
    locked_out: bool,
    /// One restart is allowed per run of unknown errors
    error_restart_spent: bool,
}

impl SessionStateMachine {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            state: SessionState::Idle,
            policy,
            state_entered_at: Instant::now(),
            last_error_kind: None,
            locked_out: false,
            error_restart_spent: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn policy(&self) -> RestartPolicy {
        self.policy
    }

    pub fn time_in_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    pub fn last_error_kind(&self) -> Option<&RecognitionErrorKind> {
        self.last_error_kind.as_ref()
    }

    pub fn is_locked_out(&self) -> bool {
        self.locked_out
    }

    /// Process an event and return the transition if one occurred
    pub fn process_event(
        &mut self,
        event: SessionEvent,
        mode_active: bool,
    ) -> Option<TransitionResult> {
        use SessionState::*;

        let transition = match (self.state, event) {
            (state, SessionEvent::Start) => {
                if self.locked_out {
                    tracing::warn!("Recognition start ignored: session is locked out");
                    None
                } else if state.can_start() {
                    Some((
                        Starting,
                        TransitionReason::StartRequested,
                        vec![SessionEffect::CancelRestart, SessionEffect::StartBackend],
                    ))
                } else {
                    tracing::debug!("Recognition start ignored: already {:?}", state);
                    None
                }
            }

            (Starting, SessionEvent::Started) => {
                self.error_restart_spent = false;
                Some((Listening, TransitionReason::PlatformStarted, vec![]))
            }

            (Starting | Listening, SessionEvent::Ended) => {
                let effects = if mode_active {
                    vec![SessionEffect::ScheduleRestart(self.policy.after_end)]
                } else {
                    vec![]
                };
                Some((Ended, TransitionReason::NaturalEnd, effects))
            }

            (Starting | Listening, SessionEvent::Error(kind)) => {
                Some(self.error_transition(kind, mode_active))
            }

            (Starting | Listening, SessionEvent::Stop) => Some((
                Idle,
                TransitionReason::Stopped,
                vec![SessionEffect::CancelRestart, SessionEffect::StopBackend],
            )),
            (Ended | Errored, SessionEvent::Stop) => Some((
                Idle,
                TransitionReason::Stopped,
                vec![SessionEffect::CancelRestart],
            )),

            (Idle | Ended | Errored, SessionEvent::RestartDue) => {
                if self.locked_out || !mode_active {
                    None
                } else {
                    Some((
                        Starting,
                        TransitionReason::Restarting,
                        vec![SessionEffect::StartBackend],
                    ))
                }
            }

            (state @ (Idle | Ended), SessionEvent::RouteChanged) => {
                if self.locked_out || !mode_active {
                    None
                } else {
                    Some((
                        state,
                        TransitionReason::RouteCheck,
                        vec![SessionEffect::ScheduleRestart(self.policy.after_route_change)],
                    ))
                }
            }

            (state, SessionEvent::Reactivate) => {
                self.locked_out = false;
                self.error_restart_spent = false;
                let next = if state == Errored { Idle } else { state };
                Some((next, TransitionReason::Reactivated, vec![]))
            }

            // Late end/error after a stop or another error, duplicate starts,
            // restart timers racing a manual start
            _ => None,
        };

        transition.map(|(new_state, reason, effects)| {
            let result = TransitionResult {
                previous_state: self.state,
                new_state,
                reason,
                effects,
            };
            self.apply_transition(&result);
            result
        })
    }

    fn error_transition(
        &mut self,
        kind: RecognitionErrorKind,
        mode_active: bool,
    ) -> (SessionState, TransitionReason, Vec<SessionEffect>) {
        if kind == RecognitionErrorKind::Aborted {
            return (SessionState::Idle, TransitionReason::ExpectedShutdown, vec![]);
        }

        self.last_error_kind = Some(kind.clone());

        if kind.is_fatal() {
            self.locked_out = true;
            return (
                SessionState::Errored,
                TransitionReason::FatalError { kind },
                vec![SessionEffect::CancelRestart, SessionEffect::NotifyFatal],
            );
        }

        let restart = match kind {
            RecognitionErrorKind::NoSpeech => mode_active,
            _ => {
                let allowed = mode_active && !self.error_restart_spent;
                if allowed {
                    self.error_restart_spent = true;
                }
                allowed
            }
        };

        let effects = if restart {
            vec![SessionEffect::ScheduleRestart(self.policy.after_error)]
        } else {
            vec![]
        };
        (
            SessionState::Errored,
            TransitionReason::TransientError { kind },
            effects,
        )
    }

    fn apply_transition(&mut self, result: &TransitionResult) {
        if result.new_state != result.previous_state {
            self.state = result.new_state;
            self.state_entered_at = Instant::now();
        }

        tracing::debug!(
            "Recognition state transition: {:?} -> {:?} (reason: {:?})",
            result.previous_state,
            result.new_state,
            result.reason
        );
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new(RestartPolicy::default())
    }
}
