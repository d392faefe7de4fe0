//! Recognition session lifecycle
//!
//! Wraps the state machine with the backend, a restart timer and the
//! "is this mode still active" guard. Locks are released before the backend
//! or the event bus is called.
//!
//! A permission denial blocks the microphone for every session that shares
//! the same [`LiveFlag`]; only [`RecognitionSession::clear_lockout`] after the
//! owner re-enables voice lets a session start again.

use super::state::{
    RestartPolicy, SessionEffect, SessionEvent, SessionState, SessionStateMachine,
    TransitionResult,
};
use super::{RecognitionBackend, RecognitionErrorKind, RecognitionMode, RecognitionSettings};
use crate::error::RecognitionError;
use crate::events::{AppEvent, EventBus};
use crate::flags::LiveFlag;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle to one continuous recognition session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct RecognitionSession {
    shared: Arc<SessionShared>,
}

struct SessionShared {
    mode: RecognitionMode,
    backend: Arc<dyn RecognitionBackend>,
    settings: RecognitionSettings,
    events: EventBus,
    /// Shared by all sessions on the same microphone
    microphone_denied: LiveFlag,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    machine: SessionStateMachine,
    /// Whether the owning mode wants this session alive; read when timers fire
    active: bool,
    /// Bumped whenever a timer is cancelled or replaced
    generation: u64,
    restart_timer: Option<JoinHandle<()>>,
    unsupported_reported: bool,
}

impl SessionInner {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.restart_timer.take() {
            timer.abort();
        }
    }
}

impl RecognitionSession {
    pub fn new(
        mode: RecognitionMode,
        backend: Arc<dyn RecognitionBackend>,
        settings: RecognitionSettings,
        policy: RestartPolicy,
        events: EventBus,
        microphone_denied: LiveFlag,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                mode,
                backend,
                settings,
                events,
                microphone_denied,
                inner: Mutex::new(SessionInner {
                    machine: SessionStateMachine::new(policy),
                    active: false,
                    generation: 0,
                    restart_timer: None,
                    unsupported_reported: false,
                }),
            }),
        }
    }

    pub fn mode(&self) -> RecognitionMode {
        self.shared.mode
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().machine.state()
    }

    pub fn is_listening(&self) -> bool {
        self.state() == SessionState::Listening
    }

    pub fn is_starting(&self) -> bool {
        self.state() == SessionState::Starting
    }

    /// Whether the owning mode currently wants this session
    pub fn is_active(&self) -> bool {
        self.shared.inner.lock().active
    }

    pub fn is_locked_out(&self) -> bool {
        self.shared.inner.lock().machine.is_locked_out()
    }

    pub fn last_error_kind(&self) -> Option<RecognitionErrorKind> {
        self.shared.inner.lock().machine.last_error_kind().cloned()
    }

    /// Whether a restart timer is pending
    pub fn has_pending_restart(&self) -> bool {
        self.shared
            .inner
            .lock()
            .restart_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Mark the mode active and start listening
    ///
    /// A lockout from an earlier permission denial survives activation.
    pub fn activate(&self) {
        self.shared.inner.lock().active = true;
        tracing::info!("Activating {} recognition", self.shared.mode);
        self.start();
    }

    /// Forget a permission denial for this session
    ///
    /// Callers clear the shared microphone flag first.
    pub fn clear_lockout(&self) {
        self.drive(SessionEvent::Reactivate);
    }

    /// Mark the mode inactive and stop listening
    pub fn deactivate(&self) {
        self.shared.inner.lock().active = false;
        tracing::info!("Deactivating {} recognition", self.shared.mode);
        self.stop();
    }

    /// Begin continuous recognition
    ///
    /// Does nothing (beyond logging once) when the platform cannot recognise
    /// speech, when already starting or listening, or when locked out.
    pub fn start(&self) {
        match self.check_can_start() {
            Ok(()) => {
                self.drive(SessionEvent::Start);
            }
            Err(RecognitionError::Unsupported) => {
                let first_report = {
                    let mut inner = self.shared.inner.lock();
                    !std::mem::replace(&mut inner.unsupported_reported, true)
                };
                if first_report {
                    tracing::warn!("{}", RecognitionError::Unsupported);
                    self.shared.events.publish(AppEvent::VoiceUnsupported);
                }
            }
            Err(e) => tracing::debug!("Not starting: {}", e),
        }
    }

    /// Whether the platform and the microphone allow a start right now
    pub fn check_can_start(&self) -> Result<(), RecognitionError> {
        if !self.shared.backend.is_supported() {
            return Err(RecognitionError::Unsupported);
        }
        if self.shared.microphone_denied.get() {
            return Err(RecognitionError::LockedOut(self.shared.mode));
        }
        Ok(())
    }

    /// Halt recognition and clear any pending restart
    pub fn stop(&self) {
        self.shared.inner.lock().cancel_timer();
        self.drive(SessionEvent::Stop);
    }

    /// Platform confirmed the session started
    pub fn handle_started(&self) {
        self.drive(SessionEvent::Started);
    }

    /// Platform ended the session on its own
    pub fn handle_end(&self) {
        self.drive(SessionEvent::Ended);
    }

    /// Platform reported an error
    pub fn handle_error(&self, kind: RecognitionErrorKind) {
        match &kind {
            RecognitionErrorKind::Aborted => {
                tracing::debug!("{} recognition aborted", self.shared.mode)
            }
            RecognitionErrorKind::NoSpeech => {
                tracing::debug!("{} recognition heard no speech", self.shared.mode)
            }
            other if other.is_fatal() => {}
            other => tracing::warn!("{} recognition error: {}", self.shared.mode, other),
        }
        self.drive(SessionEvent::Error(kind));
    }

    /// Host navigated; restart shortly if the platform dropped the session
    pub fn route_changed(&self) {
        self.drive(SessionEvent::RouteChanged);
    }

    fn drive(&self, event: SessionEvent) -> Option<TransitionResult> {
        let mut deferred = Vec::new();
        let result = {
            let mut inner = self.shared.inner.lock();
            let active = inner.active;
            let result = inner.machine.process_event(event, active)?;

            for effect in &result.effects {
                match effect {
                    SessionEffect::CancelRestart => inner.cancel_timer(),
                    SessionEffect::ScheduleRestart(delay) => {
                        inner.cancel_timer();
                        let generation = inner.generation;
                        inner.restart_timer = self.spawn_restart(*delay, generation);
                    }
                    other => deferred.push(other.clone()),
                }
            }
            result
        };

        if result.new_state != result.previous_state {
            tracing::info!(
                "{} recognition: {:?} -> {:?} (reason: {:?})",
                self.shared.mode,
                result.previous_state,
                result.new_state,
                result.reason
            );
            self.shared.events.publish(AppEvent::VoiceStateChange {
                mode: self.shared.mode,
                previous: result.previous_state,
                state: result.new_state,
            });
        }

        for effect in deferred {
            match effect {
                SessionEffect::StartBackend => self.start_backend(),
                SessionEffect::StopBackend => self.shared.backend.stop(self.shared.mode),
                SessionEffect::NotifyFatal => {
                    if self.shared.microphone_denied.set(true) {
                        tracing::debug!(
                            "{} recognition denied again; already reported",
                            self.shared.mode
                        );
                        continue;
                    }
                    tracing::error!(
                        "Microphone permission denied in {} mode; voice disabled until re-enabled",
                        self.shared.mode
                    );
                    self.shared.events.publish(AppEvent::VoicePermissionDenied {
                        mode: self.shared.mode,
                    });
                }
                SessionEffect::CancelRestart | SessionEffect::ScheduleRestart(_) => {}
            }
        }

        Some(result)
    }

    fn start_backend(&self) {
        if let Err(e) = self
            .shared
            .backend
            .start(self.shared.mode, &self.shared.settings)
        {
            tracing::warn!("Failed to start {} recognition: {}", self.shared.mode, e);
            self.drive(SessionEvent::Error(RecognitionErrorKind::Other(e.to_string())));
        }
    }

    fn spawn_restart(&self, delay: Duration, generation: u64) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    "No async runtime; {} recognition will not restart automatically",
                    self.shared.mode
                );
                return None;
            }
        };

        let weak: Weak<SessionShared> = Arc::downgrade(&self.shared);
        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                RecognitionSession { shared }.fire_restart(generation);
            }
        }))
    }

    fn fire_restart(&self, generation: u64) {
        if let Err(e) = self.check_can_start() {
            tracing::debug!("{} restart skipped: {}", self.shared.mode, e);
            return;
        }
        {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation || !inner.active {
                tracing::debug!("Stale {} restart timer ignored", self.shared.mode);
                return;
            }
            // Detach our own handle so the restart does not abort this task
            inner.restart_timer = None;
        }
        tracing::debug!("Restarting {} recognition", self.shared.mode);
        self.drive(SessionEvent::RestartDue);
    }
}

impl std::fmt::Debug for RecognitionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionSession")
            .field("mode", &self.shared.mode)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Backend that records calls and never calls back
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub supported: bool,
        pub fail_start: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        pub fn supported() -> Arc<Self> {
            Arc::new(Self {
                supported: true,
                ..Default::default()
            })
        }

        pub fn starts(&self, mode: RecognitionMode) -> usize {
            let needle = format!("start:{}", mode);
            self.calls.lock().iter().filter(|c| **c == needle).count()
        }
    }

    impl RecognitionBackend for RecordingBackend {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn start(
            &self,
            mode: RecognitionMode,
            _settings: &RecognitionSettings,
        ) -> Result<(), RecognitionError> {
            self.calls.lock().push(format!("start:{}", mode));
            if self.fail_start {
                return Err(RecognitionError::Backend("already started".to_string()));
            }
            Ok(())
        }

        fn stop(&self, mode: RecognitionMode) {
            self.calls.lock().push(format!("stop:{}", mode));
        }
    }

    fn session(backend: Arc<RecordingBackend>) -> RecognitionSession {
        session_on(backend, RecognitionMode::Navigation, LiveFlag::default())
    }

    fn session_on(
        backend: Arc<RecordingBackend>,
        mode: RecognitionMode,
        microphone_denied: LiveFlag,
    ) -> RecognitionSession {
        RecognitionSession::new(
            mode,
            backend,
            RecognitionSettings::default(),
            RestartPolicy::default(),
            EventBus::new(),
            microphone_denied,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_natural_end() {
        let backend = RecordingBackend::supported();
        let session = session(backend.clone());

        session.activate();
        session.handle_started();
        session.handle_end();
        assert_eq!(session.state(), SessionState::Ended);
        assert!(session.has_pending_restart());

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(session.state(), SessionState::Starting);
        assert_eq!(backend.starts(RecognitionMode::Navigation), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_after_deactivate_is_noop() {
        let backend = RecordingBackend::supported();
        let session = session(backend.clone());

        session.activate();
        session.handle_started();
        session.handle_end();
        session.deactivate();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(backend.starts(RecognitionMode::Navigation), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_locks_out_until_reactivated() {
        let backend = RecordingBackend::supported();
        let session = session(backend.clone());
        let mut rx = session.shared.events.subscribe();

        session.activate();
        session.handle_started();
        session.handle_error(RecognitionErrorKind::NotAllowed);
        session.start();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(session.state(), SessionState::Errored);
        assert!(session.is_locked_out());
        assert_eq!(backend.starts(RecognitionMode::Navigation), 1);

        let mut denials = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AppEvent::VoicePermissionDenied { .. }) {
                denials += 1;
            }
        }
        assert_eq!(denials, 1);

        // Deactivating and activating again is not enough
        session.deactivate();
        session.activate();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(
            session.check_can_start(),
            Err(RecognitionError::LockedOut(RecognitionMode::Navigation))
        ));

        session.shared.microphone_denied.set(false);
        session.clear_lockout();
        session.activate();
        assert_eq!(session.state(), SessionState::Starting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denial_blocks_sibling_sessions_and_reports_once() {
        let backend = RecordingBackend::supported();
        let denied = LiveFlag::default();
        let navigation = session_on(backend.clone(), RecognitionMode::Navigation, denied.clone());
        let profile = session_on(backend.clone(), RecognitionMode::Profile, denied.clone());
        let mut rx = navigation.shared.events.subscribe();

        profile.activate();
        navigation.activate();
        navigation.handle_error(RecognitionErrorKind::NotAllowed);
        assert!(denied.get());

        // A second denial on the same microphone is not announced again
        profile.handle_error(RecognitionErrorKind::NotAllowed);
        assert_eq!(profile.state(), SessionState::Errored);

        profile.deactivate();
        profile.activate();
        assert_eq!(profile.state(), SessionState::Idle);
        assert_eq!(backend.starts(RecognitionMode::Profile), 1);

        let mut denials = 0;
        while let Ok(event) = rx.try_recv() {
            denials += usize::from(matches!(event, AppEvent::VoicePermissionDenied { .. }));
        }
        assert_eq!(denials, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_start_failure_retries_once() {
        let backend = Arc::new(RecordingBackend {
            supported: true,
            fail_start: true,
            ..Default::default()
        });
        let session = session(backend.clone());

        session.activate();
        assert_eq!(session.state(), SessionState::Errored);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.starts(RecognitionMode::Navigation), 2);
        assert_eq!(session.state(), SessionState::Errored);
    }

    #[test]
    fn test_unsupported_platform_is_noop() {
        let backend = Arc::new(RecordingBackend::default());
        let session = session(backend.clone());
        let mut rx = session.shared.events.subscribe();

        session.activate();
        session.start();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(
            session.check_can_start(),
            Err(RecognitionError::Unsupported)
        ));
        assert!(backend.calls.lock().is_empty());
        assert_eq!(rx.try_recv().unwrap(), AppEvent::VoiceUnsupported);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_change_restarts_dropped_session() {
        let backend = RecordingBackend::supported();
        let session = session(backend.clone());

        session.activate();
        session.handle_started();
        // Simulate a platform that silently stopped during navigation
        session.handle_error(RecognitionErrorKind::Aborted);
        assert_eq!(session.state(), SessionState::Idle);

        session.route_changed();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.state(), SessionState::Starting);
    }
}
