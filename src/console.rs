//! Terminal harness
//!
//! In-memory host adapters plus a stdin loop that feeds simulated transcripts
//! to a [`VoiceController`]. Lets the whole pipeline run without a browser:
//!
//! ```text
//! 0.9 open courses      transcript with confidence
//! scroll down           transcript, confidence 1.0
//! :route /profile       host navigated
//! :form login           login form opened
//! :key alt+v            keyboard shortcut
//! ```

use crate::controller::VoiceController;
use crate::error::{DispatchError, RecognitionError, SpeechError};
use crate::events::{AppEvent, EventBus};
use crate::host::{
    FormBinding, FormField, Host, HostActions, Router, ScrollBehavior, Viewport,
};
use crate::intent::AuthFormKind;
use crate::recognition::{
    RecognitionBackend, RecognitionMode, RecognitionSettings, TranscriptResult,
};
use crate::speech::{AudioSink, LocalSynthesizer, VoiceInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

/// Router with an in-memory history stack
pub struct ConsoleRouter {
    state: Mutex<RouterState>,
}

struct RouterState {
    history: Vec<String>,
    index: usize,
}

impl ConsoleRouter {
    pub fn new(start: &str) -> Self {
        Self {
            state: Mutex::new(RouterState {
                history: vec![start.to_string()],
                index: 0,
            }),
        }
    }

    pub fn current(&self) -> String {
        let state = self.state.lock();
        state.history[state.index].clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }
}

impl Router for ConsoleRouter {
    fn navigate(&self, path: &str) {
        let mut state = self.state.lock();
        let keep = state.index + 1;
        state.history.truncate(keep);
        state.history.push(path.to_string());
        state.index = state.history.len() - 1;
        tracing::info!("[router] {}", path);
    }

    fn back(&self) {
        let mut state = self.state.lock();
        if state.index > 0 {
            state.index -= 1;
        }
        tracing::info!("[router] back to {}", state.history[state.index]);
    }

    fn forward(&self) {
        let mut state = self.state.lock();
        if state.index + 1 < state.history.len() {
            state.index += 1;
        }
        tracing::info!("[router] forward to {}", state.history[state.index]);
    }

    fn current_path(&self) -> String {
        self.current()
    }
}

/// One recorded scroll call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollRecord {
    By(f64, ScrollBehavior),
    Top(ScrollBehavior),
    Bottom(ScrollBehavior),
}

pub struct ConsoleViewport {
    height: f64,
    records: Mutex<Vec<ScrollRecord>>,
}

impl ConsoleViewport {
    pub fn new(height: f64) -> Self {
        Self {
            height,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<ScrollRecord> {
        self.records.lock().clone()
    }
}

impl Viewport for ConsoleViewport {
    fn viewport_height(&self) -> f64 {
        self.height
    }

    fn scroll_by(&self, delta: f64, behavior: ScrollBehavior) {
        tracing::info!("[viewport] scroll by {:.0}px ({:?})", delta, behavior);
        self.records.lock().push(ScrollRecord::By(delta, behavior));
    }

    fn scroll_to_top(&self, behavior: ScrollBehavior) {
        tracing::info!("[viewport] scroll to top ({:?})", behavior);
        self.records.lock().push(ScrollRecord::Top(behavior));
    }

    fn scroll_to_bottom(&self, behavior: ScrollBehavior) {
        tracing::info!("[viewport] scroll to bottom ({:?})", behavior);
        self.records.lock().push(ScrollRecord::Bottom(behavior));
    }
}

/// Login and signup forms held in memory
#[derive(Default)]
pub struct ConsoleForms {
    state: Mutex<FormsState>,
}

#[derive(Default)]
struct FormsState {
    fields: Vec<FormField>,
    values: HashMap<String, String>,
    focused: Option<String>,
}

impl ConsoleForms {
    /// Inputs rendered by each form
    pub fn fields_for(kind: AuthFormKind) -> Vec<FormField> {
        match kind {
            AuthFormKind::Login => vec![
                FormField::new("email", "Email"),
                FormField::new("password", "Password"),
            ],
            AuthFormKind::Signup => vec![
                FormField::new("fullName", "Full Name"),
                FormField::new("email", "Email"),
                FormField::new("password", "Password"),
                FormField::new("confirmPassword", "Confirm Password"),
            ],
        }
    }

    /// Render a form, or none
    pub fn show(&self, kind: Option<AuthFormKind>) {
        let mut state = self.state.lock();
        state.fields = kind.map(Self::fields_for).unwrap_or_default();
        state.values.clear();
        state.focused = None;
    }

    pub fn value(&self, field_id: &str) -> Option<String> {
        self.state.lock().values.get(field_id).cloned()
    }

    pub fn focused(&self) -> Option<String> {
        self.state.lock().focused.clone()
    }
}

impl FormBinding for ConsoleForms {
    fn rendered_fields(&self) -> Vec<FormField> {
        self.state.lock().fields.clone()
    }

    fn focus(&self, field_id: &str) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        if !state.fields.iter().any(|f| f.id == field_id) {
            return Err(DispatchError::TargetMissing(field_id.to_string()));
        }
        state.focused = Some(field_id.to_string());
        tracing::info!("[form] focus {}", field_id);
        Ok(())
    }

    fn set_value(&self, field_id: &str, value: &str) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        let Some(field) = state.fields.iter().find(|f| f.id == field_id) else {
            return Err(DispatchError::TargetMissing(field_id.to_string()));
        };
        let shown = match field.kind {
            crate::host::FieldKind::Password => "*".repeat(value.chars().count()),
            _ => value.to_string(),
        };
        tracing::info!("[form] {} = {}", field_id, shown);
        state.values.insert(field_id.to_string(), value.to_string());
        Ok(())
    }
}

/// Records auth and account actions
#[derive(Default)]
pub struct ConsoleActions {
    role: Mutex<Option<String>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ConsoleActions {
    pub fn set_role(&self, role: Option<&str>) {
        *self.role.lock() = role.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), DispatchError> {
        tracing::info!("[actions] {}", call);
        self.calls.lock().push(call);
        Ok(())
    }
}

impl HostActions for ConsoleActions {
    fn submit(&self) -> Result<(), DispatchError> {
        self.record("submit")
    }

    fn cancel(&self) -> Result<(), DispatchError> {
        self.record("cancel")
    }

    fn logout(&self) -> Result<(), DispatchError> {
        self.record("logout")
    }

    fn open_admin(&self) -> Result<(), DispatchError> {
        self.record("open_admin")
    }

    fn user_role(&self) -> Option<String> {
        self.role.lock().clone()
    }
}

/// The four console adapters, shared with the harness loop
#[derive(Clone)]
pub struct ConsoleHost {
    pub router: Arc<ConsoleRouter>,
    pub viewport: Arc<ConsoleViewport>,
    pub forms: Arc<ConsoleForms>,
    pub actions: Arc<ConsoleActions>,
}

impl ConsoleHost {
    pub fn new(start_path: &str, viewport_height: f64) -> Self {
        Self {
            router: Arc::new(ConsoleRouter::new(start_path)),
            viewport: Arc::new(ConsoleViewport::new(viewport_height)),
            forms: Arc::new(ConsoleForms::default()),
            actions: Arc::new(ConsoleActions::default()),
        }
    }

    pub fn host(&self, events: EventBus) -> Host {
        Host {
            router: self.router.clone(),
            viewport: self.viewport.clone(),
            forms: self.forms.clone(),
            actions: self.actions.clone(),
            events,
        }
    }
}

/// Lifecycle callbacks the console backend delivers asynchronously
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSignal {
    Started(RecognitionMode),
    Ended(RecognitionMode),
}

/// Recognition backend whose "microphone" is stdin
pub struct ConsoleRecognition {
    signals: mpsc::UnboundedSender<BackendSignal>,
    listening: Mutex<Option<RecognitionMode>>,
}

impl ConsoleRecognition {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendSignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        (
            Self {
                signals,
                listening: Mutex::new(None),
            },
            receiver,
        )
    }

    /// Mode whose session currently owns stdin
    pub fn listening_mode(&self) -> Option<RecognitionMode> {
        *self.listening.lock()
    }
}

impl RecognitionBackend for ConsoleRecognition {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(
        &self,
        mode: RecognitionMode,
        settings: &RecognitionSettings,
    ) -> Result<(), RecognitionError> {
        *self.listening.lock() = Some(mode);
        tracing::debug!("[mic] {} listening ({})", mode, settings.language);
        self.signals
            .send(BackendSignal::Started(mode))
            .map_err(|e| RecognitionError::Backend(e.to_string()))
    }

    fn stop(&self, mode: RecognitionMode) {
        let was_listening = {
            let mut listening = self.listening.lock();
            if *listening == Some(mode) {
                *listening = None;
                true
            } else {
                false
            }
        };
        if was_listening {
            tracing::debug!("[mic] {} stopped", mode);
            let _ = self.signals.send(BackendSignal::Ended(mode));
        }
    }
}

/// Local synthesizer that prints instead of speaking
#[derive(Default)]
pub struct ConsoleSpeech {
    spoken: Mutex<Vec<String>>,
}

impl ConsoleSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

impl LocalSynthesizer for ConsoleSpeech {
    fn is_supported(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![VoiceInfo::new("Daniel", "en-GB")]
    }

    fn speak(&self, _id: u64, text: &str, voice: Option<&VoiceInfo>) -> Result<(), SpeechError> {
        let voice = voice.map(|v| v.name.as_str()).unwrap_or("default");
        println!("  ({}) {}", voice, text);
        self.spoken.lock().push(text.to_string());
        Ok(())
    }

    fn cancel(&self) {}
}

/// Audio sink that reports what it would play
#[derive(Default)]
pub struct ConsoleAudio;

impl AudioSink for ConsoleAudio {
    fn play(&self, utterance_id: u64, audio: Vec<u8>) -> Result<(), SpeechError> {
        println!("  (remote audio #{}: {} bytes)", utterance_id, audio.len());
        Ok(())
    }

    fn stop(&self) {}
}

const HELP: &str = "\
Commands:
  [confidence] <text>   speak a transcript (confidence defaults to 1.0)
  :route <path>         the host navigated
  :form login|signup    open an auth form
  :close                close the auth form
  :key <chord>          press a keyboard shortcut
  :voice on|off         toggle voice control
  :tts on|off           toggle spoken feedback
  :role <role>|none     set the signed-in user's role
  :error <code>         report a recognition error (e.g. not-allowed)
  :end                  end the current recognition session
  :status               show the active mode
  :quit                 exit";

/// The harness loop state
pub struct Harness {
    controller: VoiceController,
    console: ConsoleHost,
    recognition: Arc<ConsoleRecognition>,
}

impl Harness {
    pub fn new(
        controller: VoiceController,
        console: ConsoleHost,
        recognition: Arc<ConsoleRecognition>,
    ) -> Self {
        Self {
            controller,
            console,
            recognition,
        }
    }

    /// Run until stdin closes or `:quit`
    pub async fn run<R>(
        &self,
        reader: R,
        events: EventBus,
        mut signals: mpsc::UnboundedReceiver<BackendSignal>,
    ) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut app_events = events.subscribe();
        println!("{}", HELP);

        loop {
            tokio::select! {
                Some(signal) = signals.recv() => match signal {
                    BackendSignal::Started(mode) => self.controller.on_start(mode),
                    BackendSignal::Ended(mode) => self.controller.on_end(mode),
                },
                event = app_events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Harness missed {} events", skipped)
                    }
                    Err(RecvError::Closed) => break,
                },
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if !self.handle_line(&line) {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.controller.shutdown();
        Ok(())
    }

    fn handle_event(&self, event: AppEvent) {
        match event {
            AppEvent::VoiceOpenForm { form_type } => {
                self.console.forms.show(Some(form_type));
                self.controller.open_auth_form(form_type);
            }
            AppEvent::VoiceStateChange { .. } => {}
            other => println!("  [event] {}", serde_json::to_string(&other).unwrap_or_default()),
        }
    }

    /// Returns false when the harness should exit
    pub fn handle_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }

        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            ":quit" | ":q" => return false,
            ":help" => println!("{}", HELP),
            ":route" => {
                self.console.router.navigate(argument);
                self.controller.route_changed(argument);
            }
            ":form" => match argument {
                "login" => self.open_form(AuthFormKind::Login),
                "signup" => self.open_form(AuthFormKind::Signup),
                _ => println!("usage: :form login|signup"),
            },
            ":close" => {
                self.console.forms.show(None);
                self.controller.close_auth_form();
            }
            ":key" => match self.controller.handle_shortcut(argument) {
                Some(action) => println!("  [shortcut] {}", action.description()),
                None => println!("  [shortcut] {} is not bound", argument),
            },
            ":voice" => self.controller.set_voice_control_enabled(argument == "on"),
            ":tts" => self.controller.set_tts_enabled(argument == "on"),
            ":role" => self
                .console
                .actions
                .set_role((argument != "none" && !argument.is_empty()).then_some(argument)),
            ":error" => match self.recognition.listening_mode() {
                Some(mode) => self.controller.on_error(mode, argument),
                None => println!("  (not listening)"),
            },
            ":end" => match self.recognition.listening_mode() {
                Some(mode) => self.recognition.stop(mode),
                None => println!("  (not listening)"),
            },
            ":status" => println!(
                "  mode: {:?}, route: {}",
                self.controller.active_mode(),
                self.console.router.current()
            ),
            _ => self.transcript(line),
        }
        true
    }

    fn open_form(&self, kind: AuthFormKind) {
        self.console.forms.show(Some(kind));
        self.controller.open_auth_form(kind);
    }

    fn transcript(&self, line: &str) {
        let (confidence, text) = match line.split_once(' ') {
            Some((first, rest)) => match first.parse::<f32>() {
                Ok(confidence) => (confidence, rest),
                Err(_) => (1.0, line),
            },
            None => (1.0, line),
        };

        match self.recognition.listening_mode() {
            Some(mode) => self
                .controller
                .on_result(mode, TranscriptResult::final_result(text, confidence)),
            None => println!("  (not listening; try :voice on)"),
        }
    }
}
