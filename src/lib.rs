//! CourseVox - voice commands and spoken feedback for the course platform
//!
//! The host application supplies routing, scrolling and form bindings through
//! the traits in [`host`]; this crate decides when to listen, what a
//! transcript means, and what to say back.

pub mod arbitration;
pub mod binder;
pub mod config;
pub mod console;
pub mod controller;
pub mod cooldown;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod flags;
pub mod host;
pub mod intent;
pub mod recognition;
pub mod shortcuts;
pub mod speech;

pub use binder::{BindingGuard, HoverSpeechBinder, TextSource, UiEvent};
pub use controller::VoiceController;
pub use events::{AppEvent, EventBus};
pub use intent::Intent;
pub use recognition::{RecognitionMode, TranscriptResult};
pub use speech::SpeechEngine;

use console::{ConsoleAudio, ConsoleHost, ConsoleRecognition, ConsoleSpeech, Harness};
use std::sync::{Arc, Once};

/// Viewport height the console harness pretends to have
const CONSOLE_VIEWPORT_HEIGHT: f64 = 900.0;

static LOGGING: Once = Once::new();

/// Set up stdout and file logging (local time for readability)
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging() {
    LOGGING.call_once(|| {
        use tracing_subscriber::prelude::*;

        /// Format timestamps using the system's local time via chrono
        struct LocalTimer;
        impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
            fn format_time(
                &self,
                w: &mut tracing_subscriber::fmt::format::Writer<'_>,
            ) -> std::fmt::Result {
                write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
            }
        }

        let log_dir = config::get_data_dir().join("logs");
        let _ = std::fs::create_dir_all(&log_dir);
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("coursevox-debug.log"))
            .ok();

        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let result = if let Some(file) = log_file {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_timer(LocalTimer)
                .with_ansi(false);
            let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
                .try_init()
        };

        if let Err(e) = result {
            eprintln!("Logging already initialised: {}", e);
        }
    });
}

/// Run the console harness against stdin until it closes or `:quit`
pub async fn run() -> anyhow::Result<()> {
    init_logging();
    tracing::info!("CourseVox starting");

    let config = config::get_config();
    if let Err(e) = config.recognition.validate() {
        anyhow::bail!("Invalid recognition settings: {}", e);
    }

    let events = EventBus::new();
    let console = ConsoleHost::new("/", CONSOLE_VIEWPORT_HEIGHT);
    let (recognition, signals) = ConsoleRecognition::new();
    let recognition = Arc::new(recognition);

    let speech = SpeechEngine::from_config(
        &config.speech,
        Arc::new(ConsoleSpeech::default()),
        Arc::new(ConsoleAudio),
    );
    if speech.has_remote() {
        tracing::info!("Remote speech synthesis enabled");
    }

    let controller = VoiceController::new(
        &config,
        recognition.clone(),
        Arc::new(speech),
        console.host(events.clone()),
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Harness::new(controller, console, recognition)
        .run(stdin, events, signals)
        .await?;

    tracing::info!("CourseVox stopped");
    Ok(())
}
