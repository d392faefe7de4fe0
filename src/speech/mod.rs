//! Speech output
//!
//! A [`SpeechEngine`] speaks one utterance at a time. Each request first tries
//! remote synthesis (when an API key is configured) and falls back to the
//! platform's local synthesizer on any remote failure.

pub mod engine;
pub mod local;
pub mod remote;

pub use engine::SpeechEngine;
pub use local::{select_voice, AudioSink, LocalSynthesizer, VoiceInfo};
pub use remote::{RemoteSynthesizer, RemoteTtsClient};

use crate::config::SpeechConfig;
use crate::flags::LiveFlag;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Anything that can speak confirmations
pub trait SpeechOutput: Send + Sync {
    /// Cancel whatever is playing and speak `text`
    fn speak(&self, text: &str);
    /// Cancel everything
    fn stop(&self);
}

/// Which synthesis path produced the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisTier {
    Remote,
    Local,
}

/// Ranking rules for local voices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoicePreference {
    /// Voice names in rank order
    pub preferred: Vec<String>,
    /// Name fragments skipped by the English fallback
    pub excluded: Vec<String>,
}

impl From<&SpeechConfig> for VoicePreference {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            preferred: config.preferred_voices.clone(),
            excluded: config.excluded_voices.clone(),
        }
    }
}

/// One utterance and the tier currently attempting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechUtteranceRequest {
    pub id: u64,
    pub text: String,
    pub tier: SynthesisTier,
}

/// Speech that only plays while a toggle is on
///
/// `stop` always passes through.
#[derive(Clone)]
pub struct GatedSpeech {
    inner: Arc<dyn SpeechOutput>,
    enabled: LiveFlag,
}

impl GatedSpeech {
    pub fn new(inner: Arc<dyn SpeechOutput>, enabled: LiveFlag) -> Self {
        Self { inner, enabled }
    }

    pub fn enabled(&self) -> &LiveFlag {
        &self.enabled
    }
}

impl SpeechOutput for GatedSpeech {
    fn speak(&self, text: &str) {
        if self.enabled.get() {
            self.inner.speak(text);
        } else {
            tracing::debug!("Speech disabled, skipping: {}", text);
        }
    }

    fn stop(&self) {
        self.inner.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every request instead of speaking
    #[derive(Default)]
    pub struct RecordingSpeech {
        pub spoken: Mutex<Vec<String>>,
        pub stops: Mutex<usize>,
    }

    impl RecordingSpeech {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn last(&self) -> Option<String> {
            self.spoken.lock().last().cloned()
        }
    }

    impl SpeechOutput for RecordingSpeech {
        fn speak(&self, text: &str) {
            self.spoken.lock().push(text.to_string());
        }

        fn stop(&self) {
            *self.stops.lock() += 1;
        }
    }

    #[test]
    fn test_gated_speech_reads_flag_at_call_time() {
        let recorder = RecordingSpeech::new();
        let flag = LiveFlag::new(true);
        let gated = GatedSpeech::new(recorder.clone(), flag.clone());

        gated.speak("one");
        flag.set(false);
        gated.speak("two");
        gated.stop();

        assert_eq!(*recorder.spoken.lock(), vec!["one".to_string()]);
        assert_eq!(*recorder.stops.lock(), 1);
    }

    #[test]
    fn test_voice_preference_from_config() {
        let preference = VoicePreference::from(&SpeechConfig::default());
        assert_eq!(preference.preferred[0], "Google UK English Male");
        assert!(preference.excluded.contains(&"zira".to_string()));
    }
}
