//! Platform speech synthesis and audio playback seams

use super::VoicePreference;
use crate::error::SpeechError;

/// A voice offered by the local synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP-47 language tag, e.g. "en-GB"
    pub lang: String,
}

impl VoiceInfo {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// The platform's built-in text-to-speech
///
/// `speak` starts an utterance and returns; completion is reported back to
/// the engine asynchronously.
pub trait LocalSynthesizer: Send + Sync {
    fn is_supported(&self) -> bool;
    fn voices(&self) -> Vec<VoiceInfo>;
    fn speak(&self, utterance_id: u64, text: &str, voice: Option<&VoiceInfo>)
        -> Result<(), SpeechError>;
    fn cancel(&self);
}

/// Plays synthesized audio bytes
///
/// `play` starts playback and returns. A playback failure that happens later
/// is reported through [`super::SpeechEngine::on_playback_error`].
pub trait AudioSink: Send + Sync {
    fn play(&self, utterance_id: u64, audio: Vec<u8>) -> Result<(), SpeechError>;
    fn stop(&self);
}

/// Pick a local voice
///
/// Ranked preferred names first, then any English voice not excluded, then
/// the first voice available.
pub fn select_voice(voices: &[VoiceInfo], preference: &VoicePreference) -> Option<VoiceInfo> {
    for wanted in &preference.preferred {
        let wanted = wanted.to_lowercase();
        if let Some(voice) = voices
            .iter()
            .find(|v| v.name.to_lowercase().contains(&wanted))
        {
            return Some(voice.clone());
        }
    }

    let english = voices.iter().find(|v| {
        let name = v.name.to_lowercase();
        v.lang.to_lowercase().starts_with("en")
            && !preference
                .excluded
                .iter()
                .any(|fragment| name.contains(&fragment.to_lowercase()))
    });

    english.or_else(|| voices.first()).cloned()
}
