//! Speech engine: an ordered chain of synthesis tiers, one utterance at a time
//!
//! ```text
//! speak(text) ─► cancel in-flight ─► tier[0] ─ok─► audible
//!                                       │
//!                                      err (or late playback error)
//!                                       ▼
//!                                    tier[1] ─ok─► audible
//!                                       │
//!                                      err ─► dropped, logged
//! ```
//!
//! The chain is `[Remote, Local]` when a remote synthesizer is configured and
//! `[Local]` otherwise. Every request bumps a generation counter. A fetch or
//! callback carrying an older generation is discarded, so a superseded
//! request can never become audible.

use super::local::{select_voice, AudioSink, LocalSynthesizer};
use super::remote::{RemoteSynthesizer, RemoteTtsClient};
use super::{SpeechOutput, SpeechUtteranceRequest, SynthesisTier, VoicePreference};
use crate::config::SpeechConfig;
use crate::error::SpeechError;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// Cancel-before-speak speech engine
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct SpeechEngine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    /// Attempted in order until one accepts the utterance
    tiers: Vec<SynthesisTier>,
    remote: Option<Arc<dyn RemoteSynthesizer>>,
    local: Arc<dyn LocalSynthesizer>,
    sink: Arc<dyn AudioSink>,
    preference: VoicePreference,
    /// Held while audio is started or cancelled so the two never interleave.
    /// Always taken before `inner`.
    playback: Mutex<()>,
    inner: Mutex<EngineInner>,
}

#[derive(Default)]
struct EngineInner {
    generation: u64,
    current: Option<SpeechUtteranceRequest>,
    fetch: Option<JoinHandle<()>>,
}

/// How a tier took an utterance
enum Accepted {
    /// Audible now
    Speaking,
    /// Audio is being fetched; the outcome arrives later
    Pending,
}

impl SpeechEngine {
    pub fn new(
        remote: Option<Arc<dyn RemoteSynthesizer>>,
        local: Arc<dyn LocalSynthesizer>,
        sink: Arc<dyn AudioSink>,
        preference: VoicePreference,
    ) -> Self {
        let mut tiers = Vec::with_capacity(2);
        if remote.is_some() {
            tiers.push(SynthesisTier::Remote);
        }
        tiers.push(SynthesisTier::Local);

        Self {
            shared: Arc::new(EngineShared {
                tiers,
                remote,
                local,
                sink,
                preference,
                playback: Mutex::new(()),
                inner: Mutex::new(EngineInner::default()),
            }),
        }
    }

    /// Build from settings; an unusable remote configuration falls back to local only
    pub fn from_config(
        config: &SpeechConfig,
        local: Arc<dyn LocalSynthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        let remote = match RemoteTtsClient::from_config(config) {
            Ok(Some(client)) => Some(Arc::new(client) as Arc<dyn RemoteSynthesizer>),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Remote synthesis unavailable: {}", e);
                None
            }
        };
        Self::new(remote, local, sink, VoicePreference::from(config))
    }

    pub fn has_remote(&self) -> bool {
        self.shared.remote.is_some()
    }

    /// The fallback chain, first choice first
    pub fn tiers(&self) -> &[SynthesisTier] {
        &self.shared.tiers
    }

    /// The utterance currently being fetched or played
    pub fn current_request(&self) -> Option<SpeechUtteranceRequest> {
        self.shared.inner.lock().current.clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.shared.inner.lock().current.is_some()
    }

    /// Cancel anything in flight and speak `text`
    ///
    /// Returns the utterance id, or `None` for blank text.
    pub fn speak_text(&self, text: &str) -> Option<u64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let id = self.shared.cancel_in_flight();
        let _gate = self.shared.playback.lock();
        self.shared.run_chain(id, text, 0);
        Some(id)
    }

    /// Cancel everything unconditionally
    pub fn stop_all(&self) {
        self.shared.cancel_in_flight();
        tracing::debug!("Speech stopped");
    }

    /// Audio playback failed after it started
    ///
    /// Moves on to the next tier if `utterance_id` is still the current
    /// remote utterance; otherwise the report is stale and ignored.
    pub fn on_playback_error(&self, utterance_id: u64, error: SpeechError) {
        let _gate = self.shared.playback.lock();
        let (text, tier) = {
            let inner = self.shared.inner.lock();
            match &inner.current {
                Some(request)
                    if request.id == utterance_id
                        && request.tier == SynthesisTier::Remote
                        && inner.generation == utterance_id =>
                {
                    (request.text.clone(), request.tier)
                }
                _ => {
                    tracing::debug!("Ignoring playback error for stale utterance {}", utterance_id);
                    return;
                }
            }
        };

        tracing::warn!("{:?} audio playback failed: {}", tier, error);
        let next = self.shared.next_tier_after(tier);
        self.shared.run_chain(utterance_id, &text, next);
    }

    /// Playback or local synthesis finished
    pub fn on_playback_ended(&self, utterance_id: u64) {
        let mut inner = self.shared.inner.lock();
        if inner.current.as_ref().is_some_and(|r| r.id == utterance_id) {
            inner.current = None;
        }
    }
}

impl EngineShared {
    fn is_current(&self, id: u64) -> bool {
        self.inner.lock().generation == id
    }

    fn next_tier_after(&self, tier: SynthesisTier) -> usize {
        self.tiers
            .iter()
            .position(|t| *t == tier)
            .map_or(self.tiers.len(), |index| index + 1)
    }

    /// Invalidate everything older and silence both outputs
    fn cancel_in_flight(&self) -> u64 {
        let _gate = self.playback.lock();
        let (id, fetch) = {
            let mut inner = self.inner.lock();
            inner.generation = inner.generation.wrapping_add(1);
            inner.current = None;
            (inner.generation, inner.fetch.take())
        };

        if let Some(fetch) = fetch {
            fetch.abort();
        }
        self.sink.stop();
        self.local.cancel();
        id
    }

    /// Walk the chain from `start` until a tier accepts; caller holds the playback gate
    fn run_chain(self: &Arc<Self>, id: u64, text: &str, start: usize) {
        for tier in self.tiers.iter().skip(start) {
            match self.attempt(id, text, *tier) {
                Ok(Accepted::Speaking | Accepted::Pending) => return,
                Err(SpeechError::Superseded) => {
                    tracing::debug!("Utterance {} superseded before {:?} synthesis", id, tier);
                    return;
                }
                Err(e) => tracing::warn!("{:?} synthesis failed, trying next tier: {}", tier, e),
            }
        }

        tracing::warn!("No speech synthesis available, dropping utterance: {}", text);
        let mut inner = self.inner.lock();
        if inner.generation == id {
            inner.current = None;
        }
    }

    fn attempt(
        self: &Arc<Self>,
        id: u64,
        text: &str,
        tier: SynthesisTier,
    ) -> Result<Accepted, SpeechError> {
        if !self.is_current(id) {
            return Err(SpeechError::Superseded);
        }
        match tier {
            SynthesisTier::Remote => self.attempt_remote(id, text),
            SynthesisTier::Local => self.attempt_local(id, text),
        }
    }

    fn attempt_remote(self: &Arc<Self>, id: u64, text: &str) -> Result<Accepted, SpeechError> {
        let remote = self.remote.clone().ok_or(SpeechError::NotConfigured)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SpeechError::ConnectionFailed("no async runtime".to_string()))?;

        self.inner.lock().current = Some(SpeechUtteranceRequest {
            id,
            text: text.to_string(),
            tier: SynthesisTier::Remote,
        });

        let weak: Weak<EngineShared> = Arc::downgrade(self);
        let owned = text.to_string();
        let handle = runtime.spawn(async move {
            let result = remote.synthesize(&owned).await;
            if let Some(shared) = weak.upgrade() {
                shared.finish_remote(id, &owned, result);
            }
        });

        let mut inner = self.inner.lock();
        if inner.generation == id {
            inner.fetch = Some(handle);
        } else {
            handle.abort();
        }
        Ok(Accepted::Pending)
    }

    fn finish_remote(self: &Arc<Self>, id: u64, text: &str, result: Result<Vec<u8>, SpeechError>) {
        let _gate = self.playback.lock();
        if !self.is_current(id) {
            tracing::debug!("Discarding superseded remote audio for utterance {}", id);
            return;
        }

        let outcome = result.and_then(|audio| self.sink.play(id, audio));
        match outcome {
            Ok(()) => tracing::debug!("Playing remote audio for utterance {}", id),
            Err(e) => {
                tracing::warn!("Remote speech failed: {}", e);
                let next = self.next_tier_after(SynthesisTier::Remote);
                self.run_chain(id, text, next);
            }
        }
    }

    fn attempt_local(&self, id: u64, text: &str) -> Result<Accepted, SpeechError> {
        if !self.local.is_supported() {
            return Err(SpeechError::LocalUnavailable);
        }

        let voice = select_voice(&self.local.voices(), &self.preference);
        self.inner.lock().current = Some(SpeechUtteranceRequest {
            id,
            text: text.to_string(),
            tier: SynthesisTier::Local,
        });

        self.local.speak(id, text, voice.as_ref())?;
        tracing::debug!(
            "Speaking locally with voice {}",
            voice.as_ref().map(|v| v.name.as_str()).unwrap_or("default")
        );
        Ok(Accepted::Speaking)
    }
}

impl SpeechOutput for SpeechEngine {
    fn speak(&self, text: &str) {
        self.speak_text(text);
    }

    fn stop(&self) {
        self.stop_all();
    }
}
