//! Speak-on-hover and speak-on-focus bindings
//!
//! The host forwards pointer and focus events for bound elements. Enter and
//! focus speak the element's text; leave and blur stop speech if that
//! element was the last one to speak.

use crate::flags::LiveFlag;
use crate::speech::SpeechOutput;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Where a binding's text comes from
#[derive(Clone)]
pub enum TextSource {
    Fixed(String),
    /// Evaluated each time the element is hovered or focused
    Live(Arc<dyn Fn() -> String + Send + Sync>),
}

impl TextSource {
    pub fn fixed(text: impl Into<String>) -> Self {
        TextSource::Fixed(text.into())
    }

    pub fn live(getter: impl Fn() -> String + Send + Sync + 'static) -> Self {
        TextSource::Live(Arc::new(getter))
    }

    pub fn resolve(&self) -> String {
        match self {
            TextSource::Fixed(text) => text.clone(),
            TextSource::Live(getter) => getter(),
        }
    }
}

impl fmt::Debug for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSource::Fixed(text) => f.debug_tuple("Fixed").field(text).finish(),
            TextSource::Live(_) => f.write_str("Live(..)"),
        }
    }
}

/// Pointer and focus events forwarded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    MouseEnter,
    MouseLeave,
    Focus,
    Blur,
}

struct Binding {
    id: Uuid,
    source: TextSource,
}

struct BinderShared {
    speech: Arc<dyn SpeechOutput>,
    enabled: LiveFlag,
    bindings: Mutex<HashMap<String, Binding>>,
    last_speaker: Mutex<Option<Uuid>>,
}

/// Registry of hover/focus bindings
#[derive(Clone)]
pub struct HoverSpeechBinder {
    shared: Arc<BinderShared>,
}

impl HoverSpeechBinder {
    /// `enabled` is read on every event
    pub fn new(speech: Arc<dyn SpeechOutput>, enabled: LiveFlag) -> Self {
        Self {
            shared: Arc::new(BinderShared {
                speech,
                enabled,
                bindings: Mutex::new(HashMap::new()),
                last_speaker: Mutex::new(None),
            }),
        }
    }

    /// Bind `element_id`; the binding lives until the guard is dropped
    ///
    /// Re-binding an element replaces its previous binding.
    pub fn attach(&self, element_id: impl Into<String>, source: TextSource) -> BindingGuard {
        let element_id = element_id.into();
        let id = Uuid::new_v4();
        self.shared
            .bindings
            .lock()
            .insert(element_id.clone(), Binding { id, source });
        tracing::debug!("Attached speech binding to {}", element_id);

        BindingGuard {
            element_id,
            binding_id: id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn binding_count(&self) -> usize {
        self.shared.bindings.lock().len()
    }

    pub fn is_bound(&self, element_id: &str) -> bool {
        self.shared.bindings.lock().contains_key(element_id)
    }

    /// Handle an event for an element; unbound elements are ignored
    pub fn handle_event(&self, element_id: &str, event: UiEvent) {
        let binding = {
            let bindings = self.shared.bindings.lock();
            match bindings.get(element_id) {
                Some(binding) => (binding.id, binding.source.clone()),
                None => return,
            }
        };
        let (binding_id, source) = binding;

        match event {
            UiEvent::MouseEnter | UiEvent::Focus => {
                if !self.shared.enabled.get() {
                    return;
                }
                let text = source.resolve();
                if text.trim().is_empty() {
                    return;
                }
                *self.shared.last_speaker.lock() = Some(binding_id);
                self.shared.speech.speak(&text);
            }
            UiEvent::MouseLeave | UiEvent::Blur => self.shared.stop_if_last(binding_id),
        }
    }
}

impl BinderShared {
    fn stop_if_last(&self, binding_id: Uuid) {
        let was_last = {
            let mut last = self.last_speaker.lock();
            if *last == Some(binding_id) {
                *last = None;
                true
            } else {
                false
            }
        };
        if was_last {
            self.speech.stop();
        }
    }
}

/// Detaches its binding when dropped
#[must_use = "the binding is removed when the guard is dropped"]
pub struct BindingGuard {
    element_id: String,
    binding_id: Uuid,
    shared: Weak<BinderShared>,
}

impl BindingGuard {
    pub fn element_id(&self) -> &str {
        &self.element_id
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        {
            let mut bindings = shared.bindings.lock();
            // A newer binding for the same element is left alone
            if bindings
                .get(&self.element_id)
                .is_some_and(|b| b.id == self.binding_id)
            {
                bindings.remove(&self.element_id);
            }
        }
        shared.stop_if_last(self.binding_id);
        tracing::debug!("Detached speech binding from {}", self.element_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::tests::RecordingSpeech;

    fn binder(enabled: &LiveFlag) -> (HoverSpeechBinder, Arc<RecordingSpeech>) {
        let speech = RecordingSpeech::new();
        (HoverSpeechBinder::new(speech.clone(), enabled.clone()), speech)
    }

    #[test]
    fn test_enter_speaks_leave_stops() {
        let flag = LiveFlag::new(true);
        let (binder, speech) = binder(&flag);
        let _guard = binder.attach("nav-courses", TextSource::fixed("Courses"));

        binder.handle_event("nav-courses", UiEvent::MouseEnter);
        binder.handle_event("nav-courses", UiEvent::MouseLeave);

        assert_eq!(*speech.spoken.lock(), vec!["Courses".to_string()]);
        assert_eq!(*speech.stops.lock(), 1);
    }

    #[test]
    fn test_flag_is_read_at_event_time() {
        let flag = LiveFlag::new(false);
        let (binder, speech) = binder(&flag);
        let _guard = binder.attach("logo", TextSource::fixed("Home"));

        binder.handle_event("logo", UiEvent::Focus);
        flag.set(true);
        binder.handle_event("logo", UiEvent::Focus);

        assert_eq!(speech.spoken.lock().len(), 1);
    }

    #[test]
    fn test_live_text_source() {
        let flag = LiveFlag::new(true);
        let (binder, speech) = binder(&flag);
        let counter = Arc::new(Mutex::new(0));
        let source = {
            let counter = counter.clone();
            TextSource::live(move || {
                let mut n = counter.lock();
                *n += 1;
                format!("{} unread messages", n)
            })
        };
        let _guard = binder.attach("inbox", source);

        binder.handle_event("inbox", UiEvent::MouseEnter);
        binder.handle_event("inbox", UiEvent::MouseEnter);

        assert_eq!(speech.last().as_deref(), Some("2 unread messages"));
    }

    #[test]
    fn test_leave_of_other_element_does_not_stop() {
        let flag = LiveFlag::new(true);
        let (binder, speech) = binder(&flag);
        let _a = binder.attach("a", TextSource::fixed("Alpha"));
        let _b = binder.attach("b", TextSource::fixed("Beta"));

        binder.handle_event("a", UiEvent::MouseEnter);
        binder.handle_event("b", UiEvent::MouseEnter);
        binder.handle_event("a", UiEvent::MouseLeave);

        assert_eq!(*speech.stops.lock(), 0);
    }

    #[test]
    fn test_dropping_guard_detaches() {
        let flag = LiveFlag::new(true);
        let (binder, speech) = binder(&flag);
        let guard = binder.attach("button", TextSource::fixed("Submit"));
        assert!(binder.is_bound("button"));

        drop(guard);
        binder.handle_event("button", UiEvent::MouseEnter);

        assert_eq!(binder.binding_count(), 0);
        assert!(speech.spoken.lock().is_empty());
    }

    #[test]
    fn test_stale_guard_keeps_newer_binding() {
        let flag = LiveFlag::new(true);
        let (binder, _speech) = binder(&flag);
        let old = binder.attach("title", TextSource::fixed("Old"));
        let _new = binder.attach("title", TextSource::fixed("New"));

        drop(old);
        assert!(binder.is_bound("title"));
    }
}
