//! Voice-driven login and signup forms
//!
//! Filling a field takes two utterances: the first names the field and
//! focuses it, the second is captured as its value.

use super::rules::{has_phrase, ClassifyContext, RuleSet, Utterance};
use super::{AuthFormKind, Intent};
use crate::host::{FieldKind, FormField};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const SUBMIT_PHRASES: &[&str] = &[
    "submit",
    "submit form",
    "submit the form",
    "done",
    "continue",
    "send",
    "sign me in",
    "log me in",
    "sign me up",
    "create my account",
    "register me",
];

const CANCEL_PHRASES: &[&str] = &[
    "cancel",
    "close",
    "close form",
    "close the form",
    "never mind",
    "nevermind",
    "exit",
    "go back",
];

static SWITCH_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:switch\s+to|go\s+to|open|show|use)\s+(?:the\s+)?(log\s*in|sign\s*in|sign\s*up|register|registration)(?:\s+form)?$",
    )
    .unwrap()
});

static FIELD_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:enter|type|fill(?:\s+in)?|select|focus(?:\s+on)?|set|change|go\s+to)\s+(?:the\s+|my\s+)?",
    )
    .unwrap()
});

static FIELD_IS_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:my\s+|the\s+)?(.+?)\s+is\s+(.+)$").unwrap());

/// Voice form-filling progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAuthFieldState {
    active_field_id: Option<String>,
    is_filling_active: bool,
}

impl VoiceAuthFieldState {
    /// Input waiting for a spoken value
    pub fn active_field_id(&self) -> Option<&str> {
        self.active_field_id.as_deref()
    }

    /// True from the first focused field until submit or cancel
    pub fn is_filling_active(&self) -> bool {
        self.is_filling_active
    }

    pub fn focus(&mut self, field_id: impl Into<String>) {
        self.active_field_id = Some(field_id.into());
        self.is_filling_active = true;
    }

    /// Value captured; stay in the filling session
    pub fn release(&mut self) {
        self.active_field_id = None;
    }

    pub fn clear(&mut self) {
        self.active_field_id = None;
        self.is_filling_active = false;
    }
}

/// Normalise a spoken value for the given input kind
pub fn normalize_field_value(kind: FieldKind, raw: &str) -> String {
    match kind {
        FieldKind::Email => raw
            .to_lowercase()
            .split_whitespace()
            .map(|word| match word {
                "at" => "@",
                "dot" | "period" | "point" => ".",
                "underscore" => "_",
                "dash" | "hyphen" | "minus" => "-",
                "plus" => "+",
                other => other,
            })
            .collect::<String>()
            .trim_end_matches(['.', ',', '!', '?'])
            .to_string(),
        FieldKind::Password => raw.trim().to_string(),
        FieldKind::Name | FieldKind::Text => raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end_matches(['.', ',', '!', '?'])
            .to_string(),
    }
}

fn exact(u: &Utterance<'_>, phrases: &[&str]) -> bool {
    let text = u.text.strip_prefix("please ").unwrap_or(&u.text);
    phrases.contains(&text)
}

fn match_submit(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    exact(u, SUBMIT_PHRASES).then_some(Intent::Submit)
}

fn match_cancel(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    exact(u, CANCEL_PHRASES).then_some(Intent::Cancel)
}

fn match_switch_form(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    if u.text == "i already have an account" {
        return Some(Intent::OpenAuthForm {
            form: AuthFormKind::Login,
        });
    }
    let caps = SWITCH_FORM.captures(&u.text)?;
    let target = caps.get(1)?.as_str();
    let is_login =
        target.starts_with("log") || (target.starts_with("sign") && target.ends_with("in"));
    let form = if is_login {
        AuthFormKind::Login
    } else {
        AuthFormKind::Signup
    };
    Some(Intent::OpenAuthForm { form })
}

fn match_fill_active(u: &Utterance<'_>, ctx: &ClassifyContext<'_>) -> Option<Intent> {
    let field = ctx.active_field?;
    let value = normalize_field_value(field.kind, u.raw);
    if value.is_empty() {
        return None;
    }
    Some(Intent::FillField {
        field_id: field.id.clone(),
        value,
    })
}

/// Fields by descending label length so "confirm password" beats "password"
fn by_label_length<'a>(fields: &'a [FormField]) -> Vec<&'a FormField> {
    let mut sorted: Vec<&FormField> = fields.iter().collect();
    sorted.sort_by(|a, b| b.label.len().cmp(&a.label.len()));
    sorted
}

fn find_field<'a>(phrase: &str, fields: &'a [FormField]) -> Option<&'a FormField> {
    let phrase = phrase
        .strip_suffix(" field")
        .or_else(|| phrase.strip_suffix(" box"))
        .unwrap_or(phrase);
    let sorted = by_label_length(fields);

    if let Some(field) = sorted.iter().copied().find(|f| has_phrase(phrase, &f.label)) {
        return Some(field);
    }
    sorted
        .into_iter()
        .find(|f| f.kind.synonyms().iter().any(|s| has_phrase(phrase, s)))
}

/// "my email is jane at example dot com" in a single utterance
fn match_field_is_value(u: &Utterance<'_>, ctx: &ClassifyContext<'_>) -> Option<Intent> {
    let caps = FIELD_IS_VALUE.captures(&u.text)?;
    let name = caps.get(1)?.as_str();
    let field = ctx
        .fields
        .iter()
        .find(|f| f.label == name || f.kind.synonyms().contains(&name))?;

    // Take the value from the raw transcript to keep the user's casing
    let raw_value = match u.raw.to_lowercase().find(" is ").and_then(|pos| u.raw.get(pos + 4..)) {
        Some(value) => value,
        None => caps.get(2)?.as_str(),
    };
    let value = normalize_field_value(field.kind, raw_value);
    if value.is_empty() {
        return None;
    }
    Some(Intent::FillField {
        field_id: field.id.clone(),
        value,
    })
}

fn match_select_field(u: &Utterance<'_>, ctx: &ClassifyContext<'_>) -> Option<Intent> {
    let phrase = FIELD_VERB.replace(&u.text, "");
    let field = find_field(phrase.trim(), ctx.fields)?;
    Some(Intent::FocusField {
        field_id: field.id.clone(),
        label: field.label.clone(),
    })
}

/// Classifier used while a login or signup form is open
#[derive(Clone)]
pub struct VoiceAuthClassifier {
    rules: RuleSet,
}

impl VoiceAuthClassifier {
    pub fn new(threshold: f32) -> Self {
        let rules = RuleSet::new("voice-auth", threshold)
            .rule("submit", match_submit)
            .rule("cancel", match_cancel)
            .rule("switch_form", match_switch_form)
            .rule("fill_active", match_fill_active)
            .rule("field_is_value", match_field_is_value)
            .rule("select_field", match_select_field);
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify(
        &self,
        transcript: &str,
        confidence: f32,
        ctx: &ClassifyContext<'_>,
    ) -> Option<Intent> {
        self.rules.classify(transcript, confidence, ctx)
    }
}
