//! Ordered rule evaluation shared by every classifier

use super::Intent;
use crate::host::FormField;

/// Signature of a single matching rule
pub type Matcher = fn(&Utterance<'_>, &ClassifyContext<'_>) -> Option<Intent>;

/// A transcript ready for matching
#[derive(Debug, Clone)]
pub struct Utterance<'a> {
    /// Text as recognised (used for captured values)
    pub raw: &'a str,
    /// Lower-cased, punctuation stripped, whitespace collapsed
    pub text: String,
}

impl<'a> Utterance<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            text: normalize_transcript(raw),
        }
    }
}

/// Host state visible to the rules
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext<'a> {
    pub current_path: &'a str,
    /// Inputs rendered in the open auth form
    pub fields: &'a [FormField],
    /// Input awaiting a spoken value
    pub active_field: Option<&'a FormField>,
}

impl<'a> ClassifyContext<'a> {
    pub fn at(current_path: &'a str) -> Self {
        Self {
            current_path,
            fields: &[],
            active_field: None,
        }
    }
}

/// Named rule
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    matcher: Matcher,
}

/// Confidence-gated, first-match-wins list of rules
#[derive(Clone)]
pub struct RuleSet {
    name: &'static str,
    threshold: f32,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(name: &'static str, threshold: f32) -> Self {
        Self {
            name,
            threshold,
            rules: Vec::new(),
        }
    }

    /// Append a rule; earlier rules take priority
    pub fn rule(mut self, name: &'static str, matcher: Matcher) -> Self {
        self.rules.push(Rule { name, matcher });
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Classify and report which rule matched
    pub fn evaluate(
        &self,
        transcript: &str,
        confidence: f32,
        ctx: &ClassifyContext<'_>,
    ) -> Option<(&'static str, Intent)> {
        // Written so that NaN confidence is rejected too
        if !(confidence >= self.threshold) {
            tracing::debug!(
                "{}: ignoring '{}' (confidence {:.2} < {:.2})",
                self.name,
                transcript,
                confidence,
                self.threshold
            );
            return None;
        }

        let utterance = Utterance::new(transcript);
        if utterance.text.is_empty() {
            return None;
        }

        let matched = self
            .rules
            .iter()
            .find_map(|rule| (rule.matcher)(&utterance, ctx).map(|intent| (rule.name, intent)));

        match &matched {
            Some((rule, intent)) => tracing::debug!(
                "{}: '{}' matched rule {} -> {}",
                self.name,
                utterance.text,
                rule,
                intent.kind_name()
            ),
            None => tracing::debug!("{}: no rule matched '{}'", self.name, utterance.text),
        }
        matched
    }

    pub fn classify(
        &self,
        transcript: &str,
        confidence: f32,
        ctx: &ClassifyContext<'_>,
    ) -> Option<Intent> {
        self.evaluate(transcript, confidence, ctx)
            .map(|(_, intent)| intent)
    }
}

/// Lower-case, drop sentence punctuation, collapse whitespace
pub fn normalize_transcript(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            '.' | ',' | '!' | '?' | ';' | ':' | '"' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `phrase` occurs in `text` on word boundaries
pub fn has_phrase(text: &str, phrase: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|window| window == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_submit(_: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
        Some(Intent::Submit)
    }

    fn cancel_on_cancel(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
        (u.text == "cancel").then_some(Intent::Cancel)
    }

    #[test]
    fn test_normalize_transcript() {
        assert_eq!(normalize_transcript("  Open   Courses. "), "open courses");
        assert_eq!(normalize_transcript("Scroll down!"), "scroll down");
        assert_eq!(normalize_transcript("e-mail"), "e-mail");
    }

    #[test]
    fn test_has_phrase_respects_word_boundaries() {
        assert!(has_phrase("please go back now", "go back"));
        assert!(!has_phrase("feedback", "back"));
        assert!(!has_phrase("go", "go back"));
    }

    #[test]
    fn test_first_match_wins() {
        let rules = RuleSet::new("test", 0.3)
            .rule("cancel", cancel_on_cancel)
            .rule("submit", always_submit);
        let ctx = ClassifyContext::at("/");

        assert_eq!(rules.evaluate("cancel", 0.9, &ctx).unwrap().0, "cancel");
        assert_eq!(rules.evaluate("anything", 0.9, &ctx).unwrap().0, "submit");
        assert_eq!(rules.rule_names(), vec!["cancel", "submit"]);
    }

    #[test]
    fn test_confidence_gate() {
        let rules = RuleSet::new("test", 0.3).rule("submit", always_submit);
        let ctx = ClassifyContext::at("/");

        assert!(rules.classify("submit", 0.29, &ctx).is_none());
        assert!(rules.classify("submit", f32::NAN, &ctx).is_none());
        assert!(rules.classify("submit", 0.3, &ctx).is_some());
    }

    #[test]
    fn test_blank_transcript_is_ignored() {
        let rules = RuleSet::new("test", 0.0).rule("submit", always_submit);
        let ctx = ClassifyContext::at("/");

        assert!(rules.classify("   ", 1.0, &ctx).is_none());
        assert!(rules.classify("?!", 1.0, &ctx).is_none());
    }
}
