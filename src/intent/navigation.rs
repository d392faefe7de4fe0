//! Site-wide navigation commands

use super::rules::{ClassifyContext, RuleSet};
use super::vocabulary::{
    match_auth_form, match_bare_page, match_control_phrase, match_destination_keyword,
    match_explicit_page, match_scroll,
};
use super::Intent;

/// Classifier used on every non-profile route
#[derive(Clone)]
pub struct NavigationClassifier {
    rules: RuleSet,
}

impl NavigationClassifier {
    pub fn new(threshold: f32) -> Self {
        let rules = RuleSet::new("navigation", threshold)
            .rule("scroll", match_scroll)
            .rule("auth_form", match_auth_form)
            .rule("explicit_page", match_explicit_page)
            .rule("bare_page", match_bare_page)
            .rule("control_phrase", match_control_phrase)
            .rule("destination_keyword", match_destination_keyword);
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify(
        &self,
        transcript: &str,
        confidence: f32,
        current_path: &str,
    ) -> Option<Intent> {
        self.rules
            .classify(transcript, confidence, &ClassifyContext::at(current_path))
            .map(|intent| intent.resolve_against(current_path))
    }
}
