//! Commands available on the profile page

use super::rules::{ClassifyContext, RuleSet, Utterance};
use super::vocabulary::{match_bare_page, match_control_phrase, match_explicit_page, match_scroll};
use super::{Intent, ProfileTab};
use regex::Regex;
use std::sync::LazyLock;

/// Role required for the admin panel
pub const ADMIN_ROLE: &str = "admin";

static LOGOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:log\s*out|logout|sign\s*out|signout|log\s+me\s+out|sign\s+me\s+out)\b")
        .unwrap()
});

static ADMIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:admin(?:istrator)?(?:\s+(?:panel|page|dashboard|area))?|control\s+panel)\b")
        .unwrap()
});

static TAB_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:show(?:\s+me)?|open|go\s+to|switch\s+to|view)\s+(?:the\s+)?").unwrap()
});

static TAB_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:tab\s+(one|two|three|four|1|2|3|4)|(first|second|third|fourth)\s+tab)$")
        .unwrap()
});

fn tab_aliases(tab: ProfileTab) -> &'static [&'static str] {
    match tab {
        ProfileTab::Overview => &[
            "overview",
            "profile overview",
            "personal info",
            "personal information",
            "profile info",
            "my details",
        ],
        ProfileTab::Courses => &["my courses", "enrolled courses", "my enrollments", "enrollments"],
        ProfileTab::Progress => &[
            "progress",
            "my progress",
            "achievements",
            "certificates",
            "my certificates",
        ],
        ProfileTab::Settings => &["settings", "account settings", "preferences", "my settings"],
    }
}

fn tab_from_number(word: &str) -> Option<ProfileTab> {
    let index = match word {
        "one" | "1" | "first" => 0,
        "two" | "2" | "second" => 1,
        "three" | "3" | "third" => 2,
        "four" | "4" | "fourth" => 3,
        _ => return None,
    };
    ProfileTab::from_index(index)
}

fn match_logout(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    LOGOUT.is_match(&u.text).then_some(Intent::Logout)
}

fn match_admin(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    ADMIN.is_match(&u.text).then(|| Intent::OpenAdmin {
        required_role: ADMIN_ROLE.to_string(),
    })
}

fn match_tab(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    let phrase = TAB_VERB.replace(&u.text, "");
    let phrase = phrase.trim();

    if let Some(caps) = TAB_NUMBER.captures(phrase) {
        let word = caps.get(1).or_else(|| caps.get(2))?.as_str();
        return tab_from_number(word).map(|tab| Intent::SwitchProfileTab { tab });
    }

    let (core, had_suffix) = match phrase
        .strip_suffix(" tab")
        .or_else(|| phrase.strip_suffix(" section"))
    {
        Some(core) => (core, true),
        None => (phrase, false),
    };

    ProfileTab::ALL
        .into_iter()
        .find(|tab| tab_aliases(*tab).contains(&core) || (had_suffix && tab.label() == core))
        .map(|tab| Intent::SwitchProfileTab { tab })
}

/// Classifier used while the profile route is showing
#[derive(Clone)]
pub struct ProfileClassifier {
    rules: RuleSet,
}

impl ProfileClassifier {
    pub fn new(threshold: f32) -> Self {
        let rules = RuleSet::new("profile", threshold)
            .rule("scroll", match_scroll)
            .rule("logout", match_logout)
            .rule("admin", match_admin)
            .rule("tab", match_tab)
            .rule("explicit_page", match_explicit_page)
            .rule("bare_page", match_bare_page)
            .rule("control_phrase", match_control_phrase);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Option<Intent> {
        ProfileClassifier::new(0.3).classify(text, 0.8, "/profile")
    }

    fn tab(text: &str) -> Option<ProfileTab> {
        match classify(text)? {
            Intent::SwitchProfileTab { tab } => Some(tab),
            _ => None,
        }
    }

    #[test]
    fn test_logout_and_admin() {
        assert_eq!(classify("log out"), Some(Intent::Logout));
        assert_eq!(classify("please sign me out"), Some(Intent::Logout));
        assert_eq!(
            classify("open the admin panel"),
            Some(Intent::OpenAdmin {
                required_role: "admin".to_string()
            })
        );
    }

    #[test]
    fn test_tab_switching() {
        assert_eq!(tab("show my courses"), Some(ProfileTab::Courses));
        assert_eq!(tab("courses tab"), Some(ProfileTab::Courses));
        assert_eq!(tab("go to settings"), Some(ProfileTab::Settings));
        assert_eq!(tab("my progress"), Some(ProfileTab::Progress));
        assert_eq!(tab("second tab"), Some(ProfileTab::Courses));
        assert_eq!(tab("switch to tab four"), Some(ProfileTab::Settings));
        assert_eq!(tab("overview"), Some(ProfileTab::Overview));
    }

    #[test]
    fn test_navigation_away() {
        assert_eq!(classify("go to courses"), Some(Intent::navigate("/courses", "courses")));
        assert_eq!(classify("home"), Some(Intent::navigate("/", "home")));
        assert_eq!(
            classify("my profile"),
            Some(Intent::AlreadyOnPage {
                path: "/profile".to_string(),
                page: "profile".to_string()
            })
        );
    }

    #[test]
    fn test_scroll_first() {
        assert!(matches!(classify("scroll down"), Some(Intent::Scroll { .. })));
    }

    #[test]
    fn test_fallback_and_unknown() {
        assert_eq!(classify("go back"), Some(Intent::GoBack));
        assert_eq!(classify("tell me a joke"), None);
    }
}
