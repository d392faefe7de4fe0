//! Spoken vocabulary shared by the navigation and profile classifiers

use super::rules::{has_phrase, ClassifyContext, Utterance};
use super::{AuthFormKind, Intent, ScrollDirection};
use regex::Regex;
use std::sync::LazyLock;

/// A routable page and the words that reach it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub name: &'static str,
    pub path: &'static str,
    /// Whole-transcript names ("my profile", "course catalog")
    pub aliases: &'static [&'static str],
    /// Words that reach the page from the fallback scan
    pub keywords: &'static [&'static str],
}

pub const DESTINATIONS: &[Destination] = &[
    Destination {
        name: "home",
        path: "/",
        aliases: &["home", "home page", "homepage", "main page", "start page"],
        keywords: &["home", "homepage"],
    },
    Destination {
        name: "courses",
        path: "/courses",
        aliases: &[
            "courses",
            "course",
            "all courses",
            "course list",
            "catalog",
            "course catalog",
        ],
        keywords: &["courses", "course", "classes", "catalog"],
    },
    Destination {
        name: "dashboard",
        path: "/dashboard",
        aliases: &["dashboard", "my dashboard", "my learning"],
        keywords: &["dashboard"],
    },
    Destination {
        name: "profile",
        path: "/profile",
        aliases: &["profile", "my profile", "account", "my account"],
        keywords: &["profile", "account"],
    },
    Destination {
        name: "about",
        path: "/about",
        aliases: &["about", "about us"],
        keywords: &["about"],
    },
    Destination {
        name: "contact",
        path: "/contact",
        aliases: &["contact", "contact us", "support", "help"],
        keywords: &["contact", "support", "help"],
    },
];

/// Look up a destination by a spoken page name
pub fn find_destination(phrase: &str) -> Option<&'static Destination> {
    let phrase = phrase.trim();
    let phrase = phrase
        .strip_suffix(" page")
        .or_else(|| phrase.strip_suffix(" section"))
        .unwrap_or(phrase);
    let phrase = phrase.strip_prefix("the ").unwrap_or(phrase);
    DESTINATIONS.iter().find(|d| d.aliases.contains(&phrase))
}

pub fn destination_for_path(path: &str) -> Option<&'static Destination> {
    DESTINATIONS
        .iter()
        .find(|d| super::same_path(d.path, path))
}

fn navigate_to(destination: &Destination) -> Intent {
    Intent::navigate(destination.path, destination.name)
}

static SCROLL_TOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:scroll|go|jump|move|back)\s+(?:up\s+)?(?:to\s+)?(?:the\s+)?top\b|\btop\s+of\s+(?:the\s+)?page\b|^top$",
    )
    .unwrap()
});

static SCROLL_BOTTOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:scroll|go|jump|move)\s+(?:down\s+)?(?:to\s+)?(?:the\s+)?(?:bottom|end)\b|\b(?:bottom|end)\s+of\s+(?:the\s+)?page\b|^bottom$",
    )
    .unwrap()
});

static SCROLL_UP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bscroll(?:\s+(?:a\s+bit|a\s+little|more))?\s+up\b|\bpage\s+up\b|\bmove\s+up\b|^(?:go\s+)?up$",
    )
    .unwrap()
});

static SCROLL_DOWN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bscroll(?:\s+(?:a\s+bit|a\s+little|more))?\s+down\b|\bpage\s+down\b|\bmove\s+down\b|^(?:go\s+)?down$",
    )
    .unwrap()
});

static SIGNUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:sign\s*up|register|registration|join(?:\s+now|\s+us)?|create\s+(?:an?\s+)?account|new\s+account)\b",
    )
    .unwrap()
});

static LOGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:log\s*in|sign\s*in|signin)\b").unwrap());

static EXPLICIT_NAV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:please\s+)?(?:open|go\s+to|goto|show(?:\s+me)?|take\s+me\s+to|navigate\s+to|bring\s+me\s+to|visit)\s+(.+)$",
    )
    .unwrap()
});

pub fn match_scroll(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    // Top/bottom first: "scroll up to the top" is not a relative scroll
    let direction = if SCROLL_TOP.is_match(&u.text) {
        ScrollDirection::Top
    } else if SCROLL_BOTTOM.is_match(&u.text) {
        ScrollDirection::Bottom
    } else if SCROLL_UP.is_match(&u.text) {
        ScrollDirection::Up
    } else if SCROLL_DOWN.is_match(&u.text) {
        ScrollDirection::Down
    } else {
        return None;
    };
    Some(Intent::Scroll { direction })
}

pub fn match_auth_form(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    let form = if SIGNUP.is_match(&u.text) {
        AuthFormKind::Signup
    } else if LOGIN.is_match(&u.text) {
        AuthFormKind::Login
    } else {
        return None;
    };
    Some(Intent::OpenAuthForm { form })
}

pub fn match_explicit_page(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    let caps = EXPLICIT_NAV.captures(&u.text)?;
    let target = caps.get(1)?.as_str();
    find_destination(target).map(navigate_to)
}

pub fn match_bare_page(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    find_destination(&u.text).map(navigate_to)
}

const CONTROL_PHRASES: &[(&str, Intent)] = &[
    ("stop talking", Intent::StopSpeaking),
    ("stop speaking", Intent::StopSpeaking),
    ("stop reading", Intent::StopSpeaking),
    ("be quiet", Intent::StopSpeaking),
    ("silence", Intent::StopSpeaking),
    ("simplified mode", Intent::ToggleSimplifiedUi),
    ("simplified ui", Intent::ToggleSimplifiedUi),
    ("simplified view", Intent::ToggleSimplifiedUi),
    ("simple mode", Intent::ToggleSimplifiedUi),
    ("simplify", Intent::ToggleSimplifiedUi),
    ("reading mode", Intent::ToggleReadingMode),
    ("reader mode", Intent::ToggleReadingMode),
    ("read mode", Intent::ToggleReadingMode),
    ("previous page", Intent::GoBack),
    ("go back", Intent::GoBack),
    ("back", Intent::GoBack),
    ("next page", Intent::GoForward),
    ("go forward", Intent::GoForward),
    ("forward", Intent::GoForward),
];

/// Legacy phrases for history and display toggles
pub fn match_control_phrase(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    CONTROL_PHRASES
        .iter()
        .find(|(phrase, _)| has_phrase(&u.text, phrase))
        .map(|(_, intent)| intent.clone())
}

/// Any destination keyword anywhere in the transcript
pub fn match_destination_keyword(u: &Utterance<'_>, _: &ClassifyContext<'_>) -> Option<Intent> {
    DESTINATIONS
        .iter()
        .find(|d| d.keywords.iter().any(|k| has_phrase(&u.text, k)))
        .map(navigate_to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(matcher: crate::intent::rules::Matcher, text: &str) -> Option<Intent> {
        let utterance = Utterance::new(text);
        matcher(&utterance, &ClassifyContext::at("/"))
    }

    fn scroll(text: &str) -> Option<ScrollDirection> {
        match run(match_scroll, text)? {
            Intent::Scroll { direction } => Some(direction),
            _ => None,
        }
    }

    #[test]
    fn test_scroll_phrases() {
        assert_eq!(scroll("scroll down"), Some(ScrollDirection::Down));
        assert_eq!(scroll("scroll a bit up"), Some(ScrollDirection::Up));
        assert_eq!(scroll("page down"), Some(ScrollDirection::Down));
        assert_eq!(scroll("go to the top"), Some(ScrollDirection::Top));
        assert_eq!(scroll("scroll up to the top"), Some(ScrollDirection::Top));
        assert_eq!(scroll("bottom of the page"), Some(ScrollDirection::Bottom));
        assert_eq!(scroll("scroll to the end"), Some(ScrollDirection::Bottom));
        assert_eq!(scroll("download the syllabus"), None);
    }

    #[test]
    fn test_auth_form_synonyms() {
        let form = |text| match run(match_auth_form, text) {
            Some(Intent::OpenAuthForm { form }) => Some(form),
            _ => None,
        };
        assert_eq!(form("log in"), Some(AuthFormKind::Login));
        assert_eq!(form("login please"), Some(AuthFormKind::Login));
        assert_eq!(form("sign in"), Some(AuthFormKind::Login));
        assert_eq!(form("sign up"), Some(AuthFormKind::Signup));
        assert_eq!(form("i want to register"), Some(AuthFormKind::Signup));
        assert_eq!(form("join"), Some(AuthFormKind::Signup));
        assert_eq!(form("create an account"), Some(AuthFormKind::Signup));
        assert_eq!(form("design in progress"), None);
        assert_eq!(form("log out"), None);
    }

    #[test]
    fn test_explicit_and_bare_pages() {
        assert_eq!(
            run(match_explicit_page, "take me to the courses page"),
            Some(Intent::navigate("/courses", "courses"))
        );
        assert_eq!(
            run(match_explicit_page, "show me my profile"),
            Some(Intent::navigate("/profile", "profile"))
        );
        assert_eq!(run(match_explicit_page, "open sesame"), None);
        assert_eq!(
            run(match_bare_page, "home"),
            Some(Intent::navigate("/", "home"))
        );
        assert_eq!(run(match_bare_page, "home sweet home"), None);
    }

    #[test]
    fn test_fallback_keywords() {
        assert_eq!(run(match_control_phrase, "stop talking"), Some(Intent::StopSpeaking));
        assert_eq!(run(match_control_phrase, "go back"), Some(Intent::GoBack));
        assert_eq!(run(match_control_phrase, "feedback"), None);
        assert_eq!(
            run(match_control_phrase, "turn on reading mode"),
            Some(Intent::ToggleReadingMode)
        );
        assert_eq!(
            run(match_destination_keyword, "i want to see some classes"),
            Some(Intent::navigate("/courses", "courses"))
        );
    }

    #[test]
    fn test_destination_for_path() {
        assert_eq!(destination_for_path("/courses/").map(|d| d.name), Some("courses"));
        assert_eq!(destination_for_path("/nowhere"), None);
    }
}
