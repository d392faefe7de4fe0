//! Transcript to intent classification
//!
//! Each recognition mode has its own classifier built from an ordered
//! [`RuleSet`]. Rules are evaluated top to bottom and the first match wins,
//! so phrases that are substrings of others must be listed later.

pub mod auth;
pub mod navigation;
pub mod profile;
pub mod rules;
pub mod vocabulary;

pub use auth::{normalize_field_value, VoiceAuthClassifier, VoiceAuthFieldState};
pub use navigation::NavigationClassifier;
pub use profile::ProfileClassifier;
pub use rules::{normalize_transcript, ClassifyContext, Rule, RuleSet, Utterance};

use serde::{Deserialize, Serialize};

/// Scroll target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

/// Which auth modal to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthFormKind {
    Login,
    Signup,
}

impl AuthFormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFormKind::Login => "login",
            AuthFormKind::Signup => "signup",
        }
    }
}

/// Sections of the profile page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileTab {
    Overview,
    Courses,
    Progress,
    Settings,
}

impl ProfileTab {
    pub const ALL: [ProfileTab; 4] = [
        ProfileTab::Overview,
        ProfileTab::Courses,
        ProfileTab::Progress,
        ProfileTab::Settings,
    ];

    /// Position of the tab in the profile page
    pub fn index(&self) -> usize {
        match self {
            ProfileTab::Overview => 0,
            ProfileTab::Courses => 1,
            ProfileTab::Progress => 2,
            ProfileTab::Settings => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProfileTab::Overview => "overview",
            ProfileTab::Courses => "courses",
            ProfileTab::Progress => "progress",
            ProfileTab::Settings => "settings",
        }
    }
}

/// A classified voice command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Navigate { path: String, page: String },
    /// Navigation target is the current page
    AlreadyOnPage { path: String, page: String },
    Scroll { direction: ScrollDirection },
    OpenAuthForm { form: AuthFormKind },
    SwitchProfileTab { tab: ProfileTab },
    /// First phase of voice form filling: select the input
    FocusField { field_id: String, label: String },
    /// Second phase: write the captured value
    FillField { field_id: String, value: String },
    Submit,
    Cancel,
    Logout,
    OpenAdmin { required_role: String },
    GoBack,
    GoForward,
    ToggleSimplifiedUi,
    ToggleReadingMode,
    StopSpeaking,
}

impl Intent {
    pub fn navigate(path: &str, page: &str) -> Self {
        Intent::Navigate {
            path: path.to_string(),
            page: page.to_string(),
        }
    }

    /// Short name for logging
    pub fn kind_name(&self) -> &'static str {
        match self {
            Intent::Navigate { .. } => "navigate",
            Intent::AlreadyOnPage { .. } => "already_on_page",
            Intent::Scroll { .. } => "scroll",
            Intent::OpenAuthForm { .. } => "open_auth_form",
            Intent::SwitchProfileTab { .. } => "switch_profile_tab",
            Intent::FocusField { .. } => "focus_field",
            Intent::FillField { .. } => "fill_field",
            Intent::Submit => "submit",
            Intent::Cancel => "cancel",
            Intent::Logout => "logout",
            Intent::OpenAdmin { .. } => "open_admin",
            Intent::GoBack => "go_back",
            Intent::GoForward => "go_forward",
            Intent::ToggleSimplifiedUi => "toggle_simplified_ui",
            Intent::ToggleReadingMode => "toggle_reading_mode",
            Intent::StopSpeaking => "stop_speaking",
        }
    }

    /// Turn a navigation to the current page into `AlreadyOnPage`
    pub fn resolve_against(self, current_path: &str) -> Self {
        match self {
            Intent::Navigate { path, page } if same_path(&path, current_path) => {
                Intent::AlreadyOnPage { path, page }
            }
            other => other,
        }
    }
}

/// Compare router paths ignoring query, fragment and trailing slash
pub fn same_path(a: &str, b: &str) -> bool {
    fn clean(path: &str) -> &str {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }
    clean(a) == clean(b)
}
