//! Host application interfaces
//!
//! The voice layer drives the surrounding web application only through these
//! traits. Implementations live with the host (or in [`crate::console`] for
//! the terminal harness).

use crate::error::DispatchError;
use crate::events::EventBus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Client-side router
pub trait Router: Send + Sync {
    fn navigate(&self, path: &str);
    fn back(&self);
    fn forward(&self);
    fn current_path(&self) -> String;
}

/// How a scroll is animated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// Scrollable viewport
pub trait Viewport: Send + Sync {
    /// Visible height in CSS pixels
    fn viewport_height(&self) -> f64;
    /// Relative scroll; positive is down
    fn scroll_by(&self, delta: f64, behavior: ScrollBehavior);
    fn scroll_to_top(&self, behavior: ScrollBehavior);
    fn scroll_to_bottom(&self, behavior: ScrollBehavior);
}

/// Kind of form input, used to pick a value normaliser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Email,
    Password,
    Name,
    Text,
}

impl FieldKind {
    /// Guess the kind from an input id such as `confirmPassword`
    pub fn infer(id: &str) -> Self {
        let id = id.to_ascii_lowercase();
        if id.contains("email") || id.contains("mail") {
            FieldKind::Email
        } else if id.contains("password") || id.contains("passwd") {
            FieldKind::Password
        } else if id.contains("name") {
            FieldKind::Name
        } else {
            FieldKind::Text
        }
    }

    /// Spoken synonyms accepted when selecting a field of this kind
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            FieldKind::Email => &["email address", "email", "e-mail", "e mail", "mail"],
            FieldKind::Password => &["password", "pass word", "passcode"],
            FieldKind::Name => &["full name", "username", "user name", "name"],
            FieldKind::Text => &[],
        }
    }
}

/// An input currently rendered in the open form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    /// Spoken label, lower-case (e.g. "confirm password")
    pub label: String,
    pub kind: FieldKind,
}

impl FormField {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let id = id.into();
        let kind = FieldKind::infer(&id);
        Self {
            id,
            label: label.into().to_lowercase(),
            kind,
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Form-binding convention
///
/// `set_value` must both set the input's value and notify the host's
/// reactive bindings (input and change notifications) so validation runs.
pub trait FormBinding: Send + Sync {
    fn rendered_fields(&self) -> Vec<FormField>;
    fn focus(&self, field_id: &str) -> Result<(), DispatchError>;
    fn set_value(&self, field_id: &str, value: &str) -> Result<(), DispatchError>;
}

/// Host callbacks for auth and account actions
pub trait HostActions: Send + Sync {
    fn submit(&self) -> Result<(), DispatchError>;
    fn cancel(&self) -> Result<(), DispatchError>;
    fn logout(&self) -> Result<(), DispatchError>;
    fn open_admin(&self) -> Result<(), DispatchError>;
    /// Role of the signed-in user, if any
    fn user_role(&self) -> Option<String>;
}

/// Bundle of host collaborators
#[derive(Clone)]
pub struct Host {
    pub router: Arc<dyn Router>,
    pub viewport: Arc<dyn Viewport>,
    pub forms: Arc<dyn FormBinding>,
    pub actions: Arc<dyn HostActions>,
    pub events: EventBus,
}
