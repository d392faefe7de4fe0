//! Accessibility keyboard shortcuts
//!
//! Maps key chords such as `Alt+V` to voice and display actions. User
//! overrides from the accessibility settings replace the defaults chord by
//! chord.

use crate::config::AccessibilityConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Action bound to a chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortcutAction {
    ToggleVoiceControl,
    ToggleSpeech,
    StopSpeaking,
    ToggleSimplifiedUi,
    ToggleReadingMode,
    ToggleVoiceAuth,
}

impl ShortcutAction {
    pub fn description(&self) -> &'static str {
        match self {
            ShortcutAction::ToggleVoiceControl => "Toggle voice control",
            ShortcutAction::ToggleSpeech => "Toggle spoken feedback",
            ShortcutAction::StopSpeaking => "Stop speaking",
            ShortcutAction::ToggleSimplifiedUi => "Toggle simplified interface",
            ShortcutAction::ToggleReadingMode => "Toggle reading mode",
            ShortcutAction::ToggleVoiceAuth => "Toggle voice login",
        }
    }
}

/// Default bindings
pub const DEFAULT_SHORTCUTS: &[(&str, ShortcutAction)] = &[
    ("Alt+V", ShortcutAction::ToggleVoiceControl),
    ("Alt+S", ShortcutAction::ToggleSpeech),
    ("Escape", ShortcutAction::StopSpeaking),
    ("Alt+M", ShortcutAction::ToggleSimplifiedUi),
    ("Alt+R", ShortcutAction::ToggleReadingMode),
    ("Alt+A", ShortcutAction::ToggleVoiceAuth),
];

const MODIFIER_ORDER: [&str; 4] = ["Ctrl", "Alt", "Shift", "Meta"];

fn canonical_modifier(part: &str) -> Option<&'static str> {
    match part.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => Some("Ctrl"),
        "alt" | "option" => Some("Alt"),
        "shift" => Some("Shift"),
        "meta" | "cmd" | "command" | "super" | "win" => Some("Meta"),
        _ => None,
    }
}

fn canonical_key(part: &str) -> String {
    match part.to_ascii_lowercase().as_str() {
        "esc" | "escape" => "Escape".to_string(),
        "space" | "spacebar" => "Space".to_string(),
        "enter" | "return" => "Enter".to_string(),
        "tab" => "Tab".to_string(),
        key if key.chars().count() == 1 => key.to_ascii_uppercase(),
        key => {
            let mut chars = key.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

/// Canonical chord text: modifiers in Ctrl, Alt, Shift, Meta order, then the key
///
/// # Returns
/// * `Ok(String)` with the normalised chord
/// * `Err(String)` describing the format issue
pub fn normalize_chord(chord: &str) -> Result<String, String> {
    let chord = chord.trim();
    if chord.is_empty() {
        return Err("Shortcut cannot be empty.".to_string());
    }
    if chord.starts_with('+') || chord.ends_with('+') {
        return Err("Shortcut cannot start or end with '+'.".to_string());
    }
    if chord.contains("++") {
        return Err("Shortcut contains empty key parts.".to_string());
    }

    let mut modifiers = Vec::new();
    let mut key = None;
    for part in chord.split('+').map(str::trim) {
        if part.is_empty() {
            return Err("Shortcut contains empty key parts.".to_string());
        }
        if let Some(modifier) = canonical_modifier(part) {
            if !modifiers.contains(&modifier) {
                modifiers.push(modifier);
            }
        } else if key.is_some() {
            return Err(format!("Shortcut '{}' has more than one key.", chord));
        } else {
            key = Some(canonical_key(part));
        }
    }

    let key = key.ok_or_else(|| format!("Shortcut '{}' has no key.", chord))?;
    modifiers.sort_by_key(|m| MODIFIER_ORDER.iter().position(|o| o == m));

    let mut parts: Vec<String> = modifiers.into_iter().map(str::to_string).collect();
    parts.push(key);
    Ok(parts.join("+"))
}

/// Resolved chord table
#[derive(Debug, Clone)]
pub struct ShortcutMap {
    enabled: bool,
    bindings: BTreeMap<String, ShortcutAction>,
}

impl Default for ShortcutMap {
    fn default() -> Self {
        Self::from_config(&AccessibilityConfig::default())
    }
}

impl ShortcutMap {
    /// Defaults overlaid with the user's custom shortcuts
    ///
    /// A custom binding for an action removes that action's default chord.
    /// Invalid chords are logged and skipped.
    pub fn from_config(config: &AccessibilityConfig) -> Self {
        let mut bindings: BTreeMap<String, ShortcutAction> = DEFAULT_SHORTCUTS
            .iter()
            .map(|(chord, action)| (chord.to_string(), *action))
            .collect();

        for (chord, action) in &config.custom_shortcuts {
            match normalize_chord(chord) {
                Ok(chord) => {
                    bindings.retain(|_, bound| *bound != *action);
                    bindings.insert(chord, *action);
                }
                Err(e) => tracing::warn!("Ignoring custom shortcut for {:?}: {}", action, e),
            }
        }

        Self {
            enabled: config.keyboard_shortcuts_enabled,
            bindings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Action for a pressed chord, if shortcuts are enabled and it is bound
    pub fn resolve(&self, chord: &str) -> Option<ShortcutAction> {
        if !self.enabled {
            return None;
        }
        let chord = normalize_chord(chord).ok()?;
        self.bindings.get(&chord).copied()
    }

    /// Chord currently bound to an action
    pub fn chord_for(&self, action: ShortcutAction) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(_, bound)| **bound == action)
            .map(|(chord, _)| chord.as_str())
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, ShortcutAction)> {
        self.bindings.iter().map(|(chord, action)| (chord.as_str(), *action))
    }
}
