//! Configuration management for coursevox
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.coursevox/config.json`. The accessibility
//! section is owned by the host's settings store; the voice layer only reads it.

use crate::shortcuts::ShortcutAction;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 2;

/// Environment variable that overrides the stored remote synthesis key
pub const API_KEY_ENV: &str = "COURSEVOX_TTS_API_KEY";

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Speech recognition and command timing
    pub recognition: RecognitionConfig,
    /// Speech output settings
    pub speech: SpeechConfig,
    /// Initial state of the voice toggles
    pub voice: VoiceConfig,
    /// Accessibility settings consumed as read-only gates
    pub accessibility: AccessibilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            recognition: RecognitionConfig::default(),
            speech: SpeechConfig::default(),
            voice: VoiceConfig::default(),
            accessibility: AccessibilityConfig::default(),
        }
    }
}

/// Recognition thresholds and lifecycle delays
///
/// The defaults are empirically chosen; keep them configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// BCP-47 language tag passed to the recognition backend
    pub language: String,
    /// Minimum confidence for navigation commands
    pub navigation_threshold: f32,
    /// Minimum confidence for profile-page commands
    pub profile_threshold: f32,
    /// Minimum confidence for voice-auth field capture
    pub voice_auth_threshold: f32,
    /// Window after an executed command during which results are ignored
    pub command_cooldown_ms: u64,
    /// Delay before restarting after the platform ends a session on silence
    pub end_restart_delay_ms: u64,
    /// Delay before restarting after a transient error
    pub error_restart_delay_ms: u64,
    /// Delay before the liveness check that follows a route change
    pub route_restart_delay_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            navigation_threshold: 0.3,
            profile_threshold: 0.3,
            voice_auth_threshold: 0.5,
            command_cooldown_ms: 1000,
            end_restart_delay_ms: 300,
            error_restart_delay_ms: 1000,
            route_restart_delay_ms: 100,
        }
    }
}

impl RecognitionConfig {
    pub fn command_cooldown(&self) -> Duration {
        Duration::from_millis(self.command_cooldown_ms)
    }

    /// Check thresholds are probabilities
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("navigation_threshold", self.navigation_threshold),
            ("profile_threshold", self.profile_threshold),
            ("voice_auth_threshold", self.voice_auth_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0.0 and 1.0, got {}", name, value));
            }
        }
        Ok(())
    }
}

/// Speech output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether to try remote synthesis before local synthesis
    pub remote_enabled: bool,
    /// Remote synthesis endpoint
    pub remote_endpoint: String,
    /// API key for remote synthesis (None skips the network entirely)
    pub api_key: Option<String>,
    /// Remote voice identifier
    pub voice_id: String,
    /// Remote request timeout in seconds
    pub timeout_secs: u64,
    /// Local voices to prefer, in rank order
    pub preferred_voices: Vec<String>,
    /// Name fragments of local voices that are skipped by the English fallback
    pub excluded_voices: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            remote_enabled: true,
            remote_endpoint: "https://api.murf.ai/v1/speech/generate".to_string(),
            api_key: None,
            voice_id: "en-US-marcus".to_string(),
            timeout_secs: 15,
            preferred_voices: vec![
                "Google UK English Male".to_string(),
                "Microsoft David".to_string(),
                "Daniel".to_string(),
                "Alex".to_string(),
                "Fred".to_string(),
            ],
            excluded_voices: vec![
                "female".to_string(),
                "samantha".to_string(),
                "victoria".to_string(),
                "karen".to_string(),
                "zira".to_string(),
                "susan".to_string(),
                "moira".to_string(),
                "tessa".to_string(),
                "fiona".to_string(),
            ],
        }
    }
}

impl SpeechConfig {
    /// API key from the environment, falling back to the stored key
    pub fn effective_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }

    /// Parse the remote endpoint
    pub fn endpoint_url(&self) -> Result<url::Url, String> {
        url::Url::parse(&self.remote_endpoint)
            .map_err(|e| format!("Invalid remote endpoint '{}': {}", self.remote_endpoint, e))
    }
}

/// Initial state of the live voice toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Global voice-control toggle
    pub voice_control_enabled: bool,
    /// Voice-auth toggle (forced on when a login/signup form opens)
    pub voice_auth_enabled: bool,
    /// Spoken feedback and hover speech
    pub tts_enabled: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_control_enabled: false,
            voice_auth_enabled: false,
            tts_enabled: true,
        }
    }
}

/// Accessibility settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessibilityConfig {
    /// Whether keyboard shortcuts are handled at all
    pub keyboard_shortcuts_enabled: bool,
    /// User overrides, chord to action (e.g. "Ctrl+Shift+V" -> toggle_voice_control)
    pub custom_shortcuts: BTreeMap<String, ShortcutAction>,
    /// Replace smooth scrolling with instant jumps
    pub reduced_motion: bool,
}

impl Default for AccessibilityConfig {
    fn default() -> Self {
        Self {
            keyboard_shortcuts_enabled: true,
            custom_shortcuts: BTreeMap::new(),
            reduced_motion: false,
        }
    }
}

/// Get the path to the config file (~/.coursevox/config.json)
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the data directory (~/.coursevox)
pub fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| {
            tracing::error!("Could not determine home directory, using /tmp");
            PathBuf::from("/tmp")
        })
        .join(".coursevox")
}

/// Load configuration from a file, running migrations
///
/// A missing file yields the defaults.
pub fn load_from_path(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

    let config: Config =
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse config: {}", e))?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to_path(&migrated, path)?;
    }

    Ok(migrated)
}

/// Save configuration to a file, creating parent directories
pub fn save_to_path(config: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialise config: {}", e))?;

    fs::write(path, contents).map_err(|e| format!("Failed to write config file: {}", e))?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, String> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, String> {
    match config.version {
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        // Version 1 shared one threshold across modes; voice-auth gets its own
        1 => {
            let mut migrated = config;
            migrated.recognition.voice_auth_threshold = migrated
                .recognition
                .voice_auth_threshold
                .max(RecognitionConfig::default().voice_auth_threshold);
            migrated.version = 2;
            Ok(migrated)
        }
        v => Err(format!("Unknown config version: {}", v)),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| {
        let config = load_from_path(&get_config_path()).unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        });
        RwLock::new(config)
    })
}

/// Get the current configuration
pub fn get_config() -> Config {
    get_config_instance().read().clone()
}

/// Replace the configuration and persist it
pub fn set_config(mut config: Config) -> Result<(), String> {
    config.version = CURRENT_VERSION;
    config.recognition.validate()?;

    save_to_path(&config, &get_config_path())?;
    *get_config_instance().write() = config;

    tracing::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults and persist
pub fn reset_config() -> Result<Config, String> {
    let default_config = Config::default();
    save_to_path(&default_config, &get_config_path())?;
    *get_config_instance().write() = default_config.clone();

    tracing::info!("Configuration reset to defaults");
    Ok(default_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_current_version() {
        let config = Config::default();
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_recognition_defaults() {
        let recognition = RecognitionConfig::default();
        assert_eq!(recognition.navigation_threshold, 0.3);
        assert_eq!(recognition.profile_threshold, 0.3);
        assert_eq!(recognition.voice_auth_threshold, 0.5);
        assert_eq!(recognition.command_cooldown(), Duration::from_millis(1000));
        assert_eq!(recognition.route_restart_delay_ms, 100);
        assert!(recognition.validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let recognition = RecognitionConfig {
            voice_auth_threshold: 1.5,
            ..Default::default()
        };
        let err = recognition.validate().unwrap_err();
        assert!(err.contains("voice_auth_threshold"));
    }

    #[test]
    fn test_partial_config_deserialisation() {
        let json = r#"{"version": 2, "speech": {"voice_id": "en-GB-ruby"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.speech.voice_id, "en-GB-ruby");
        assert!(config.speech.remote_enabled);
        assert_eq!(config.recognition.language, "en-US");
        assert!(config.accessibility.keyboard_shortcuts_enabled);
    }

    #[test]
    fn test_custom_shortcuts_deserialise() {
        let json =
            r#"{"accessibility": {"custom_shortcuts": {"Ctrl+Shift+V": "toggle_voice_control"}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.accessibility.custom_shortcuts.get("Ctrl+Shift+V"),
            Some(&ShortcutAction::ToggleVoiceControl)
        );
    }

    #[test]
    fn test_migration_from_version_0() {
        let old_config = Config {
            version: 0,
            ..Default::default()
        };

        let migrated = migrate_config(old_config).unwrap();
        assert_eq!(migrated.version, CURRENT_VERSION);
    }

    #[test]
    fn test_migration_raises_low_voice_auth_threshold() {
        let mut old_config = Config {
            version: 1,
            ..Default::default()
        };
        old_config.recognition.voice_auth_threshold = 0.3;

        let migrated = migrate_config(old_config).unwrap();
        assert_eq!(migrated.recognition.voice_auth_threshold, 0.5);
    }

    #[test]
    fn test_apply_migration_unknown_version() {
        let future_config = Config {
            version: 999,
            ..Default::default()
        };

        let result = apply_migration(future_config);
        assert!(result.unwrap_err().contains("Unknown config version"));
    }

    #[test]
    fn test_endpoint_url_parses() {
        let speech = SpeechConfig::default();
        let url = speech.endpoint_url().unwrap();
        assert_eq!(url.scheme(), "https");

        let broken = SpeechConfig {
            remote_endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(broken.endpoint_url().is_err());
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let speech = SpeechConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        if std::env::var(API_KEY_ENV).is_err() {
            assert!(speech.effective_api_key().is_none());
        }
    }

    #[test]
    fn test_config_path_format() {
        let path = get_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains(".coursevox"));
        assert!(path_str.ends_with("config.json"));
    }
}
