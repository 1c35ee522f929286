//! Configuration management
//!
//! Settings live in `~/.speech-bridge/config.json`, carry a schema version,
//! and are cached in memory after the first load. Every section uses
//! `serde(default)` so partial files keep working across upgrades.

use crate::audio::{AudioFormat, EncoderQuality, RecordingSettings};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    pub speech: SpeechConfig,
    pub recording: RecordingConfig,
    pub recognition: RecognitionConfig,
    pub permissions: PermissionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            speech: SpeechConfig::default(),
            recording: RecordingConfig::default(),
            recognition: RecognitionConfig::default(),
            permissions: PermissionConfig::default(),
        }
    }
}

/// Text-to-speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speaking rate, 0.0 (slowest) to 1.0 (fastest)
    pub rate: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: crate::synthesis::DEFAULT_RATE,
        }
    }
}

/// Audio artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// File name inside the documents directory; overwritten on every recording.
    /// The extension is replaced to match `format`.
    pub file_name: String,
    pub format: AudioFormat,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub channels: u16,
    pub quality: EncoderQuality,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let settings = RecordingSettings::default();
        Self {
            file_name: format!("recording.{}", settings.format.extension()),
            format: settings.format,
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            quality: settings.quality,
        }
    }
}

impl RecordingConfig {
    pub fn settings(&self) -> RecordingSettings {
        RecordingSettings {
            format: self.format,
            sample_rate: self.sample_rate,
            channels: self.channels,
            quality: self.quality,
        }
    }
}

/// Speech recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Give up on a recognition request after this many seconds
    pub timeout_secs: u64,
    /// ggml model file for the whisper recognizer
    pub whisper_model: Option<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            whisper_model: None,
        }
    }
}

impl RecognitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Permission prompt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// How long to wait for the user to answer a system permission prompt
    pub poll_timeout_secs: u64,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
        }
    }
}

impl PermissionConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

/// Get the path to the config directory (~/.speech-bridge)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".speech-bridge")
}

/// Get the path to the config file (~/.speech-bridge/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load and migrate a config file, using defaults when it does not exist
pub fn load_from_path(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        tracing::info!("Config file not found, using defaults");
        return Ok(Config::default());
    }

    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

    let config: Config =
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse config: {}", e))?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;

    if migrated.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            migrated.version
        );
        save_to_path(&migrated, path)?;
    }

    Ok(migrated)
}

/// Write a config file, creating its directory if needed
pub fn save_to_path(config: &Config, path: &Path) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialise config: {}", e))?;

    fs::write(path, contents).map_err(|e| format!("Failed to write config file: {}", e))?;

    tracing::info!("Config saved to {}", path.display());
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, String> {
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }
    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, String> {
    match config.version {
        // Version 0 -> 1: pre-release files had no version field
        0 => {
            let mut migrated = config;
            migrated.version = 1;
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

// --- IPC Commands ---

/// Get the current configuration
#[cfg_attr(feature = "tauri", tauri::command)]
pub fn get_config() -> Result<Config, String> {
    Ok(get_config_instance().read().clone())
}

/// Replace the configuration and persist it
///
/// Takes effect for services created after the call; a running service keeps
/// the settings it was built with.
#[cfg_attr(feature = "tauri", tauri::command)]
pub fn set_config(mut config: Config) -> Result<(), String> {
    config.version = CURRENT_VERSION;
    save_to_path(&config, &get_config_path())?;

    *get_config_instance().write() = config;
    tracing::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults and persist it
#[cfg_attr(feature = "tauri", tauri::command)]
pub fn reset_config() -> Result<Config, String> {
    let default_config = Config::default();
    save_to_path(&default_config, &get_config_path())?;

    *get_config_instance().write() = default_config.clone();
    tracing::info!("Configuration reset to defaults");
    Ok(default_config)
}

/// Path of the config file, for display
#[cfg_attr(feature = "tauri", tauri::command)]
pub fn get_config_path_cmd() -> String {
    get_config_path().to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_current_version() {
        assert_eq!(Config::default().version, CURRENT_VERSION);
    }

    #[test]
    fn test_recording_defaults() {
        let recording = RecordingConfig::default();
        assert_eq!(
            recording.file_name,
            format!("recording.{}", recording.format.extension())
        );
        assert_eq!(recording.format, AudioFormat::default());
        assert_eq!(recording.sample_rate, 12_000);
        assert_eq!(recording.channels, 1);
        assert_eq!(recording.settings(), RecordingSettings::default());
    }

    #[test]
    fn test_speech_and_recognition_defaults() {
        let config = Config::default();
        assert_eq!(config.speech.rate, 0.5);
        assert_eq!(config.recognition.timeout(), Duration::from_secs(60));
        assert!(config.recognition.whisper_model.is_none());
        assert_eq!(config.permissions.poll_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let recognition = RecognitionConfig {
            timeout_secs: 0,
            whisper_model: None,
        };
        assert_eq!(recognition.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_config_deserialisation() {
        let json = r#"{"version": 1, "recording": {"format": "wav", "sample_rate": 16000}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.recording.format, AudioFormat::Wav);
        assert_eq!(config.recording.sample_rate, 16000);
        assert_eq!(config.recording.channels, 1);
        assert_eq!(config.speech.rate, 0.5);
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let json = r#"{"version": 1, "unknown_field": true, "speech": {"rate": 0.7, "extra": 1}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.speech.rate, 0.7);
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
    fn test_apply_migration_unknown_version() {
        let future_config = Config {
            version: 999,
            ..Default::default()
        };
        let result = apply_migration(future_config);
        assert!(result.unwrap_err().contains("Unknown config version"));
    }

    #[test]
    fn test_config_path_format() {
        let path = get_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.contains(".speech-bridge"));
        assert!(path_str.ends_with("config.json"));
    }
}
