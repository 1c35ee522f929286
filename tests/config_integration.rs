//! Configuration system integration tests.
//!
//! Exercises loading, saving, and migration against temporary files so the
//! real `~/.speech-bridge/config.json` is never touched.

use speech_bridge::audio::{AudioFormat, EncoderQuality};
use speech_bridge::config::{load_from_path, save_to_path, Config};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn temp_config_path() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    (dir, path)
}

#[test]
fn test_missing_file_yields_defaults() {
    let (_dir, path) = temp_config_path();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.speech.rate, 0.5);
    assert_eq!(config.recording.format, AudioFormat::default());
    assert!(config.recording.file_name.starts_with("recording."));
    assert!(!path.exists());
}

#[test]
fn test_save_and_reload() {
    let (_dir, path) = temp_config_path();

    let mut config = Config::default();
    config.speech.rate = 0.75;
    config.recording.format = AudioFormat::Wav;
    config.recording.file_name = "dictation.wav".to_string();
    config.recording.quality = EncoderQuality::Medium;
    config.recognition.timeout_secs = 15;
    config.recognition.whisper_model = Some("/models/ggml-base.bin".to_string());
    save_to_path(&config, &path).unwrap();

    let loaded = load_from_path(&path).unwrap();
    assert_eq!(loaded.speech.rate, 0.75);
    assert_eq!(loaded.recording.format, AudioFormat::Wav);
    assert_eq!(loaded.recording.file_name, "dictation.wav");
    assert_eq!(loaded.recording.quality, EncoderQuality::Medium);
    assert_eq!(loaded.recognition.timeout(), Duration::from_secs(15));
    assert_eq!(
        loaded.recognition.whisper_model.as_deref(),
        Some("/models/ggml-base.bin")
    );
}

#[test]
fn test_save_creates_parent_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    save_to_path(&Config::default(), &path).unwrap();
    assert!(path.exists());
}

#[test]
fn test_unversioned_file_is_migrated_and_rewritten() {
    let (_dir, path) = temp_config_path();
    fs::write(&path, r#"{"version": 0, "speech": {"rate": 0.3}}"#).unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.version, 1);
    assert_eq!(config.speech.rate, 0.3);

    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["version"], 1);
}

#[test]
fn test_newer_version_is_loaded_unchanged() {
    let (_dir, path) = temp_config_path();
    fs::write(&path, r#"{"version": 7}"#).unwrap();
    assert_eq!(load_from_path(&path).unwrap().version, 7);
}

#[test]
fn test_malformed_file_is_an_error() {
    let (_dir, path) = temp_config_path();
    fs::write(&path, "{ not json").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(err.contains("Failed to parse config"));
}

#[test]
fn test_saved_file_uses_snake_case_enums() {
    let (_dir, path) = temp_config_path();
    save_to_path(&Config::default(), &path).unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    let format = serde_json::to_string(&AudioFormat::default()).unwrap();
    assert!(contents.contains(&format));
    assert!(contents.contains("\"high\""));
}
