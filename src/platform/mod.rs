//! Platform backends
//!
//! Bundles the four native capabilities the service depends on and picks the
//! implementations available on the host.

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

use crate::audio::{AudioRecorder, RecordingSettings, StartedRecording};
use crate::config::Config;
use crate::error::PermissionKind;
use crate::permissions::{PermissionBackend, PermissionStatus};
use crate::synthesis::{SpeechSynthesizer, Utterance};
use crate::transcription::{RecognitionStream, SpeechRecognizer};
use anyhow::anyhow;
use futures_util::future::BoxFuture;
use std::path::Path;
use std::sync::Arc;

/// Native capabilities used by [`crate::SpeechService`]
#[derive(Clone)]
pub struct Backends {
    pub permissions: Arc<dyn PermissionBackend>,
    pub recorder: Arc<dyn AudioRecorder>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

/// Backends for the current host
pub fn native(config: &Config) -> Backends {
    Backends {
        permissions: permission_backend(config),
        recorder: recorder_backend(),
        recognizer: recognizer_backend(config),
        synthesizer: synthesizer_backend(),
    }
}

fn permission_backend(config: &Config) -> Arc<dyn PermissionBackend> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::MacPermissions::new(config.permissions.poll_timeout()))
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = config;
        Arc::new(GrantedPermissions) // No permission prompts on other platforms
    }
}

fn recorder_backend() -> Arc<dyn AudioRecorder> {
    #[cfg(feature = "capture")]
    {
        Arc::new(crate::audio::CpalRecorder::new())
    }
    #[cfg(not(feature = "capture"))]
    {
        Arc::new(UnsupportedRecorder)
    }
}

fn recognizer_backend(config: &Config) -> Arc<dyn SpeechRecognizer> {
    #[cfg(feature = "whisper")]
    {
        let recognizer: Arc<dyn SpeechRecognizer> = match config.recognition.whisper_model.as_deref() {
            Some(model) => Arc::new(crate::transcription::WhisperRecognizer::new(model)),
            None => {
                tracing::warn!("Platform: no whisper model configured, recognition disabled");
                Arc::new(UnsupportedRecognizer)
            }
        };
        recognizer
    }
    #[cfg(not(feature = "whisper"))]
    {
        let _ = config;
        Arc::new(UnsupportedRecognizer)
    }
}

fn synthesizer_backend() -> Arc<dyn SpeechSynthesizer> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::SaySynthesizer::new())
    }
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::SpdSaySynthesizer)
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Arc::new(UnsupportedSynthesizer)
    }
}

/// Wait for a fire-and-forget child on a background thread
#[cfg(any(target_os = "macos", target_os = "linux"))]
fn reap(mut child: std::process::Child) {
    std::thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => {
            tracing::warn!("Speech process exited with {}", status);
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to wait for speech process: {}", e),
    });
}

/// Grants every request; for hosts without runtime permission prompts
pub struct GrantedPermissions;

impl PermissionBackend for GrantedPermissions {
    fn request(&self, kind: PermissionKind) -> BoxFuture<'static, anyhow::Result<PermissionStatus>> {
        tracing::debug!("Platform: {} permission implicitly granted", kind);
        Box::pin(async { Ok(PermissionStatus::Granted) })
    }
}

pub struct UnsupportedRecorder;

impl AudioRecorder for UnsupportedRecorder {
    fn start(&self, _path: &Path, _settings: &RecordingSettings) -> anyhow::Result<StartedRecording> {
        Err(anyhow!(
            "audio recording is not available in this build (enable the `capture` feature)"
        ))
    }
}

pub struct UnsupportedRecognizer;

impl SpeechRecognizer for UnsupportedRecognizer {
    fn recognize(&self, _audio: &Path, _locale: &str) -> anyhow::Result<RecognitionStream> {
        Err(anyhow!("speech recognition is not available on this platform"))
    }
}

pub struct UnsupportedSynthesizer;

impl SpeechSynthesizer for UnsupportedSynthesizer {
    fn speak(&self, _utterance: &Utterance) -> anyhow::Result<()> {
        Err(anyhow!("speech synthesis is not available on this platform"))
    }
}
