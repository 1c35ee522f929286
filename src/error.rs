//! Error taxonomy for speech invocations
//!
//! Every variant renders as the short reason string handed back to the
//! caller in an `ERROR` result envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two authorisations required before `listen` may record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// Microphone access
    Recording,
    /// Speech recognition access
    Transcription,
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionKind::Recording => write!(f, "Recording"),
            PermissionKind::Transcription => write!(f, "Transcription"),
        }
    }
}

/// Failure reasons delivered through the bridge
#[derive(Debug, Error)]
pub enum SpeechError {
    /// A required positional argument was absent, empty, or not a string
    #[error("Missing {0} argument")]
    MissingArgument(&'static str),

    #[error("{0} permission denied")]
    PermissionDenied(PermissionKind),

    /// The recorder could not be opened or stopped abnormally
    #[error("Failed to record: {0}")]
    RecordingFailure(String),

    /// The recognizer errored or never produced a final result
    #[error("Recognition failed: {0}")]
    RecognitionFailure(String),

    #[error("Locale not set")]
    LocaleNotSet,

    /// The synthesis engine refused the utterance
    #[error("Failed to speak: {0}")]
    SynthesisFailure(String),
}

impl SpeechError {
    /// Wrap a backend error as a recording failure, keeping the full cause chain
    pub fn recording(err: anyhow::Error) -> Self {
        Self::RecordingFailure(format!("{:#}", err))
    }

    /// Wrap a backend error as a recognition failure
    pub fn recognition(err: anyhow::Error) -> Self {
        Self::RecognitionFailure(format!("{:#}", err))
    }

    /// Wrap a backend error as a synthesis failure
    pub fn synthesis(err: anyhow::Error) -> Self {
        Self::SynthesisFailure(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;
