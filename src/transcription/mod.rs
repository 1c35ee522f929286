//! Transcription invoker
//!
//! Submits the recorded artifact to a [`SpeechRecognizer`] and waits for the
//! first final result. Partial hypotheses are logged and ignored.

#[cfg(feature = "whisper")]
pub mod whisper;

#[cfg(feature = "whisper")]
pub use whisper::WhisperRecognizer;

use crate::error::{Result, SpeechError};
use futures_util::stream::{BoxStream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One hypothesis emitted by a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    /// Best transcription so far
    pub text: String,
    /// Set on the complete, non-revisable result
    pub is_final: bool,
}

impl RecognitionResult {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

pub type RecognitionStream = BoxStream<'static, anyhow::Result<RecognitionResult>>;

/// Platform speech recognizer
pub trait SpeechRecognizer: Send + Sync {
    /// Start recognising the audio file at `audio` in `locale`
    fn recognize(&self, audio: &Path, locale: &str) -> anyhow::Result<RecognitionStream>;
}

pub struct TranscriptionInvoker {
    recognizer: Arc<dyn SpeechRecognizer>,
    timeout: Duration,
}

impl TranscriptionInvoker {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, timeout: Duration) -> Self {
        Self {
            recognizer,
            timeout,
        }
    }

    /// Transcribe `audio`, returning the final transcript
    pub async fn transcribe(&self, audio: &Path, locale: Option<&str>) -> Result<String> {
        let locale = locale
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or(SpeechError::LocaleNotSet)?;

        tracing::info!(
            "Transcription: recognising {} ({})",
            audio.display(),
            locale
        );

        let stream = self
            .recognizer
            .recognize(audio, locale)
            .map_err(SpeechError::recognition)?;

        match tokio::time::timeout(self.timeout, first_final(stream)).await {
            Ok(result) => result,
            Err(_) => Err(SpeechError::RecognitionFailure(format!(
                "no result within {:?}",
                self.timeout
            ))),
        }
    }
}

async fn first_final(mut stream: RecognitionStream) -> Result<String> {
    let mut partials = 0usize;
    while let Some(item) = stream.next().await {
        let result = item.map_err(SpeechError::recognition)?;
        if result.is_final {
            tracing::info!(
                "Transcription: final result after {} partials ({} chars)",
                partials,
                result.text.len()
            );
            return Ok(result.text);
        }
        partials += 1;
        tracing::debug!("Transcription: partial '{}'", result.text);
    }
    Err(SpeechError::RecognitionFailure(
        "recognizer returned no result".to_string(),
    ))
}
