//! Synthesis invoker
//!
//! Hands an utterance to the platform speech engine and reports success as
//! soon as the engine has accepted it. Playback completion is not tracked.

use crate::bridge::SpeakRequest;
use crate::error::{Result, SpeechError};
use std::sync::Arc;

/// Default speaking rate on the normalised 0.0..=1.0 scale
pub const DEFAULT_RATE: f32 = 0.5;

/// Text queued for speaking
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// BCP 47 tag such as `en-US`
    pub locale: String,
    /// Normalised rate, 0.5 being the engine's natural pace
    pub rate: f32,
}

impl Utterance {
    /// Rate expressed in words per minute (175 at the natural pace)
    pub fn words_per_minute(&self) -> u32 {
        (self.rate.clamp(0.0, 1.0) * 350.0).round().max(1.0) as u32
    }

    /// Rate on speech-dispatcher's -100..=100 scale
    pub fn dispatcher_rate(&self) -> i32 {
        (self.rate.clamp(0.0, 1.0) * 200.0 - 100.0).round() as i32
    }

    /// Primary language subtag, lowercased (`en-US` -> `en`)
    pub fn language(&self) -> String {
        primary_language(&self.locale)
    }
}

/// Primary language subtag of a locale identifier, lowercased
pub fn primary_language(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Platform speech engine
pub trait SpeechSynthesizer: Send + Sync {
    /// Queue `utterance` for playback and return without waiting for it
    fn speak(&self, utterance: &Utterance) -> anyhow::Result<()>;
}

pub struct SynthesisInvoker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    rate: f32,
}

impl SynthesisInvoker {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, rate: f32) -> Self {
        Self { synthesizer, rate }
    }

    /// Submit the request for speaking; returns the accepted text
    pub fn speak(&self, request: &SpeakRequest) -> Result<String> {
        let utterance = Utterance {
            text: request.text.clone(),
            locale: request.locale.clone(),
            rate: self.rate,
        };

        tracing::info!(
            "Synthesis: speaking {} chars in {} at rate {}",
            utterance.text.len(),
            utterance.locale,
            utterance.rate
        );

        self.synthesizer
            .speak(&utterance)
            .map_err(SpeechError::synthesis)?;
        Ok(request.text.clone())
    }
}
