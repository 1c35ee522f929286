//! Linux backends
//!
//! Speech output goes through speech-dispatcher's `spd-say`.

use crate::synthesis::{SpeechSynthesizer, Utterance};
use anyhow::Context;
use std::process::Command;

/// Arguments passed to `spd-say` for an utterance
pub fn spd_say_args(utterance: &Utterance) -> Vec<String> {
    vec![
        "-l".to_string(),
        utterance.language(),
        "-r".to_string(),
        utterance.dispatcher_rate().to_string(),
        "--".to_string(),
        utterance.text.clone(),
    ]
}

/// Speech output through speech-dispatcher
pub struct SpdSaySynthesizer;

impl SpeechSynthesizer for SpdSaySynthesizer {
    fn speak(&self, utterance: &Utterance) -> anyhow::Result<()> {
        let child = Command::new("spd-say")
            .args(spd_say_args(utterance))
            .spawn()
            .context("failed to start spd-say (is speech-dispatcher installed?)")?;
        super::reap(child);
        Ok(())
    }
}
