//! Offline recognition using whisper.cpp
//!
//! Whisper works on complete recordings, so the stream carries a single final
//! result. The model is loaded on first use and kept for later sessions.

use super::{RecognitionResult, RecognitionStream, SpeechRecognizer};
use crate::synthesis::primary_language;
use anyhow::{anyhow, Result};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper's expected input rate
const WHISPER_RATE: u32 = 16_000;

/// Recognizer backed by a ggml whisper model
pub struct WhisperRecognizer {
    model: Arc<ModelSlot>,
}

struct ModelSlot {
    path: PathBuf,
    ctx: Mutex<Option<Arc<WhisperContext>>>,
}

impl ModelSlot {
    fn context(&self) -> Result<Arc<WhisperContext>> {
        let mut slot = self.ctx.lock();
        if let Some(ctx) = slot.as_ref() {
            return Ok(ctx.clone());
        }
        let ctx = Arc::new(load_model(&self.path)?);
        *slot = Some(ctx.clone());
        Ok(ctx)
    }
}

impl WhisperRecognizer {
    /// `model` is the path to a ggml model file, e.g. `ggml-base.bin`
    pub fn new(model: &str) -> Self {
        Self {
            model: Arc::new(ModelSlot {
                path: PathBuf::from(model),
                ctx: Mutex::new(None),
            }),
        }
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn recognize(&self, audio: &Path, locale: &str) -> Result<RecognitionStream> {
        // Only the header is read; samples are decoded on the blocking task
        hound::WavReader::open(audio).map_err(|e| {
            anyhow!(
                "whisper needs a WAV recording, {} is not one: {}",
                audio.display(),
                e
            )
        })?;

        let model = self.model.clone();
        let audio = audio.to_path_buf();
        let language = primary_language(locale);

        let result = async move {
            let task = tokio::task::spawn_blocking(move || -> Result<RecognitionResult> {
                let ctx = model.context()?;
                let text = transcribe_file(&ctx, &audio, &language)?;
                Ok(RecognitionResult::final_result(text))
            });
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(anyhow!("whisper task failed: {}", e)),
            }
        };

        Ok(stream::once(result).boxed())
    }
}

/// Load the model, trying the GPU first
fn load_model(path: &Path) -> Result<WhisperContext> {
    if !path.exists() {
        return Err(anyhow!("Whisper model not found: {}", path.display()));
    }
    let model_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Model path contains invalid UTF-8: {}", path.display()))?;

    tracing::info!("Loading Whisper model from {}", path.display());

    let load = |use_gpu: bool| {
        let mut params = WhisperContextParameters::default();
        params.use_gpu(use_gpu);
        WhisperContext::new_with_params(model_str, params)
    };

    match load(true) {
        Ok(ctx) => {
            tracing::info!("Whisper model loaded (GPU requested)");
            Ok(ctx)
        }
        Err(e) => {
            tracing::warn!("GPU initialization failed: {:?}, trying CPU fallback", e);
            let ctx = load(false)
                .map_err(|e| anyhow!("Failed to load Whisper model: {:?}", e))?;
            tracing::info!("Whisper model loaded with CPU backend");
            Ok(ctx)
        }
    }
}

fn transcribe_file(ctx: &WhisperContext, audio: &Path, language: &str) -> Result<String> {
    let (samples, sample_rate) = load_wav_samples(audio)?;
    tracing::info!(
        "Whisper: {} samples at {}Hz ({:.2}s)",
        samples.len(),
        sample_rate,
        samples.len() as f32 / sample_rate.max(1) as f32
    );

    let samples = resample_audio(&samples, sample_rate, WHISPER_RATE);
    let start = std::time::Instant::now();

    let mut state = ctx
        .create_state()
        .map_err(|e| anyhow!("Failed to create whisper state: {:?}", e))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(Some(language));
    params.set_translate(false);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    state
        .full(params, &samples)
        .map_err(|e| anyhow!("Transcription failed: {:?}", e))?;

    let mut text = String::new();
    for segment in state.as_iter() {
        if let Ok(segment_text) = segment.to_str() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment_text.trim());
        }
    }

    tracing::info!(
        "Whisper: transcribed in {:.2}s ({} chars, language {})",
        start.elapsed().as_secs_f32(),
        text.len(),
        language
    );
    Ok(text.trim().to_string())
}

/// Load mono samples from a WAV file
fn load_wav_samples(path: &Path) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .filter_map(|s| s.ok())
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (hound::SampleFormat::Float, 32) => {
            reader.into_samples::<f32>().filter_map(|s| s.ok()).collect()
        }
        (format, bits) => {
            return Err(anyhow!(
                "Unsupported audio format: {} bits, {:?}",
                bits,
                format
            ))
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono, spec.sample_rate))
}

/// Linear interpolation resampling
fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;

    (0..new_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx = src as usize;
            let frac = (src - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}
