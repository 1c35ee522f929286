//! Microphone capture using cpal
//!
//! A dedicated thread owns the input stream (cpal streams are not `Send` on
//! every host) together with the WAV writer. The audio callback forwards
//! sample blocks over a channel; the thread mixes them to mono, decimates to
//! the configured rate, and writes 16-bit PCM until asked to stop or the
//! stream reports an error.

use super::{
    AudioFormat, AudioRecorder, RecordingHandle, RecordingOutcome, RecordingSettings,
    StartedRecording,
};
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;

type Writer = hound::WavWriter<BufWriter<File>>;

/// Recorder backed by the default input device
#[derive(Default)]
pub struct CpalRecorder;

impl CpalRecorder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioRecorder for CpalRecorder {
    fn start(&self, path: &Path, settings: &RecordingSettings) -> Result<StartedRecording> {
        if settings.format != AudioFormat::Wav {
            return Err(anyhow!(
                "{:?} output is not supported by the capture backend, set recording.format to \"wav\"",
                settings.format
            ));
        }

        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = oneshot::channel();

        let path = path.to_path_buf();
        let settings = settings.clone();
        std::thread::Builder::new()
            .name("speech-capture".to_string())
            .spawn(move || {
                let outcome = run_capture(&path, &settings, ready_tx, stop_rx);
                if done_tx.send(outcome).is_err() {
                    tracing::debug!("Capture: nobody waiting for completion");
                }
            })
            .context("failed to spawn capture thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("capture thread exited during startup"))??;

        Ok(StartedRecording {
            handle: Box::new(CpalHandle { stop: stop_tx }),
            finished: done_rx,
        })
    }
}

struct CpalHandle {
    stop: Sender<()>,
}

impl RecordingHandle for CpalHandle {
    fn stop(self: Box<Self>) -> Result<()> {
        self.stop
            .send(())
            .map_err(|_| anyhow!("capture thread is no longer running"))
    }
}

struct CaptureSession {
    stream: cpal::Stream,
    writer: Writer,
    downsampler: MonoDownsampler,
    samples: Receiver<Vec<f32>>,
    faults: Receiver<String>,
    output: PathBuf,
}

/// Body of the capture thread
fn run_capture(
    path: &Path,
    settings: &RecordingSettings,
    ready: Sender<Result<()>>,
    stop: Receiver<()>,
) -> RecordingOutcome {
    let session = match open_session(path, settings) {
        Ok(session) => session,
        Err(e) => {
            let reason = format!("{:#}", e);
            let _ = ready.send(Err(e));
            return RecordingOutcome::Failed(reason);
        }
    };
    let _ = ready.send(Ok(()));

    let CaptureSession {
        stream,
        mut writer,
        mut downsampler,
        samples,
        faults,
        output,
    } = session;
    let channels = settings.channels.max(1);
    let mut fault = None;

    loop {
        crossbeam_channel::select! {
            recv(samples) -> block => {
                if let Ok(block) = block {
                    if let Err(e) = write_block(&mut writer, &mut downsampler, &block, channels) {
                        fault = Some(format!("failed to write audio: {}", e));
                        break;
                    }
                }
            }
            // A dropped handle counts as a stop request
            recv(stop) -> _ => break,
            recv(faults) -> reason => {
                fault = Some(reason.unwrap_or_else(|_| "input stream closed".to_string()));
                break;
            }
        }
    }

    drop(stream);

    if fault.is_none() {
        for block in samples.try_iter() {
            if let Err(e) = write_block(&mut writer, &mut downsampler, &block, channels) {
                fault = Some(format!("failed to write audio: {}", e));
                break;
            }
        }
    }

    let frames = writer.len() / channels as u32;
    if let Err(e) = writer.finalize() {
        fault.get_or_insert_with(|| format!("failed to finalize {}: {}", output.display(), e));
    }

    match fault {
        Some(reason) => {
            tracing::error!("Capture: recording failed: {}", reason);
            RecordingOutcome::Failed(reason)
        }
        None => {
            tracing::info!(
                "Capture: wrote {} frames to {}",
                frames,
                output.display()
            );
            RecordingOutcome::Completed
        }
    }
}

#[allow(deprecated)] // cpal 0.17 deprecates name() but description() is not yet stable
fn open_session(path: &Path, settings: &RecordingSettings) -> Result<CaptureSession> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No default input device available"))?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported_config = device.default_input_config()?;
    let source_rate = supported_config.sample_rate();
    let source_channels = supported_config.channels() as usize;

    tracing::info!(
        "Capture: device='{}', {}Hz, {} channels -> {}Hz, {} channels, output={}",
        device_name,
        source_rate,
        source_channels,
        settings.sample_rate,
        settings.channels,
        path.display()
    );

    let spec = hound::WavSpec {
        channels: settings.channels.max(1),
        sample_rate: settings.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let (sample_tx, sample_rx) = unbounded::<Vec<f32>>();
    let (fault_tx, fault_rx) = bounded::<String>(1);

    let stream = device.build_input_stream(
        &supported_config.into(),
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let _ = sample_tx.send(data.to_vec());
        },
        move |err| {
            tracing::error!("Audio stream error: {}", err);
            let _ = fault_tx.try_send(err.to_string());
        },
        None,
    )?;
    stream.play()?;

    Ok(CaptureSession {
        stream,
        writer,
        downsampler: MonoDownsampler::new(source_rate, settings.sample_rate, source_channels),
        samples: sample_rx,
        faults: fault_rx,
        output: path.to_path_buf(),
    })
}

fn write_block(
    writer: &mut Writer,
    downsampler: &mut MonoDownsampler,
    block: &[f32],
    channels: u16,
) -> std::result::Result<(), hound::Error> {
    for sample in downsampler.process(block) {
        let value = to_i16(sample);
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    Ok(())
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Mixes interleaved frames to mono and converts the rate by sample picking
///
/// Keeps its phase between blocks so block boundaries do not add jitter.
struct MonoDownsampler {
    step: f64,
    channels: usize,
    phase: f64,
}

impl MonoDownsampler {
    fn new(source_rate: u32, target_rate: u32, channels: usize) -> Self {
        Self {
            step: target_rate as f64 / source_rate.max(1) as f64,
            channels: channels.max(1),
            phase: 0.0,
        }
    }

    fn process(&mut self, block: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity((block.len() as f64 * self.step) as usize + 1);
        for frame in block.chunks_exact(self.channels) {
            let mono = frame.iter().sum::<f32>() / self.channels as f32;
            self.phase += self.step;
            while self.phase >= 1.0 {
                self.phase -= 1.0;
                out.push(mono);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_downsample_stereo_to_mono() {
        // 48kHz stereo -> 12kHz mono keeps every 4th frame
        let mut ds = MonoDownsampler::new(48_000, 12_000, 2);
        let stereo: Vec<f32> = (0..8).flat_map(|i| [i as f32, i as f32]).collect();
        assert_eq!(ds.process(&stereo), vec![3.0, 7.0]);
    }

    #[test]
    fn test_downsample_phase_carries_across_blocks() {
        let mut ds = MonoDownsampler::new(48_000, 12_000, 1);
        assert!(ds.process(&[0.1, 0.2]).is_empty());
        assert_eq!(ds.process(&[0.3, 0.4]), vec![0.4]);
    }

    #[test]
    fn test_same_rate_passes_through() {
        let mut ds = MonoDownsampler::new(16_000, 16_000, 1);
        assert_eq!(ds.process(&[0.5, 0.25, 0.0]), vec![0.5, 0.25, 0.0]);
    }

    #[test]
    fn test_to_i16_clamps() {
        assert_eq!(to_i16(0.5), (0.5 * 32767.0) as i16);
        assert_eq!(to_i16(2.0), 32767);
        assert_eq!(to_i16(-2.0), -32768);
    }

    #[test]
    fn test_rejects_aac_output() {
        let dir = tempdir().unwrap();
        let err = CpalRecorder::new()
            .start(&dir.path().join("recording.m4a"), &RecordingSettings::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("wav"));
    }
}
