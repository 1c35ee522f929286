//! Recording controller
//!
//! Owns the single recording session. A `listen` while idle starts one; a
//! `listen` while recording stops it. The recorder backend reports when the
//! recording has actually finished (after a stop, or on its own after an
//! interruption) through a oneshot channel, and that completion is what
//! drives transcription.

#[cfg(feature = "capture")]
pub mod capture;

#[cfg(feature = "capture")]
pub use capture::CpalRecorder;

use crate::error::{Result, SpeechError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Container/codec of the recorded artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// AAC in an MPEG-4 container (.m4a)
    Mpeg4Aac,
    /// 16-bit PCM WAV
    Wav,
}

/// WAV when the bundled capture backend is compiled in, since it cannot
/// encode AAC; AAC otherwise
impl Default for AudioFormat {
    fn default() -> Self {
        if cfg!(feature = "capture") {
            AudioFormat::Wav
        } else {
            AudioFormat::Mpeg4Aac
        }
    }
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mpeg4Aac => "m4a",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Encoder quality hint passed to the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncoderQuality {
    Min,
    Low,
    Medium,
    #[default]
    High,
    Max,
}

/// Settings handed to the recorder on start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSettings {
    pub format: AudioFormat,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub channels: u16,
    pub quality: EncoderQuality,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            sample_rate: 12_000,
            channels: 1,
            quality: EncoderQuality::High,
        }
    }
}

/// How a recording ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// The artifact was written and closed cleanly
    Completed,
    /// Recording ended abnormally; the artifact must not be transcribed
    Failed(String),
}

/// A running recording as returned by a backend
pub struct StartedRecording {
    pub handle: Box<dyn RecordingHandle>,
    /// Resolves once the recording has finished for any reason
    ///
    /// Backends must either send an outcome or drop the sender; a dropped
    /// sender is treated as a failure.
    pub finished: oneshot::Receiver<RecordingOutcome>,
}

/// Platform audio recorder
pub trait AudioRecorder: Send + Sync {
    /// Begin recording into `path`, overwriting any previous artifact
    fn start(&self, path: &Path, settings: &RecordingSettings) -> anyhow::Result<StartedRecording>;
}

/// Control handle of a running recording
pub trait RecordingHandle: Send {
    /// Ask the recorder to stop; completion arrives on `finished`
    fn stop(self: Box<Self>) -> anyhow::Result<()>;
}

/// Controller state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Ticket for a session that was just started
pub struct SessionTicket {
    pub id: Uuid,
    pub artifact: PathBuf,
    pub finished: oneshot::Receiver<RecordingOutcome>,
}

/// Result of a toggle
pub enum Toggle {
    /// IDLE -> RECORDING
    Started(SessionTicket),
    /// RECORDING -> IDLE, by request
    Stopped { id: Uuid },
}

struct ActiveSession {
    id: Uuid,
    handle: Box<dyn RecordingHandle>,
    started_at: chrono::DateTime<chrono::Local>,
}

/// Single-session recording state machine
pub struct RecordingController {
    recorder: Arc<dyn AudioRecorder>,
    settings: RecordingSettings,
    artifact: PathBuf,
    active: Mutex<Option<ActiveSession>>,
}

impl RecordingController {
    /// The artifact's extension is replaced to match `settings.format`.
    pub fn new(recorder: Arc<dyn AudioRecorder>, settings: RecordingSettings, mut artifact: PathBuf) -> Self {
        artifact.set_extension(settings.format.extension());
        Self {
            recorder,
            settings,
            artifact,
            active: Mutex::new(None),
        }
    }

    /// Fixed path every recording is written to
    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    pub fn state(&self) -> RecorderState {
        if self.active.lock().is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Start when idle, stop when recording
    ///
    /// The check and the transition happen under one lock, so two racing
    /// toggles can never both start a session.
    pub fn toggle(&self) -> Result<Toggle> {
        let mut active = self.active.lock();

        if let Some(session) = active.take() {
            return stop_session(session).map(|id| Toggle::Stopped { id });
        }

        if let Some(parent) = self.artifact.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SpeechError::RecordingFailure(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let started = self
            .recorder
            .start(&self.artifact, &self.settings)
            .map_err(SpeechError::recording)?;

        let id = Uuid::new_v4();
        tracing::info!(
            "Recorder: session {} recording to {} ({:?}, {}Hz, {} ch)",
            id,
            self.artifact.display(),
            self.settings.format,
            self.settings.sample_rate,
            self.settings.channels
        );

        *active = Some(ActiveSession {
            id,
            handle: started.handle,
            started_at: chrono::Local::now(),
        });

        Ok(Toggle::Started(SessionTicket {
            id,
            artifact: self.artifact.clone(),
            finished: started.finished,
        }))
    }

    /// Stop the active session, if any, returning its id
    ///
    /// Unlike [`RecordingController::toggle`] this never starts a recording.
    pub fn stop(&self) -> Result<Option<Uuid>> {
        let session = self.active.lock().take();
        session.map(stop_session).transpose()
    }

    /// Clear session `id` after the backend reported completion
    ///
    /// Returns `true` when the session was still active, i.e. the recording
    /// ended out of band rather than through a toggle.
    pub fn finish(&self, id: Uuid) -> bool {
        let mut active = self.active.lock();
        match active.as_ref() {
            Some(session) if session.id == id => {
                tracing::info!("Recorder: session {} ended out of band", id);
                *active = None;
                true
            }
            _ => false,
        }
    }
}

fn stop_session(session: ActiveSession) -> Result<Uuid> {
    let elapsed = chrono::Local::now() - session.started_at;
    tracing::info!(
        "Recorder: stopping session {} after {}ms",
        session.id,
        elapsed.num_milliseconds()
    );
    let id = session.id;
    session.handle.stop().map_err(SpeechError::recording)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recorder whose handles complete as soon as they are stopped
    #[derive(Default)]
    struct InstantRecorder {
        starts: AtomicUsize,
    }

    struct InstantHandle(oneshot::Sender<RecordingOutcome>);

    impl RecordingHandle for InstantHandle {
        fn stop(self: Box<Self>) -> anyhow::Result<()> {
            let _ = self.0.send(RecordingOutcome::Completed);
            Ok(())
        }
    }

    impl AudioRecorder for InstantRecorder {
        fn start(&self, _path: &Path, _settings: &RecordingSettings) -> anyhow::Result<StartedRecording> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            Ok(StartedRecording {
                handle: Box::new(InstantHandle(tx)),
                finished: rx,
            })
        }
    }

    struct FailingRecorder;

    impl AudioRecorder for FailingRecorder {
        fn start(&self, _path: &Path, _settings: &RecordingSettings) -> anyhow::Result<StartedRecording> {
            Err(anyhow!("no input device"))
        }
    }

    fn controller(recorder: Arc<dyn AudioRecorder>) -> (RecordingController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("recording.m4a");
        (
            RecordingController::new(recorder, RecordingSettings::default(), artifact),
            dir,
        )
    }

    #[test]
    fn test_default_settings() {
        let settings = RecordingSettings::default();
        assert_eq!(settings.sample_rate, 12_000);
        assert_eq!(settings.channels, 1);
        assert_eq!(settings.quality, EncoderQuality::High);
    }

    #[cfg(feature = "capture")]
    #[test]
    fn test_default_format_is_recordable_by_capture() {
        assert_eq!(AudioFormat::default(), AudioFormat::Wav);
    }

    #[cfg(not(feature = "capture"))]
    #[test]
    fn test_default_format_without_capture() {
        assert_eq!(AudioFormat::default(), AudioFormat::Mpeg4Aac);
    }

    #[test]
    fn test_artifact_extension_follows_format() {
        let settings = RecordingSettings {
            format: AudioFormat::Wav,
            ..Default::default()
        };
        let controller = RecordingController::new(
            Arc::new(InstantRecorder::default()),
            settings,
            PathBuf::from("/docs/recording.m4a"),
        );
        assert_eq!(controller.artifact_path(), Path::new("/docs/recording.wav"));
    }

    #[tokio::test]
    async fn test_stop_never_starts() {
        let recorder = Arc::new(InstantRecorder::default());
        let (controller, _dir) = controller(recorder.clone());

        assert_eq!(controller.stop().unwrap(), None);
        assert_eq!(recorder.starts.load(Ordering::SeqCst), 0);

        let ticket = match controller.toggle().unwrap() {
            Toggle::Started(ticket) => ticket,
            Toggle::Stopped { .. } => panic!("expected start"),
        };
        assert_eq!(controller.stop().unwrap(), Some(ticket.id));
        assert!(!controller.is_recording());
        assert_eq!(ticket.finished.await.unwrap(), RecordingOutcome::Completed);
    }

    #[test]
    fn test_format_serialisation() {
        assert_eq!(
            serde_json::to_string(&AudioFormat::Mpeg4Aac).unwrap(),
            "\"mpeg4_aac\""
        );
        assert_eq!(AudioFormat::Wav.extension(), "wav");
    }

    #[tokio::test]
    async fn test_toggle_cycles_idle_recording_idle() {
        let recorder = Arc::new(InstantRecorder::default());
        let (controller, _dir) = controller(recorder.clone());
        assert_eq!(controller.state(), RecorderState::Idle);

        let ticket = match controller.toggle().unwrap() {
            Toggle::Started(ticket) => ticket,
            Toggle::Stopped { .. } => panic!("expected start"),
        };
        assert_eq!(controller.state(), RecorderState::Recording);

        match controller.toggle().unwrap() {
            Toggle::Stopped { id } => assert_eq!(id, ticket.id),
            Toggle::Started(_) => panic!("expected stop"),
        }
        assert_eq!(controller.state(), RecorderState::Idle);
        assert_eq!(ticket.finished.await.unwrap(), RecordingOutcome::Completed);

        // Completion after a requested stop is not out of band
        assert!(!controller.finish(ticket.id));

        assert!(matches!(controller.toggle().unwrap(), Toggle::Started(_)));
        assert_eq!(recorder.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_finish_clears_out_of_band_session() {
        let (controller, _dir) = controller(Arc::new(InstantRecorder::default()));
        let ticket = match controller.toggle().unwrap() {
            Toggle::Started(ticket) => ticket,
            Toggle::Stopped { .. } => panic!("expected start"),
        };

        assert!(!controller.finish(Uuid::new_v4()));
        assert!(controller.is_recording());
        assert!(controller.finish(ticket.id));
        assert!(!controller.is_recording());
    }

    #[test]
    fn test_start_failure_stays_idle() {
        let (controller, _dir) = controller(Arc::new(FailingRecorder));
        let err = match controller.toggle() {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.to_string(), "Failed to record: no input device");
        assert_eq!(controller.state(), RecorderState::Idle);
    }
}
