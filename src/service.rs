//! Speech service orchestration
//!
//! Wires the bridge to the native capabilities:
//! 1. `speak`: validate arguments, hand the utterance to the synthesizer
//! 2. `listen`: validate arguments, then stop the active recording, or
//!    request permissions and start one
//! 3. Recording completion: transcribe the artifact, deliver the transcript
//!
//! Every invocation is answered exactly once through its [`Responder`].

use crate::audio::{RecorderState, RecordingController, RecordingOutcome, SessionTicket, Toggle};
use crate::bridge::{
    Invocation, ListenRequest, PluginResult, Responder, ResultSink, SpeakRequest,
    TRANSCRIBED_PREFIX,
};
use crate::config::Config;
use crate::error::SpeechError;
use crate::permissions::PermissionGate;
use crate::platform::Backends;
use crate::storage;
use crate::synthesis::SynthesisInvoker;
use crate::transcription::TranscriptionInvoker;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Message returned to the invocation that stops a recording
pub const RECORDING_STOPPED: &str = "Recording stopped";

/// Bridge action names
pub const ACTION_SPEAK: &str = "speak";
pub const ACTION_LISTEN: &str = "listen";

struct Inner {
    gate: PermissionGate,
    recording: RecordingController,
    transcription: TranscriptionInvoker,
    synthesis: SynthesisInvoker,
}

/// Handles `speak` and `listen` invocations
///
/// Cheap to clone; clones share the same recording session.
#[derive(Clone)]
pub struct SpeechService {
    inner: Arc<Inner>,
}

impl SpeechService {
    /// Build a service recording into the documents directory
    pub fn new(backends: Backends, config: &Config) -> Self {
        let artifact = storage::artifact_path(&config.recording.file_name);
        Self::with_artifact(backends, config, artifact)
    }

    /// Build a service recording into `artifact`
    pub fn with_artifact(backends: Backends, config: &Config, artifact: PathBuf) -> Self {
        let inner = Inner {
            gate: PermissionGate::new(backends.permissions),
            recording: RecordingController::new(
                backends.recorder,
                config.recording.settings(),
                artifact,
            ),
            transcription: TranscriptionInvoker::new(
                backends.recognizer,
                config.recognition.timeout(),
            ),
            synthesis: SynthesisInvoker::new(backends.synthesizer, config.speech.rate),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Where recordings are written
    pub fn artifact_path(&self) -> &Path {
        self.inner.recording.artifact_path()
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.inner.recording.state()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.recording.is_recording()
    }

    /// Route an invocation by action name without waiting for it
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, action: &str, invocation: Invocation, sink: Arc<dyn ResultSink>) {
        match action {
            ACTION_SPEAK => self.speak(invocation, sink),
            ACTION_LISTEN => {
                let service = self.clone();
                tokio::spawn(async move { service.listen(invocation, sink).await });
            }
            other => {
                tracing::warn!("Service: unknown action '{}'", other);
                sink.send(
                    &invocation.callback_id,
                    PluginResult::error(format!("Unknown action: {}", other)),
                );
            }
        }
    }

    /// Speak `[text, language]`
    ///
    /// Answers as soon as the utterance has been accepted by the engine.
    pub fn speak(&self, invocation: Invocation, sink: Arc<dyn ResultSink>) {
        let responder = Responder::new(invocation.callback_id.clone(), sink);

        let outcome = SpeakRequest::from_invocation(&invocation)
            .and_then(|request| self.inner.synthesis.speak(&request));

        match outcome {
            Ok(text) => responder.succeed(text),
            Err(e) => responder.fail(&e),
        };
    }

    /// Listen with `[language]`
    ///
    /// A call made while recording stops it straight away and is answered
    /// with [`RECORDING_STOPPED`]; permissions gate only the start. A call
    /// that starts a recording is answered later, once the recording has
    /// finished and been transcribed.
    pub async fn listen(&self, invocation: Invocation, sink: Arc<dyn ResultSink>) {
        let responder = Responder::new(invocation.callback_id.clone(), sink);

        let request = match ListenRequest::from_invocation(&invocation) {
            Ok(request) => request,
            Err(e) => {
                responder.fail(&e);
                return;
            }
        };

        match self.inner.recording.stop() {
            Ok(Some(id)) => {
                tracing::info!("Service: session {} stopped by {}", id, responder.callback_id());
                responder.succeed(RECORDING_STOPPED);
                return;
            }
            Ok(None) => {}
            Err(e) => {
                responder.fail(&e);
                return;
            }
        }

        if !self.inner.gate.authorize(&responder).await {
            return;
        }

        // Another call may have started a session while permissions resolved
        match self.inner.recording.toggle() {
            Ok(Toggle::Started(ticket)) => {
                let service = self.clone();
                tokio::spawn(async move {
                    service
                        .complete_recording(ticket, request.locale, responder)
                        .await
                });
            }
            Ok(Toggle::Stopped { id }) => {
                tracing::info!("Service: session {} stopped by {}", id, responder.callback_id());
                responder.succeed(RECORDING_STOPPED);
            }
            Err(e) => {
                responder.fail(&e);
            }
        }
    }

    /// Wait for the recording to finish, then transcribe it
    async fn complete_recording(&self, ticket: SessionTicket, locale: String, responder: Arc<Responder>) {
        let outcome = ticket.finished.await.unwrap_or_else(|_| {
            RecordingOutcome::Failed("recorder went away without finishing".to_string())
        });
        self.inner.recording.finish(ticket.id);

        if let RecordingOutcome::Failed(reason) = outcome {
            tracing::error!("Service: session {} failed: {}", ticket.id, reason);
            responder.fail(&SpeechError::RecordingFailure(reason));
            return;
        }

        match storage::probe_artifact(&ticket.artifact) {
            Ok(info) => tracing::info!(
                "Service: session {} recorded {} bytes ({:?}s)",
                ticket.id,
                info.size_bytes,
                info.duration_seconds
            ),
            Err(e) => tracing::debug!("Service: could not probe artifact: {}", e),
        }

        match self
            .inner
            .transcription
            .transcribe(&ticket.artifact, Some(&locale))
            .await
        {
            Ok(text) => responder.succeed(format!("{}{}", TRANSCRIBED_PREFIX, text)),
            Err(e) => responder.fail(&e),
        };
    }
}
