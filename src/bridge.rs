//! Bridge adapter between the hybrid-app layer and the native handlers
//!
//! An [`Invocation`] carries the caller's correlation id and positional
//! arguments. Results travel back through a [`ResultSink`], wrapped in a
//! [`Responder`] that guarantees exactly one delivery per invocation no
//! matter how many asynchronous producers race to answer it.

use crate::error::{Result, SpeechError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Prefix of every successful transcription message
pub const TRANSCRIBED_PREFIX: &str = "Transcribed text: ";

/// Binary outcome status seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Error,
}

/// Result envelope delivered once per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    pub status: Status,
    pub message: String,
}

impl PluginResult {
    /// Successful outcome carrying a message
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
        }
    }

    /// Failed outcome carrying a reason
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Convert into the `Result<String, String>` shape used by IPC commands
    pub fn into_result(self) -> std::result::Result<String, String> {
        match self.status {
            Status::Ok => Ok(self.message),
            Status::Error => Err(self.message),
        }
    }
}

impl From<&SpeechError> for PluginResult {
    fn from(err: &SpeechError) -> Self {
        PluginResult::error(err.to_string())
    }
}

/// A call arriving from the hybrid-app layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Correlation id the result must be delivered under
    pub callback_id: String,
    /// Positional arguments, as received from JavaScript
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl Invocation {
    pub fn new(callback_id: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            callback_id: callback_id.into(),
            arguments,
        }
    }

    /// Read a non-empty string argument at `index`
    ///
    /// Absent, `null`, non-string, and blank values are all reported as a
    /// missing argument named `name`.
    pub fn string_arg(&self, index: usize, name: &'static str) -> Result<String> {
        match self.arguments.get(index) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            _ => Err(SpeechError::MissingArgument(name)),
        }
    }
}

/// Arguments of a `speak` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakRequest {
    pub text: String,
    pub locale: String,
}

impl SpeakRequest {
    /// Parse `[text, language]`
    pub fn from_invocation(invocation: &Invocation) -> Result<Self> {
        let text = invocation.string_arg(0, "text")?;
        let locale = invocation.string_arg(1, "language")?;
        Ok(Self { text, locale })
    }
}

/// Arguments of a `listen` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRequest {
    pub locale: String,
}

impl ListenRequest {
    /// Parse `[language]`
    pub fn from_invocation(invocation: &Invocation) -> Result<Self> {
        let locale = invocation
            .string_arg(0, "language")
            .map_err(|_| SpeechError::LocaleNotSet)?;
        Ok(Self { locale })
    }
}

/// Destination for invocation results
///
/// Implemented by the host integration (a Tauri command, a webview message
/// channel, a test collector).
pub trait ResultSink: Send + Sync {
    fn send(&self, callback_id: &str, result: PluginResult);
}

/// Settle-once handle for a single invocation
///
/// Shared by every asynchronous producer that may answer the invocation.
/// The first call to [`Responder::deliver`] wins; later calls are logged and
/// dropped. A responder dropped without delivering sends a fallback error so
/// the caller is never left waiting.
pub struct Responder {
    callback_id: String,
    sink: Arc<dyn ResultSink>,
    settled: AtomicBool,
}

impl Responder {
    pub fn new(callback_id: impl Into<String>, sink: Arc<dyn ResultSink>) -> Arc<Self> {
        Arc::new(Self {
            callback_id: callback_id.into(),
            sink,
            settled: AtomicBool::new(false),
        })
    }

    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    /// Whether a result has already been delivered
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// Deliver `result` if nothing has been delivered yet
    ///
    /// Returns `true` when this call produced the delivery.
    pub fn deliver(&self, result: PluginResult) -> bool {
        if self.settled.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                "Bridge: dropping extra result for {} ({:?}: {})",
                self.callback_id,
                result.status,
                result.message
            );
            return false;
        }

        tracing::info!(
            "Bridge: delivering {:?} to {}: {}",
            result.status,
            self.callback_id,
            result.message
        );
        self.sink.send(&self.callback_id, result);
        true
    }

    pub fn succeed(&self, message: impl Into<String>) -> bool {
        self.deliver(PluginResult::ok(message))
    }

    pub fn fail(&self, err: &SpeechError) -> bool {
        tracing::warn!("Bridge: {} failed: {}", self.callback_id, err);
        self.deliver(PluginResult::from(err))
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::SeqCst) {
            tracing::error!(
                "Bridge: invocation {} ended without a result",
                self.callback_id
            );
            self.sink.send(
                &self.callback_id,
                PluginResult::error("Invocation ended without a result"),
            );
        }
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("callback_id", &self.callback_id)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Sink that forwards the first result into a oneshot channel
///
/// Used where the host awaits a single reply, e.g. an async IPC command.
pub struct OneshotSink {
    tx: Mutex<Option<oneshot::Sender<PluginResult>>>,
}

impl OneshotSink {
    pub fn channel() -> (Arc<Self>, oneshot::Receiver<PluginResult>) {
        let (tx, rx) = oneshot::channel();
        let sink = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        (sink, rx)
    }
}

impl ResultSink for OneshotSink {
    fn send(&self, callback_id: &str, result: PluginResult) {
        match self.tx.lock().take() {
            Some(tx) => {
                if tx.send(result).is_err() {
                    tracing::warn!("Bridge: receiver for {} went away", callback_id);
                }
            }
            None => tracing::warn!("Bridge: oneshot for {} already used", callback_id),
        }
    }
}
