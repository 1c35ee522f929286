//! Permission gate for `listen`
//!
//! Recording and transcription permissions are requested concurrently on
//! every invocation. The first denial settles the invocation; whatever is
//! still pending is left to finish in the background and cannot answer the
//! caller a second time.

use crate::bridge::Responder;
use crate::error::{PermissionKind, SpeechError};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Resolved answer to a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Platform hook that asks the user (or the OS) for an authorisation
pub trait PermissionBackend: Send + Sync {
    /// Request `kind`, resolving once the answer is known
    ///
    /// An `Err` means the request itself could not be made (e.g. the audio
    /// session could not be configured).
    fn request(&self, kind: PermissionKind) -> BoxFuture<'static, anyhow::Result<PermissionStatus>>;
}

type PendingRequest = BoxFuture<'static, (PermissionKind, anyhow::Result<PermissionStatus>)>;

/// Requests both permissions and settles the invocation on the first denial
pub struct PermissionGate {
    backend: Arc<dyn PermissionBackend>,
}

impl PermissionGate {
    pub fn new(backend: Arc<dyn PermissionBackend>) -> Self {
        Self { backend }
    }

    /// Returns `true` when both permissions were granted
    ///
    /// On `false` the responder has already been settled with the reason.
    pub async fn authorize(&self, responder: &Arc<Responder>) -> bool {
        let mut pending: FuturesUnordered<PendingRequest> = FuturesUnordered::new();
        for kind in [PermissionKind::Recording, PermissionKind::Transcription] {
            let request = self.backend.request(kind);
            pending.push(Box::pin(async move { (kind, request.await) }));
        }

        while let Some((kind, outcome)) = pending.next().await {
            match refusal(kind, outcome) {
                None => tracing::info!("Permissions: {} permission granted", kind),
                Some(err) => {
                    responder.fail(&err);
                    if !pending.is_empty() {
                        drain_remaining(pending, responder.clone());
                    }
                    return false;
                }
            }
        }

        true
    }
}

/// Let outstanding requests complete after the invocation has been settled
fn drain_remaining(mut pending: FuturesUnordered<PendingRequest>, responder: Arc<Responder>) {
    tokio::spawn(async move {
        while let Some((kind, outcome)) = pending.next().await {
            match refusal(kind, outcome) {
                None => tracing::debug!(
                    "Permissions: {} permission granted after invocation settled",
                    kind
                ),
                Some(err) => {
                    // Already settled by the first denial; this is a no-op delivery
                    responder.fail(&err);
                }
            }
        }
    });
}

/// Map a permission outcome to the error it should produce, if any
fn refusal(
    kind: PermissionKind,
    outcome: anyhow::Result<PermissionStatus>,
) -> Option<SpeechError> {
    match outcome {
        Ok(PermissionStatus::Granted) => None,
        Ok(PermissionStatus::Denied) => Some(SpeechError::PermissionDenied(kind)),
        Err(e) => {
            tracing::error!("Permissions: {} request failed: {:#}", kind, e);
            match kind {
                PermissionKind::Recording => Some(SpeechError::recording(e)),
                PermissionKind::Transcription => Some(SpeechError::PermissionDenied(kind)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{PluginResult, ResultSink};
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<Vec<PluginResult>>);

    impl ResultSink for Collect {
        fn send(&self, _callback_id: &str, result: PluginResult) {
            self.0.lock().push(result);
        }
    }

    /// Answers each kind after an optional delay
    struct Scripted {
        recording: (PermissionStatus, u64),
        transcription: (PermissionStatus, u64),
    }

    impl PermissionBackend for Scripted {
        fn request(
            &self,
            kind: PermissionKind,
        ) -> BoxFuture<'static, anyhow::Result<PermissionStatus>> {
            let (status, delay_ms) = match kind {
                PermissionKind::Recording => self.recording,
                PermissionKind::Transcription => self.transcription,
            };
            Box::pin(async move {
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Ok(status)
            })
        }
    }

    struct Broken;

    impl PermissionBackend for Broken {
        fn request(
            &self,
            _kind: PermissionKind,
        ) -> BoxFuture<'static, anyhow::Result<PermissionStatus>> {
            Box::pin(async { Err(anyhow!("audio session unavailable")) })
        }
    }

    fn gate(recording: (PermissionStatus, u64), transcription: (PermissionStatus, u64)) -> PermissionGate {
        PermissionGate::new(Arc::new(Scripted {
            recording,
            transcription,
        }))
    }

    #[tokio::test]
    async fn test_both_granted_passes() {
        let sink = Arc::new(Collect::default());
        let responder = Responder::new("cb", sink.clone());
        let gate = gate((PermissionStatus::Granted, 0), (PermissionStatus::Granted, 5));

        assert!(gate.authorize(&responder).await);
        assert!(!responder.is_settled());
        // Settle so the drop fallback stays quiet
        responder.succeed("done");
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_both_denied_reports_recording_first() {
        let sink = Arc::new(Collect::default());
        let responder = Responder::new("cb", sink.clone());
        let gate = gate((PermissionStatus::Denied, 0), (PermissionStatus::Denied, 0));

        assert!(!gate.authorize(&responder).await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let delivered = sink.0.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message, "Recording permission denied");
    }

    #[tokio::test]
    async fn test_late_denial_does_not_duplicate() {
        let sink = Arc::new(Collect::default());
        let responder = Responder::new("cb", sink.clone());
        let gate = gate((PermissionStatus::Denied, 30), (PermissionStatus::Denied, 0));

        assert!(!gate.authorize(&responder).await);
        // Give the drained recording request time to resolve
        tokio::time::sleep(Duration::from_millis(80)).await;

        let delivered = sink.0.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message, "Transcription permission denied");
    }

    #[tokio::test]
    async fn test_request_error_is_recording_failure() {
        let sink = Arc::new(Collect::default());
        let responder = Responder::new("cb", sink.clone());
        let gate = PermissionGate::new(Arc::new(Broken));

        assert!(!gate.authorize(&responder).await);
        let delivered = sink.0.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(
            delivered[0].message,
            "Failed to record: audio session unavailable"
        );
    }
}
