//! speech-bridge - text-to-speech and speech-to-text for hybrid apps
//!
//! Exposes `speak` and `listen` to a JavaScript layer. Results travel back
//! through a callback channel, exactly one per invocation.

pub mod audio;
pub mod bridge;
#[cfg(feature = "tauri")]
pub mod commands;
pub mod config;
pub mod error;
pub mod permissions;
pub mod platform;
pub mod service;
pub mod storage;
pub mod synthesis;
pub mod transcription;

pub use bridge::{Invocation, PluginResult, Responder, ResultSink, Status};
pub use error::{PermissionKind, SpeechError};
pub use platform::Backends;
pub use service::SpeechService;

#[cfg(feature = "tauri")]
pub use commands::init;

/// Set up stdout and file logging (local time for readability)
///
/// Logs go to `~/.speech-bridge/logs/speech-bridge.log`. Safe to call more
/// than once; later calls are ignored.
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let log_dir = config::get_config_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("speech-bridge.log"))
        .ok();

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let result = if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
        tracing_subscriber::registry()
            .with(filter())
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter())
            .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialised");
    }
}
