//! Tauri command handlers
//!
//! Registered as the `speech` plugin; the frontend calls them as
//! `plugin:speech|speak`, `plugin:speech|listen`, and so on.

use crate::bridge::{Invocation, OneshotSink};
use crate::config;
use crate::platform;
use crate::service::{SpeechService, ACTION_LISTEN, ACTION_SPEAK};
use serde_json::Value;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Manager, Runtime, State};

/// Dispatch an invocation and wait for its single result
async fn invoke(
    service: &SpeechService,
    action: &str,
    arguments: Vec<Value>,
) -> Result<String, String> {
    let callback_id = uuid::Uuid::new_v4().to_string();
    let (sink, result) = OneshotSink::channel();

    service.dispatch(action, Invocation::new(callback_id, arguments), sink);

    result
        .await
        .map_err(|_| "Invocation ended without a result".to_string())?
        .into_result()
}

/// Speak `text` in `language`; resolves once speech has started
#[tauri::command]
pub async fn speak(
    service: State<'_, SpeechService>,
    text: Option<Value>,
    language: Option<Value>,
) -> Result<String, String> {
    let arguments = vec![
        text.unwrap_or(Value::Null),
        language.unwrap_or(Value::Null),
    ];
    invoke(&service, ACTION_SPEAK, arguments).await
}

/// Toggle recording
///
/// The call that starts a recording resolves with the transcript once a
/// second call stops it.
#[tauri::command]
pub async fn listen(
    service: State<'_, SpeechService>,
    language: Option<Value>,
) -> Result<String, String> {
    invoke(&service, ACTION_LISTEN, vec![language.unwrap_or(Value::Null)]).await
}

#[tauri::command]
pub fn is_listening(service: State<'_, SpeechService>) -> bool {
    service.is_listening()
}

/// Build the `speech` plugin
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("speech")
        .invoke_handler(tauri::generate_handler![
            speak,
            listen,
            is_listening,
            config::get_config,
            config::set_config,
            config::reset_config,
            config::get_config_path_cmd,
        ])
        .setup(|app, _api| {
            let config = config::get_config()?;
            tracing::info!("Speech plugin starting (rate {})", config.speech.rate);
            app.manage(SpeechService::new(platform::native(&config), &config));
            Ok(())
        })
        .build()
}
