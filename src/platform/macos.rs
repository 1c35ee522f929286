//! macOS backends
//!
//! Microphone authorisation goes through AVFoundation's `AVCaptureDevice`.
//! Speech output uses the system `say` command.

use crate::error::PermissionKind;
use crate::permissions::{PermissionBackend, PermissionStatus};
use crate::synthesis::{SpeechSynthesizer, Utterance};
use anyhow::Context;
use futures_util::future::BoxFuture;
use objc2::runtime::AnyClass;
use objc2::{class, msg_send};
use objc2_foundation::NSString;
use std::process::Command;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Interval between status checks while a permission prompt is open
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Microphone authorization status values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophoneStatus {
    /// User has not yet made a choice
    NotDetermined,
    /// Access is restricted (e.g., parental controls)
    Restricted,
    Denied,
    Authorized,
    Unknown,
}

impl From<i64> for MicrophoneStatus {
    fn from(value: i64) -> Self {
        match value {
            0 => MicrophoneStatus::NotDetermined,
            1 => MicrophoneStatus::Restricted,
            2 => MicrophoneStatus::Denied,
            3 => MicrophoneStatus::Authorized,
            _ => MicrophoneStatus::Unknown,
        }
    }
}

/// Check microphone permission status
///
/// Returns: 0=NotDetermined, 1=Restricted, 2=Denied, 3=Authorized
pub fn check_microphone_permission() -> MicrophoneStatus {
    unsafe {
        #[link(name = "AVFoundation", kind = "framework")]
        extern "C" {}

        let cls: &AnyClass = class!(AVCaptureDevice);
        // AVMediaTypeAudio
        let media_type = NSString::from_str("soun");
        let status: i64 = msg_send![cls, authorizationStatusForMediaType: &*media_type];

        tracing::debug!("Microphone authorization status: {}", status);
        MicrophoneStatus::from(status)
    }
}

/// Trigger the system microphone prompt
///
/// Returns immediately; the answer is observed by polling the status.
pub fn request_microphone_permission() {
    unsafe {
        #[link(name = "AVFoundation", kind = "framework")]
        extern "C" {}

        let cls: &AnyClass = class!(AVCaptureDevice);
        let media_type = NSString::from_str("soun");

        // nil completion handler; the status is polled instead
        let nil: *const std::ffi::c_void = std::ptr::null();
        let _: () = msg_send![
            cls,
            requestAccessForMediaType: &*media_type,
            completionHandler: nil
        ];

        tracing::info!("Requested microphone permission");
    }
}

/// Microphone permission via AVFoundation; transcription runs locally and
/// needs no system authorisation
pub struct MacPermissions {
    poll_timeout: Duration,
}

impl MacPermissions {
    pub fn new(poll_timeout: Duration) -> Self {
        Self { poll_timeout }
    }
}

impl PermissionBackend for MacPermissions {
    fn request(&self, kind: PermissionKind) -> BoxFuture<'static, anyhow::Result<PermissionStatus>> {
        let poll_timeout = self.poll_timeout;
        Box::pin(async move {
            match kind {
                PermissionKind::Transcription => Ok(PermissionStatus::Granted),
                PermissionKind::Recording => Ok(resolve_microphone(poll_timeout).await),
            }
        })
    }
}

async fn resolve_microphone(poll_timeout: Duration) -> PermissionStatus {
    match check_microphone_permission() {
        MicrophoneStatus::Authorized => return PermissionStatus::Granted,
        MicrophoneStatus::Denied | MicrophoneStatus::Restricted => {
            return PermissionStatus::Denied
        }
        MicrophoneStatus::NotDetermined | MicrophoneStatus::Unknown => {
            request_microphone_permission();
        }
    }

    let started = Instant::now();
    while started.elapsed() < poll_timeout {
        tokio::time::sleep(POLL_INTERVAL).await;
        match check_microphone_permission() {
            MicrophoneStatus::Authorized => return PermissionStatus::Granted,
            MicrophoneStatus::Denied | MicrophoneStatus::Restricted => {
                return PermissionStatus::Denied
            }
            _ => {}
        }
    }

    tracing::warn!(
        "Microphone prompt unanswered after {}s, treating as denied",
        poll_timeout.as_secs()
    );
    PermissionStatus::Denied
}

/// A voice reported by `say -v ?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// Locale as printed by `say`, e.g. `en_US`
    pub locale: String,
}

/// Parse the output of `say -v ?`
///
/// Lines look like `Bad News            en_US    # The light you see...`;
/// voice names may contain spaces.
pub fn parse_voices(output: &str) -> Vec<Voice> {
    output
        .lines()
        .filter_map(|line| {
            let spec = line.split('#').next()?.trim();
            let (name, locale) = spec.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() || locale.is_empty() {
                return None;
            }
            Some(Voice {
                name: name.to_string(),
                locale: locale.to_string(),
            })
        })
        .collect()
}

/// Pick a voice for `locale`: exact region match first, then language only
pub fn voice_for_locale<'a>(voices: &'a [Voice], locale: &str) -> Option<&'a Voice> {
    let wanted = locale.replace('_', "-").to_ascii_lowercase();
    let language = crate::synthesis::primary_language(locale);

    voices
        .iter()
        .find(|v| v.locale.replace('_', "-").to_ascii_lowercase() == wanted)
        .or_else(|| {
            voices
                .iter()
                .find(|v| crate::synthesis::primary_language(&v.locale) == language)
        })
}

/// Installed voices, listed once per process
static VOICES: OnceLock<Vec<Voice>> = OnceLock::new();

/// Voices reported by `say -v ?`; empty if the listing fails
pub fn installed_voices() -> &'static [Voice] {
    VOICES.get_or_init(|| match Command::new("say").args(["-v", "?"]).output() {
        Ok(listing) => parse_voices(&String::from_utf8_lossy(&listing.stdout)),
        Err(e) => {
            tracing::warn!("Failed to list voices: {}", e);
            Vec::new()
        }
    })
}

/// Speech output through `say`
pub struct SaySynthesizer;

impl SaySynthesizer {
    /// Lists voices on a background thread so the first `speak` does not wait
    pub fn new() -> Self {
        std::thread::spawn(|| {
            let count = installed_voices().len();
            tracing::debug!("Found {} voices", count);
        });
        Self
    }
}

impl Default for SaySynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSynthesizer for SaySynthesizer {
    fn speak(&self, utterance: &Utterance) -> anyhow::Result<()> {
        let mut command = Command::new("say");
        match voice_for_locale(installed_voices(), &utterance.locale) {
            Some(voice) => {
                tracing::debug!("Using voice {} for {}", voice.name, utterance.locale);
                command.args(["-v", &voice.name]);
            }
            None => tracing::warn!(
                "No voice for {}, using the system default",
                utterance.locale
            ),
        }

        let child = command
            .args(["-r", &utterance.words_per_minute().to_string(), "--"])
            .arg(&utterance.text)
            .spawn()
            .context("failed to start say")?;
        super::reap(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Alex                en_US    # Most people recognize me by my voice.
Bad News            en_US    # The light you see at the end of the tunnel.
Daniel              en_GB    # Hello, my name is Daniel.
Luciana             pt_BR    # Ola, o meu nome e a Luciana.
";

    #[test]
    fn test_parse_voices() {
        let voices = parse_voices(LISTING);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[1].name, "Bad News");
        assert_eq!(voices[1].locale, "en_US");
    }

    #[test]
    fn test_voice_for_locale() {
        let voices = parse_voices(LISTING);
        assert_eq!(voice_for_locale(&voices, "en-GB").unwrap().name, "Daniel");
        assert_eq!(voice_for_locale(&voices, "pt-PT").unwrap().name, "Luciana");
        assert!(voice_for_locale(&voices, "ja-JP").is_none());
    }

    #[test]
    fn test_voice_listing_is_cached() {
        assert!(std::ptr::eq(installed_voices(), installed_voices()));
    }

    #[test]
    fn test_microphone_status_from_raw() {
        assert_eq!(MicrophoneStatus::from(3), MicrophoneStatus::Authorized);
        assert_eq!(MicrophoneStatus::from(2), MicrophoneStatus::Denied);
        assert_eq!(MicrophoneStatus::from(42), MicrophoneStatus::Unknown);
    }
}
