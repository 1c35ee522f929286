//! Audio artifact storage
//!
//! The recording is written to one fixed file in the user's documents
//! directory. `probe_artifact` reads its stream parameters back with
//! symphonia for logging.

use serde::Serialize;
use std::path::{Path, PathBuf};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Document storage area for the platform
///
/// Falls back to the home directory and then the temp directory.
pub fn documents_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| {
            tracing::error!("Could not determine documents directory, using temp dir");
            std::env::temp_dir()
        })
}

/// Full path of the recording artifact
pub fn artifact_path(file_name: &str) -> PathBuf {
    documents_dir().join(file_name)
}

/// Stream parameters of a recorded artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub size_bytes: u64,
    pub duration_seconds: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
}

/// Read size, duration, and format of the artifact at `path`
pub fn probe_artifact(path: &Path) -> Result<ArtifactInfo, String> {
    let metadata = std::fs::metadata(path).map_err(|e| format!("Cannot read artifact: {}", e))?;

    let file = std::fs::File::open(path).map_err(|e| format!("Failed to open artifact: {}", e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("Unsupported audio format: {}", e))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "No audio track found in artifact".to_string())?;

    let params = &track.codec_params;
    let duration_seconds = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames as f64 / rate as f64),
        _ => None,
    };

    Ok(ArtifactInfo {
        size_bytes: metadata.len(),
        duration_seconds,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_uses_file_name() {
        let path = artifact_path("recording.m4a");
        assert!(path.ends_with("recording.m4a"));
        assert!(path.starts_with(documents_dir()));
    }

    #[test]
    fn test_probe_wav_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 12_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..12_000 {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let info = probe_artifact(&path).unwrap();
        assert_eq!(info.sample_rate, Some(12_000));
        assert_eq!(info.channels, Some(1));
        let duration = info.duration_seconds.unwrap();
        assert!((duration - 1.0).abs() < 0.01);
        assert!(info.size_bytes > 24_000);
    }

    #[test]
    fn test_probe_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = probe_artifact(&dir.path().join("missing.m4a")).unwrap_err();
        assert!(err.contains("Cannot read artifact"));
    }

    #[test]
    fn test_probe_garbage_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.m4a");
        std::fs::write(&path, b"not audio at all").unwrap();
        assert!(probe_artifact(&path).is_err());
    }
}
