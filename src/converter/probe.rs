//! File facts and ffprobe stream details.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::ConvertError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioFileInfo {
    pub path: PathBuf,
    pub filename: String,
    /// Lower-cased extension.
    pub format: String,
    pub size: u64,
}

pub async fn audio_file_info(path: &Path) -> std::io::Result<AudioFileInfo> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(AudioFileInfo {
        path: path.to_path_buf(),
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        format: path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
        size: meta.len(),
    })
}

/// Stream details reported by ffprobe.
#[derive(Debug, Clone)]
pub struct AudioStreamInfo {
    pub duration_ms: i64,
    pub codec: String,
    /// kbps
    pub bitrate: Option<i32>,
    pub sample_rate: Option<i32>,
    pub channels: Option<i32>,
    pub container: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<i32>,
    bit_rate: Option<String>,
}

fn parse_ffprobe_output(stdout: &str) -> Result<AudioStreamInfo, ConvertError> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)
        .map_err(|e| ConvertError::Probe(format!("JSON parse error: {}", e)))?;

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .ok_or_else(|| ConvertError::Probe("No audio stream found".to_string()))?;

    let duration_secs: f64 = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);

    let bitrate = audio
        .bit_rate
        .as_ref()
        .or(probe.format.bit_rate.as_ref())
        .and_then(|b| b.parse::<i64>().ok())
        .map(|b| (b / 1000) as i32);

    Ok(AudioStreamInfo {
        duration_ms: (duration_secs * 1000.0) as i64,
        codec: audio
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        bitrate,
        sample_rate: audio.sample_rate.as_ref().and_then(|sr| sr.parse().ok()),
        channels: audio.channels,
        container: probe.format.format_name,
    })
}

/// Run `ffprobe` on `path`.
pub async fn probe_audio_file(ffprobe: &Path, path: &Path) -> Result<AudioStreamInfo, ConvertError> {
    crate::tools::validate_executable(ffprobe)?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ConvertError::Probe(e.to_string()))?;

    if !output.status.success() {
        return Err(ConvertError::Probe(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }

    parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))
}
