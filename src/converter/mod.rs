//! Batch audio conversion through the external transcoder.
//!
//! Each input file gets its own task. Failures are recorded in that file's
//! [`ConvertResult`] and never affect the rest of the batch.

mod args;
mod probe;

pub use args::build_ffmpeg_args;
pub use probe::{audio_file_info, probe_audio_file, AudioFileInfo, AudioStreamInfo};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::tagging::{TagCodec, TrackTags};
use crate::tools::{self, ToolError};

pub const SAME_FORMAT_ERROR: &str = "Input and output formats are the same";

/// Errors that reject a whole batch. Per-file problems end up in
/// [`ConvertResult::error`].
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Transcoder not available at {0}")]
    ToolMissing(PathBuf),

    #[error(transparent)]
    InvalidExecutable(#[from] ToolError),

    #[error("ffprobe failed: {0}")]
    Probe(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub input_files: Vec<PathBuf>,
    pub output_format: String,
    pub bitrate: String,
    #[serde(default)]
    pub codec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertResult {
    pub input_file: PathBuf,
    pub output_file: Option<PathBuf>,
    pub success: bool,
    pub error: Option<String>,
}

impl ConvertResult {
    fn ok(input: &Path, output: PathBuf) -> Self {
        Self {
            input_file: input.to_path_buf(),
            output_file: Some(output),
            success: true,
            error: None,
        }
    }

    fn failed(input: &Path, output: Option<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            input_file: input.to_path_buf(),
            output_file: output,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// `<input dir>/<FORMAT>/<input stem>.<format>`
pub fn output_path_for(input: &Path, format: &str) -> PathBuf {
    let format = format.to_lowercase();
    let dir = input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format.to_uppercase());
    let mut name = input.file_stem().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(&format);
    dir.join(name)
}

/// Metadata carried from the input to the converted file.
#[derive(Default)]
struct CarriedMetadata {
    tags: Option<TrackTags>,
    cover: Option<PathBuf>,
    lyrics: Option<String>,
}

impl CarriedMetadata {
    fn read(codec: &dyn TagCodec, path: &Path) -> Self {
        let tags = codec
            .read_tags(path)
            .map_err(|e| warn!("Failed to read tags from {:?}: {}", path, e))
            .ok();
        let cover = codec
            .extract_cover(path)
            .map_err(|e| warn!("Failed to extract cover from {:?}: {}", path, e))
            .ok()
            .flatten();
        let lyrics = codec
            .read_lyrics(path)
            .map_err(|e| warn!("Failed to read lyrics from {:?}: {}", path, e))
            .ok()
            .flatten()
            .filter(|l| !l.is_empty());
        Self {
            tags,
            cover,
            lyrics,
        }
    }

    fn write(&self, codec: &dyn TagCodec, path: &Path) {
        if self.tags.is_some() || self.cover.is_some() {
            let tags = self.tags.clone().unwrap_or_default();
            if let Err(e) = codec.write_tags(path, &tags, self.cover.as_deref()) {
                warn!("Failed to embed metadata into {:?}: {}", path, e);
            }
        }
        if let Some(lyrics) = &self.lyrics {
            if let Err(e) = codec.write_lyrics(path, lyrics) {
                warn!("Failed to embed lyrics into {:?}: {}", path, e);
            }
        }
    }

    fn discard_cover(&self) {
        if let Some(cover) = &self.cover {
            if let Err(e) = std::fs::remove_file(cover) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove temporary cover {:?}: {}", cover, e);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct AudioConverter {
    ffmpeg: PathBuf,
    tags: Arc<dyn TagCodec>,
}

impl AudioConverter {
    pub fn new(ffmpeg: PathBuf, tags: Arc<dyn TagCodec>) -> Self {
        Self { ffmpeg, tags }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Convert every input. The result list has one entry per input, in
    /// input order.
    pub async fn convert_batch(
        &self,
        request: &ConvertRequest,
    ) -> Result<Vec<ConvertResult>, ConvertError> {
        tools::validate_executable(&self.ffmpeg)?;
        if !tools::provisioner::is_installed(&self.ffmpeg).await {
            return Err(ConvertError::ToolMissing(self.ffmpeg.clone()));
        }

        info!(
            "Converting {} file(s) to {}",
            request.input_files.len(),
            request.output_format
        );

        let slots: Arc<Mutex<Vec<Option<ConvertResult>>>> =
            Arc::new(Mutex::new(vec![None; request.input_files.len()]));

        let handles: Vec<_> = request
            .input_files
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, input)| {
                let converter = self.clone();
                let slots = slots.clone();
                let format = request.output_format.to_lowercase();
                let bitrate = request.bitrate.clone();
                let codec = request.codec.clone();
                tokio::spawn(async move {
                    let result = converter
                        .convert_file(&input, &format, &bitrate, codec.as_deref())
                        .await;
                    slots.lock().await[index] = Some(result);
                })
            })
            .collect();

        let joined_all = futures::future::join_all(handles).await;
        for (index, joined) in joined_all.into_iter().enumerate() {
            if let Err(e) = joined {
                warn!("Conversion task {} did not finish: {}", index, e);
            }
        }

        let mut slots = slots.lock().await;
        let results = slots
            .iter_mut()
            .zip(&request.input_files)
            .map(|(slot, input)| {
                slot.take().unwrap_or_else(|| {
                    ConvertResult::failed(input, None, "conversion task aborted")
                })
            })
            .collect();
        Ok(results)
    }

    async fn convert_file(
        &self,
        input: &Path,
        format: &str,
        bitrate: &str,
        codec: Option<&str>,
    ) -> ConvertResult {
        let input_ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if input_ext == format {
            return ConvertResult::failed(input, None, SAME_FORMAT_ERROR);
        }

        let output = output_path_for(input, format);
        if let Some(dir) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                return ConvertResult::failed(
                    input,
                    None,
                    format!("failed to create output directory: {}", e),
                );
            }
        }

        let args = build_ffmpeg_args(input, &output, format, bitrate, codec);

        let codec_handle = self.tags.clone();
        let source = input.to_path_buf();
        let carried = tokio::task::spawn_blocking(move || {
            CarriedMetadata::read(codec_handle.as_ref(), &source)
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Metadata read task failed: {}", e);
            CarriedMetadata::default()
        });

        debug!("Running {:?} {:?}", self.ffmpeg, args);
        let run = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let failure = match run {
            Ok(out) if out.status.success() => None,
            Ok(out) => {
                let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&out.stderr));
                Some(format!("conversion failed: {} - {}", out.status, combined.trim()))
            }
            Err(e) => Some(format!("conversion failed: {}", e)),
        };

        if let Some(error) = failure {
            warn!("Failed to convert {:?}: {}", input, error);
            carried.discard_cover();
            if let Err(e) = tokio::fs::remove_file(&output).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial output {:?}: {}", output, e);
                }
            }
            return ConvertResult::failed(input, None, error);
        }

        let codec_handle = self.tags.clone();
        let target = output.clone();
        let embedded = tokio::task::spawn_blocking(move || {
            carried.write(codec_handle.as_ref(), &target);
            carried.discard_cover();
        })
        .await;
        if let Err(e) = embedded {
            warn!("Metadata write task failed for {:?}: {}", output, e);
        }

        info!("Converted {:?} -> {:?}", input, output);
        ConvertResult::ok(input, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("/music/track.flac"), "mp3"),
            PathBuf::from("/music/MP3/track.mp3")
        );
        assert_eq!(
            output_path_for(Path::new("/music/a.b.flac"), "M4A"),
            PathBuf::from("/music/M4A/a.b.m4a")
        );
    }

    #[test]
    fn test_failed_result_shape() {
        let r = ConvertResult::failed(Path::new("/a.mp3"), None, SAME_FORMAT_ERROR);
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some(SAME_FORMAT_ERROR));
        assert!(r.output_file.is_none());
    }
}
