//! Client for the delivery service that turns a source URL into a direct
//! file link, and the streaming download of that file.

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::progress::ProgressWriter;

/// Obfuscated base URL of the default delivery service.
pub const DEFAULT_DELIVERY_URL: &str = "aHR0cHM6Ly9hbWF6b24uYWZrYXJ4eXouZnVu";

/// Name used when the service does not report one.
pub const DEFAULT_FILE_NAME: &str = "track.flac";

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Delivery API error: {0}")]
    ConversionApi(String),

    #[error("Streaming failed: {0}")]
    Streaming(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct DeliveryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: DeliveryData,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryData {
    #[serde(default)]
    direct_link: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    file_size: i64,
}

fn path_illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("path chars regex is valid"))
}

/// Strip path-illegal characters from a service-provided file name, falling
/// back to [`DEFAULT_FILE_NAME`] when nothing usable remains.
pub fn delivery_file_name(raw: &str) -> String {
    let cleaned = path_illegal_chars().replace_all(raw.trim(), "").into_owned();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        DEFAULT_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

#[derive(Clone)]
pub struct DeliveryClient {
    client: Client,
    base_url: String,
}

impl DeliveryClient {
    pub fn new(client: Client, base_url: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Download the file behind `source_url` into `output_dir`.
    ///
    /// `quality` is accepted for forward compatibility; there is a single
    /// delivery path today. Bytes written are published to `progress`.
    /// A partially written file is removed before an error is returned.
    pub async fn download(
        &self,
        source_url: &str,
        output_dir: &Path,
        quality: &str,
        progress: Option<Arc<AtomicU64>>,
    ) -> Result<PathBuf, AcquisitionError> {
        debug!("Requesting direct link for {} (quality {})", source_url, quality);

        let url = format!("{}/convert", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("url", source_url)])
            .send()
            .await
            .map_err(|e| AcquisitionError::ConversionApi(e.to_string()))?;

        if response.status().as_u16() != 200 {
            return Err(AcquisitionError::ConversionApi(format!(
                "service returned status {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AcquisitionError::ConversionApi(e.to_string()))?;
        let parsed: DeliveryResponse = serde_json::from_slice(&body).map_err(|e| {
            AcquisitionError::ConversionApi(format!("failed to decode response: {}", e))
        })?;

        if !parsed.success || parsed.data.direct_link.is_empty() {
            return Err(AcquisitionError::ConversionApi(
                "service failed or returned no direct link".to_string(),
            ));
        }

        let file_name = delivery_file_name(&parsed.data.file_name);
        let file_path = output_dir.join(&file_name);
        if parsed.data.file_size > 0 {
            info!(
                "Downloading {} ({:.2} MB)",
                file_name,
                parsed.data.file_size as f64 / (1024.0 * 1024.0)
            );
        } else {
            info!("Downloading {}", file_name);
        }

        match self
            .stream_to_file(&parsed.data.direct_link, &file_path, progress)
            .await
        {
            Ok(total) => {
                info!(
                    "Downloaded {} ({:.2} MB)",
                    file_name,
                    total as f64 / (1024.0 * 1024.0)
                );
                Ok(file_path)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&file_path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial file {:?}: {}", file_path, rm);
                    }
                }
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        direct_link: &str,
        dest: &Path,
        progress: Option<Arc<AtomicU64>>,
    ) -> Result<u64, AcquisitionError> {
        let file = File::create(dest).await?;
        let mut writer = ProgressWriter::new(file);
        if let Some(counter) = progress {
            writer = writer.with_counter(counter);
        }

        let mut response = self
            .client
            .get(direct_link)
            .send()
            .await
            .map_err(|e| AcquisitionError::Streaming(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AcquisitionError::Streaming(format!(
                "direct link returned status {}",
                response.status().as_u16()
            )));
        }

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AcquisitionError::Streaming(e.to_string()))?
        {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| AcquisitionError::Streaming(e.to_string()))?;
        }
        writer
            .flush()
            .await
            .map_err(|e| AcquisitionError::Streaming(e.to_string()))?;

        Ok(writer.total())
    }
}
