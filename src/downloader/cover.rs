//! Cover-art download used by the embedding step.

use anyhow::{Context, Result};
use reqwest::Client;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Size markers used by catalog image URLs. The last one is the full-size
/// original.
const SMALL_COVER_MARKER: &str = "ab67616d00001e02";
const MEDIUM_COVER_MARKER: &str = "ab67616d0000b273";
const MAX_COVER_MARKER: &str = "ab67616d000082c1";

/// Rewrite a catalog image URL to its highest-resolution variant.
/// URLs without a known size marker are returned unchanged.
pub fn max_quality_cover_url(url: &str) -> String {
    for marker in [SMALL_COVER_MARKER, MEDIUM_COVER_MARKER] {
        if url.contains(marker) {
            return url.replacen(marker, MAX_COVER_MARKER, 1);
        }
    }
    url.to_string()
}

#[derive(Clone)]
pub struct CoverClient {
    client: Client,
}

impl CoverClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Download the image at `url` to `dest`, returning the number of bytes
    /// written.
    pub async fn download_to(&self, url: &str, dest: &Path, max_quality: bool) -> Result<u64> {
        let url = if max_quality {
            max_quality_cover_url(url)
        } else {
            url.to_string()
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to connect for cover download")?;

        if !response.status().is_success() {
            anyhow::bail!("Cover download failed with status: {}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read cover body")?;

        let mut file = File::create(dest)
            .await
            .context("Failed to create cover file")?;
        file.write_all(&bytes)
            .await
            .context("Failed to write cover file")?;
        file.flush().await.context("Failed to flush cover file")?;

        Ok(bytes.len() as u64)
    }
}
