//! Per-track pipeline: dedup check, source resolution, acquisition, rename
//! and metadata embedding.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::cover::CoverClient;
use super::delivery::{AcquisitionError, DeliveryClient};
use super::naming::{existing_file_size, expected_path, NamingOptions};
use super::resolver::{ResolveError, SourceResolver};
use crate::catalog::TrackDescriptor;
use crate::history::{HistoryItem, HistoryStore};
use crate::tagging::{TagCodec, TrackTags};

/// Quality requested when the caller does not pick one.
pub const DEFAULT_QUALITY: &str = "LOSSLESS";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("Failed to create output directory {0:?}: {1}")]
    OutputDir(PathBuf, std::io::Error),
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub track: TrackDescriptor,
    pub output_dir: PathBuf,
    /// Threaded through to the delivery call; does not change behavior.
    pub quality: String,
    pub naming: NamingOptions,
    /// Position in the current batch, used for track-number prefixes.
    pub position: Option<u32>,
    pub embed_max_quality_cover: bool,
}

impl DownloadRequest {
    pub fn new(track: TrackDescriptor, output_dir: PathBuf) -> Self {
        Self {
            track,
            output_dir,
            quality: DEFAULT_QUALITY.to_string(),
            naming: NamingOptions::default(),
            position: None,
            embed_max_quality_cover: false,
        }
    }

    fn expected_path(&self) -> Option<PathBuf> {
        if !self.track.has_naming_info() {
            return None;
        }
        Some(expected_path(
            &self.output_dir,
            &self.track,
            &self.naming,
            self.position,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    Downloaded(PathBuf),
    AlreadyExists(PathBuf),
}

impl AcquisitionOutcome {
    pub fn path(&self) -> &Path {
        match self {
            AcquisitionOutcome::Downloaded(path) | AcquisitionOutcome::AlreadyExists(path) => path,
        }
    }

    pub fn already_existed(&self) -> bool {
        matches!(self, AcquisitionOutcome::AlreadyExists(_))
    }
}

pub struct TrackDownloader {
    resolver: SourceResolver,
    delivery: DeliveryClient,
    covers: CoverClient,
    tags: Arc<dyn TagCodec>,
    history: Option<Arc<dyn HistoryStore>>,
    progress: Arc<AtomicU64>,
}

impl TrackDownloader {
    pub fn new(
        resolver: SourceResolver,
        delivery: DeliveryClient,
        covers: CoverClient,
        tags: Arc<dyn TagCodec>,
    ) -> Self {
        Self {
            resolver,
            delivery,
            covers,
            tags,
            history: None,
            progress: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Bytes written so far by the current (or last) download.
    pub fn bytes_downloaded(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Shared counter updated while a file streams.
    pub fn progress_counter(&self) -> Arc<AtomicU64> {
        self.progress.clone()
    }

    /// Download the track identified by `request.track.id`.
    ///
    /// An existing non-empty file at the expected path short-circuits before
    /// any network call.
    pub async fn download_by_track_id(
        &self,
        request: &DownloadRequest,
    ) -> Result<AcquisitionOutcome, PipelineError> {
        if request.track.id.trim().is_empty() {
            return Err(ResolveError::InvalidTrackId.into());
        }
        Self::prepare_output_dir(&request.output_dir).await?;

        if let Some(existing) = Self::find_existing(request).await {
            return Ok(AcquisitionOutcome::AlreadyExists(existing));
        }

        let source_url = self.resolver.resolve(&request.track.id).await?;

        self.acquire(&source_url, request).await
    }

    /// Download from an already-resolved source URL.
    pub async fn download_by_source_url(
        &self,
        source_url: &str,
        request: &DownloadRequest,
    ) -> Result<AcquisitionOutcome, PipelineError> {
        Self::prepare_output_dir(&request.output_dir).await?;

        if let Some(existing) = Self::find_existing(request).await {
            return Ok(AcquisitionOutcome::AlreadyExists(existing));
        }

        self.acquire(source_url, request).await
    }

    async fn prepare_output_dir(dir: &Path) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| PipelineError::OutputDir(dir.to_path_buf(), e))
    }

    async fn find_existing(request: &DownloadRequest) -> Option<PathBuf> {
        let path = request.expected_path()?;
        let size = existing_file_size(&path).await?;
        info!(
            "File already exists: {:?} ({:.2} MB)",
            path,
            size as f64 / (1024.0 * 1024.0)
        );
        Some(path)
    }

    async fn acquire(
        &self,
        source_url: &str,
        request: &DownloadRequest,
    ) -> Result<AcquisitionOutcome, PipelineError> {
        let downloaded = self
            .delivery
            .download(
                source_url,
                &request.output_dir,
                &request.quality,
                Some(self.progress.clone()),
            )
            .await?;

        let path = match request.expected_path() {
            Some(target) if target != downloaded => {
                match tokio::fs::rename(&downloaded, &target).await {
                    Ok(()) => {
                        info!("Renamed to {:?}", target);
                        target
                    }
                    Err(e) => {
                        warn!("Failed to rename {:?} to {:?}: {}", downloaded, target, e);
                        downloaded
                    }
                }
            }
            _ => downloaded,
        };

        self.embed_metadata(&path, source_url, request).await;
        self.record_history(&path, request);

        Ok(AcquisitionOutcome::Downloaded(path))
    }

    async fn embed_metadata(&self, path: &Path, source_url: &str, request: &DownloadRequest) {
        let cover_path = cover_path_for(path);
        let cover = match request.track.cover_url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => match self
                .covers
                .download_to(url, &cover_path, request.embed_max_quality_cover)
                .await
            {
                Ok(bytes) => {
                    debug!("Downloaded cover ({} bytes)", bytes);
                    Some(cover_path.clone())
                }
                Err(e) => {
                    warn!("Failed to download cover: {:#}", e);
                    None
                }
            },
            None => None,
        };

        let mut tags = TrackTags::from_descriptor(&request.track);
        if tags.url.is_empty() {
            tags.url = source_url.to_string();
        }

        let codec = self.tags.clone();
        let target = path.to_path_buf();
        let cover_for_task = cover.clone();
        let result = tokio::task::spawn_blocking(move || {
            codec.write_tags(&target, &tags, cover_for_task.as_deref())
        })
        .await;

        match result {
            Ok(Ok(())) => debug!("Embedded metadata into {:?}", path),
            Ok(Err(e)) => warn!("Failed to embed metadata into {:?}: {}", path, e),
            Err(e) => warn!("Metadata task failed for {:?}: {}", path, e),
        }

        if let Err(e) = tokio::fs::remove_file(&cover_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove cover file {:?}: {}", cover_path, e);
            }
        }
    }

    fn record_history(&self, path: &Path, request: &DownloadRequest) {
        let Some(history) = &self.history else {
            return;
        };
        let item = HistoryItem::for_download(&request.track, &request.quality, path);
        if let Err(e) = history.add(&item) {
            warn!("Failed to record download history: {:#}", e);
        }
    }
}

/// `<file>.cover.jpg` next to the downloaded file.
pub fn cover_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".cover.jpg");
    path.with_file_name(name)
}
