//! Finds the transcoder locally or on the search path, and installs it into
//! the application directory when missing.

use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::archive::{self, ArchiveExtractionOutcome, ToolNames};
use super::session::{ProgressScale, ProvisioningSession, SessionGuard, SpeedMeter};
use super::sources::{Platform, ToolSource, ToolSources};
use super::validate::validate_executable;
use super::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolLocation {
    Local,
    SearchPath,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolState {
    pub path: PathBuf,
    pub location: ToolLocation,
    /// Validated and answered `-version`.
    pub runnable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub transcoder: ToolState,
    pub probe: ToolState,
}

impl ToolStatus {
    pub fn is_ready(&self) -> bool {
        self.transcoder.runnable
    }
}

/// Run `path -version` after validating the path.
pub async fn is_installed(path: &Path) -> bool {
    if let Err(e) = validate_executable(path) {
        debug!("{}", e);
        return false;
    }
    match Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("Failed to run {:?}: {}", path, e);
            false
        }
    }
}

pub struct ToolProvisioner {
    install_dir: PathBuf,
    names: ToolNames,
    sources: ToolSources,
    client: Client,
    /// Overrides `PATH` when looking tools up.
    search_path: Option<OsString>,
}

impl ToolProvisioner {
    /// Provisioner for the host platform.
    pub fn new(install_dir: PathBuf, client: Client) -> Result<Self, ToolError> {
        let platform = Platform::current()?;
        let sources = ToolSources::for_platform(platform)?;
        Ok(Self::with_sources(install_dir, platform, sources, client))
    }

    pub fn with_sources(
        install_dir: PathBuf,
        platform: Platform,
        sources: ToolSources,
        client: Client,
    ) -> Self {
        Self {
            install_dir,
            names: ToolNames::for_platform(platform),
            sources,
            client,
            search_path: None,
        }
    }

    fn local_path(&self, name: &str) -> PathBuf {
        self.install_dir.join(name)
    }

    /// Installed copy first, then the search path. A missing tool reports the
    /// path it would be installed to.
    fn locate(&self, name: &str) -> (PathBuf, ToolLocation) {
        let local = self.local_path(name);
        if local.is_file() {
            return (local, ToolLocation::Local);
        }
        let found = match &self.search_path {
            Some(paths) => which::which_in(name, Some(paths), &self.install_dir),
            None => which::which(name),
        };
        match found {
            Ok(found) => (found, ToolLocation::SearchPath),
            Err(_) => (local, ToolLocation::Missing),
        }
    }

    pub fn ffmpeg_path(&self) -> PathBuf {
        self.locate(self.names.transcoder).0
    }

    pub fn ffprobe_path(&self) -> Result<PathBuf, ToolError> {
        match self.locate(self.names.probe) {
            (_, ToolLocation::Missing) => {
                Err(ToolError::NotInstalled(self.names.probe.to_string()))
            }
            (path, _) => Ok(path),
        }
    }

    async fn state(&self, name: &str) -> ToolState {
        let (path, location) = self.locate(name);
        let runnable = location != ToolLocation::Missing && is_installed(&path).await;
        ToolState {
            path,
            location,
            runnable,
        }
    }

    pub async fn status(&self) -> ToolStatus {
        ToolStatus {
            transcoder: self.state(self.names.transcoder).await,
            probe: self.state(self.names.probe).await,
        }
    }

    pub async fn is_transcoder_installed(&self) -> bool {
        is_installed(&self.ffmpeg_path()).await
    }

    /// Whether the transcoder and the probe still have to be fetched. A
    /// runnable copy on the search path counts as present.
    async fn missing_tools(&self) -> (bool, bool) {
        (
            !self.state(self.names.transcoder).await.runnable,
            !self.state(self.names.probe).await.runnable,
        )
    }

    /// Download and extract the tools into the install directory.
    ///
    /// `on_progress` receives an overall percentage in 0..=100. When two
    /// archives are needed the first covers 0..50 and the second 50..100.
    pub async fn provision<F>(
        &self,
        session: &ProvisioningSession,
        on_progress: F,
    ) -> Result<(), ToolError>
    where
        F: Fn(u32) + Send + Sync,
    {
        tokio::fs::create_dir_all(&self.install_dir).await?;
        let guard = session.begin();

        let fetched_transcoder = match &self.sources.probe {
            None => {
                info!("Downloading {} archive", self.names.transcoder);
                self.fetch_and_extract(
                    &self.sources.transcoder,
                    &guard,
                    ProgressScale::FULL,
                    &on_progress,
                )
                .await?;
                true
            }
            Some(probe_source) => {
                let (need_transcoder, need_probe) = self.missing_tools().await;

                match (need_transcoder, need_probe) {
                    (false, false) => info!("Tools already installed in {:?}", self.install_dir),
                    (true, false) => {
                        self.fetch_and_extract(
                            &self.sources.transcoder,
                            &guard,
                            ProgressScale::FULL,
                            &on_progress,
                        )
                        .await?;
                    }
                    (false, true) => {
                        self.fetch_and_extract(
                            probe_source,
                            &guard,
                            ProgressScale::FULL,
                            &on_progress,
                        )
                        .await?;
                    }
                    (true, true) => {
                        self.fetch_and_extract(
                            &self.sources.transcoder,
                            &guard,
                            ProgressScale::FIRST_HALF,
                            &on_progress,
                        )
                        .await?;
                        self.fetch_and_extract(
                            probe_source,
                            &guard,
                            ProgressScale::SECOND_HALF,
                            &on_progress,
                        )
                        .await?;
                    }
                }
                need_transcoder
            }
        };

        let transcoder = if fetched_transcoder {
            self.local_path(self.names.transcoder)
        } else {
            self.ffmpeg_path()
        };
        if !is_installed(&transcoder).await {
            return Err(ToolError::Download(format!(
                "{} is not runnable after installation",
                transcoder.display()
            )));
        }

        on_progress(100);
        info!("Tools installed in {:?}", self.install_dir);
        Ok(())
    }

    async fn fetch_and_extract<F>(
        &self,
        source: &ToolSource,
        guard: &SessionGuard<'_>,
        scale: ProgressScale,
        on_progress: &F,
    ) -> Result<ArchiveExtractionOutcome, ToolError>
    where
        F: Fn(u32) + Send + Sync,
    {
        let staging = tempfile::Builder::new()
            .prefix("tool-download-")
            .suffix(source.kind.suffix())
            .tempfile_in(&self.install_dir)?;

        self.download(&source.url, staging.path(), guard, scale, on_progress)
            .await?;

        let outcome = archive::extract(
            source.kind,
            staging.path().to_path_buf(),
            self.install_dir.clone(),
            self.names,
        )
        .await?;

        if let Err(e) = staging.close() {
            warn!("Failed to remove staging file: {}", e);
        }
        Ok(outcome)
    }

    async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        guard: &SessionGuard<'_>,
        scale: ProgressScale,
        on_progress: &F,
    ) -> Result<(), ToolError>
    where
        F: Fn(u32) + Send + Sync,
    {
        debug!("Downloading tool archive from {}", url);
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Download(format!(
                "server returned status {}",
                response.status().as_u16()
            )));
        }

        let total = response.content_length().filter(|len| *len > 0);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut downloaded: u64 = 0;
        let mut meter = SpeedMeter::new(Instant::now());
        let mut last_reported = None;
        on_progress(scale.start);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::Download(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            guard.add_bytes(chunk.len() as u64);

            if let Some(speed) = meter.record(Instant::now(), chunk.len() as u64) {
                guard.set_speed(speed);
            }

            if let Some(total) = total {
                let percent = scale.scale(downloaded as f64 / total as f64);
                if last_reported != Some(percent) {
                    last_reported = Some(percent);
                    on_progress(percent);
                }
            }
        }
        file.flush().await?;

        info!(
            "Downloaded {:.2} MB from {}",
            downloaded as f64 / (1024.0 * 1024.0),
            url
        );
        on_progress(scale.end);
        Ok(())
    }
}
