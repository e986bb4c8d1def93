//! Pulls the transcoder and probe executables out of downloaded archives.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::sources::Platform;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Neither {0} nor {1} found in archive")]
    NoExecutableFound(String, String),

    #[error("Zip error: {0}")]
    Zip(String),

    #[error("Tar error: {0}")]
    Tar(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// File names of the two executables on a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolNames {
    pub transcoder: &'static str,
    pub probe: &'static str,
}

impl ToolNames {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => ToolNames {
                transcoder: "ffmpeg.exe",
                probe: "ffprobe.exe",
            },
            Platform::Linux | Platform::MacOs => ToolNames {
                transcoder: "ffmpeg",
                probe: "ffprobe",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarXz,
}

impl ArchiveKind {
    /// Linux builds and anything named `.tar.xz` are xz-compressed tarballs;
    /// everything else is a zip.
    pub fn from_url(url: &str, platform: Platform) -> Self {
        if url.ends_with(".tar.xz") || platform == Platform::Linux {
            ArchiveKind::TarXz
        } else {
            ArchiveKind::Zip
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => ".zip",
            ArchiveKind::TarXz => ".tar.xz",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveExtractionOutcome {
    pub found_transcoder: bool,
    pub found_probe: bool,
}

impl ArchiveExtractionOutcome {
    fn finish(self, names: &ToolNames) -> Result<Self, ArchiveError> {
        if !self.found_transcoder && !self.found_probe {
            return Err(ArchiveError::NoExecutableFound(
                names.transcoder.to_string(),
                names.probe.to_string(),
            ));
        }
        Ok(self)
    }
}

/// Which executable, if any, an archive entry is.
fn match_entry(entry_name: &str, names: &ToolNames) -> Option<&'static str> {
    let normalized = entry_name.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default();
    [names.transcoder, names.probe]
        .into_iter()
        .find(|candidate| base == *candidate)
}

fn write_executable(reader: &mut impl Read, dest: &Path) -> Result<(), ArchiveError> {
    let mut out = File::create(dest)?;
    std::io::copy(reader, &mut out)?;
    out.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn record(outcome: &mut ArchiveExtractionOutcome, name: &str, names: &ToolNames) {
    if name == names.transcoder {
        outcome.found_transcoder = true;
    } else if name == names.probe {
        outcome.found_probe = true;
    }
}

pub fn extract_zip(
    archive_path: &Path,
    dest_dir: &Path,
    names: &ToolNames,
) -> Result<ArchiveExtractionOutcome, ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Zip(e.to_string()))?;
    let mut outcome = ArchiveExtractionOutcome::default();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Zip(e.to_string()))?;
        if !entry.is_file() {
            continue;
        }
        let Some(name) = match_entry(entry.name(), names) else {
            continue;
        };

        let dest = dest_dir.join(name);
        debug!("Extracting {} to {:?}", entry.name(), dest);
        write_executable(&mut entry, &dest)?;
        record(&mut outcome, name, names);
    }

    outcome.finish(names)
}

pub fn extract_tar_xz(
    archive_path: &Path,
    dest_dir: &Path,
    names: &ToolNames,
) -> Result<ArchiveExtractionOutcome, ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive = tar::Archive::new(xz2::read::XzDecoder::new(file));
    let mut outcome = ArchiveExtractionOutcome::default();

    let entries = archive
        .entries()
        .map_err(|e| ArchiveError::Tar(format!("read entries: {}", e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::Tar(format!("read entry: {}", e)))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_name = entry
            .path()
            .map_err(|e| ArchiveError::Tar(format!("read entry path: {}", e)))?
            .to_string_lossy()
            .into_owned();
        let Some(name) = match_entry(&entry_name, names) else {
            continue;
        };

        let dest = dest_dir.join(name);
        debug!("Extracting {} to {:?}", entry_name, dest);
        write_executable(&mut entry, &dest)?;
        record(&mut outcome, name, names);
    }

    outcome.finish(names)
}

/// Extract on the blocking pool.
pub async fn extract(
    kind: ArchiveKind,
    archive_path: PathBuf,
    dest_dir: PathBuf,
    names: ToolNames,
) -> Result<ArchiveExtractionOutcome, ArchiveError> {
    let outcome = tokio::task::spawn_blocking(move || match kind {
        ArchiveKind::Zip => extract_zip(&archive_path, &dest_dir, &names),
        ArchiveKind::TarXz => extract_tar_xz(&archive_path, &dest_dir, &names),
    })
    .await
    .map_err(std::io::Error::other)??;

    info!(
        "Extracted archive (transcoder: {}, probe: {})",
        outcome.found_transcoder, outcome.found_probe
    );
    Ok(outcome)
}
