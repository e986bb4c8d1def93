//! Locating, validating and installing the external transcoder.

pub mod archive;
pub mod provisioner;
pub mod session;
pub mod sources;
pub mod validate;

pub use archive::{ArchiveError, ArchiveExtractionOutcome, ArchiveKind, ToolNames};
pub use provisioner::{ToolLocation, ToolProvisioner, ToolState, ToolStatus};
pub use session::{ProgressScale, ProvisioningSession, SpeedMeter};
pub use sources::{Platform, ToolSource, ToolSources};
pub use validate::validate_executable;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid executable: {0}")]
    InvalidExecutable(String),

    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive extraction failed: {0}")]
    ArchiveExtraction(#[from] ArchiveError),

    #[error("Failed to decode tool source: {0}")]
    Source(#[from] crate::obfuscated::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
