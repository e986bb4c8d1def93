//! Tunefetch library
//!
//! Resolves catalog tracks to downloadable sources, downloads and tags them,
//! and converts audio through a provisioned ffmpeg.

pub mod catalog;
pub mod config;
pub mod converter;
pub mod downloader;
pub mod history;
pub mod obfuscated;
pub mod tagging;
pub mod tools;

pub use catalog::{CatalogApiClient, CatalogClient, CatalogEntity, TrackDescriptor};
pub use converter::{AudioConverter, ConvertRequest, ConvertResult};
pub use downloader::{AcquisitionOutcome, DownloadRequest, TrackDownloader};
pub use history::{HistoryStore, SqliteHistoryStore};
pub use tagging::{LoftyTagCodec, TagCodec};
pub use tools::{ProvisioningSession, ToolProvisioner};
