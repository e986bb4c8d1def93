//! Tag reading and writing for audio containers.
//!
//! The pipelines only talk to [`TagCodec`]; [`LoftyTagCodec`] is the
//! implementation used by the binary.

mod lofty_codec;

pub use lofty_codec::LoftyTagCodec;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::TrackDescriptor;

/// Text written into the description field of every downloaded file.
pub const TAG_DESCRIPTION: &str = "https://github.com/tunefetch/tunefetch";

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Tag codec error: {0}")]
    Codec(#[from] lofty::error::LoftyError),

    #[error("No writable tag for {0}")]
    NoWritableTag(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat metadata record read from, or written to, an audio file.
///
/// Empty strings and zero numbers mean "absent" and are not written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub date: String,
    pub track_number: u32,
    pub total_tracks: u32,
    pub disc_number: u32,
    pub total_discs: u32,
    pub url: String,
    pub copyright: String,
    pub publisher: String,
    pub description: String,
    pub lyrics: String,
}

impl TrackTags {
    /// Build the record embedded into a freshly downloaded track.
    pub fn from_descriptor(track: &TrackDescriptor) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            album_artist: track.album_artist.clone(),
            date: track.release_date.clone(),
            // Players sort untagged tracks unpredictably; 1 is the safe default.
            track_number: track.track_number.max(1),
            total_tracks: track.total_tracks,
            disc_number: track.disc_number,
            total_discs: track.total_discs,
            url: track.source_url.clone().unwrap_or_default(),
            copyright: track.copyright.clone().unwrap_or_default(),
            publisher: track.publisher.clone().unwrap_or_default(),
            description: TAG_DESCRIPTION.to_string(),
            lyrics: String::new(),
        }
    }
}

/// Read/write access to tags, cover art and lyrics of audio files.
pub trait TagCodec: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<TrackTags, TagError>;

    /// Write the embedded cover (if any) to a temporary file and return its path.
    /// The caller owns the returned file and must delete it.
    fn extract_cover(&self, path: &Path) -> Result<Option<PathBuf>, TagError>;

    fn read_lyrics(&self, path: &Path) -> Result<Option<String>, TagError>;

    fn write_tags(
        &self,
        path: &Path,
        tags: &TrackTags,
        cover: Option<&Path>,
    ) -> Result<(), TagError>;

    fn write_lyrics(&self, path: &Path, lyrics: &str) -> Result<(), TagError>;
}
