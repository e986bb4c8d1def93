//! [`TagCodec`] implementation on top of lofty.

use lofty::config::WriteOptions;
use lofty::file::TaggedFile;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{TagCodec, TagError, TrackTags};

#[derive(Debug, Clone, Default)]
pub struct LoftyTagCodec;

impl LoftyTagCodec {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> Result<TaggedFile, TagError> {
        Ok(Probe::open(path)?.read()?)
    }

    /// Return the primary tag, inserting an empty one of the container's
    /// native type when the file has none yet.
    fn primary_tag_mut<'a>(
        tagged_file: &'a mut TaggedFile,
        path: &Path,
    ) -> Result<&'a mut Tag, TagError> {
        if tagged_file.primary_tag().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        tagged_file
            .primary_tag_mut()
            .ok_or_else(|| TagError::NoWritableTag(path.to_path_buf()))
    }
}

fn text(tag: &Tag, key: ItemKey) -> String {
    tag.get_string(&key).unwrap_or_default().to_string()
}

fn insert_if_present(tag: &mut Tag, key: ItemKey, value: &str) {
    if !value.is_empty() {
        tag.insert_text(key, value.to_string());
    }
}

fn mime_for(path: &Path) -> MimeType {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => MimeType::Png,
        _ => MimeType::Jpeg,
    }
}

impl TagCodec for LoftyTagCodec {
    fn read_tags(&self, path: &Path) -> Result<TrackTags, TagError> {
        let tagged_file = Self::open(path)?;
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            debug!("No tags found in {:?}", path);
            return Ok(TrackTags::default());
        };

        let date = tag
            .get_string(&ItemKey::RecordingDate)
            .or_else(|| tag.get_string(&ItemKey::Year))
            .unwrap_or_default()
            .to_string();

        Ok(TrackTags {
            title: tag.title().map(|s| s.to_string()).unwrap_or_default(),
            artist: tag.artist().map(|s| s.to_string()).unwrap_or_default(),
            album: tag.album().map(|s| s.to_string()).unwrap_or_default(),
            album_artist: text(tag, ItemKey::AlbumArtist),
            date,
            track_number: tag.track().unwrap_or(0),
            total_tracks: tag.track_total().unwrap_or(0),
            disc_number: tag.disk().unwrap_or(0),
            total_discs: tag.disk_total().unwrap_or(0),
            url: text(tag, ItemKey::AudioSourceUrl),
            copyright: text(tag, ItemKey::CopyrightMessage),
            publisher: text(tag, ItemKey::Publisher),
            description: tag.comment().map(|s| s.to_string()).unwrap_or_default(),
            lyrics: text(tag, ItemKey::Lyrics),
        })
    }

    fn extract_cover(&self, path: &Path) -> Result<Option<PathBuf>, TagError> {
        let tagged_file = Self::open(path)?;
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(None);
        };

        let pictures = tag.pictures();
        let Some(picture) = pictures
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.first())
        else {
            return Ok(None);
        };

        let ext = match picture.mime_type() {
            Some(MimeType::Png) => "png",
            _ => "jpg",
        };
        let cover_path =
            std::env::temp_dir().join(format!("cover-{}.{}", uuid::Uuid::new_v4(), ext));
        std::fs::write(&cover_path, picture.data())?;
        debug!("Extracted cover from {:?} to {:?}", path, cover_path);

        Ok(Some(cover_path))
    }

    fn read_lyrics(&self, path: &Path) -> Result<Option<String>, TagError> {
        let tagged_file = Self::open(path)?;
        let lyrics = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .and_then(|tag| tag.get_string(&ItemKey::Lyrics))
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string());
        Ok(lyrics)
    }

    fn write_tags(
        &self,
        path: &Path,
        tags: &TrackTags,
        cover: Option<&Path>,
    ) -> Result<(), TagError> {
        let mut tagged_file = Self::open(path)?;
        let tag = Self::primary_tag_mut(&mut tagged_file, path)?;

        if !tags.title.is_empty() {
            tag.set_title(tags.title.clone());
        }
        if !tags.artist.is_empty() {
            tag.set_artist(tags.artist.clone());
        }
        if !tags.album.is_empty() {
            tag.set_album(tags.album.clone());
        }
        if !tags.description.is_empty() {
            tag.set_comment(tags.description.clone());
        }
        insert_if_present(tag, ItemKey::AlbumArtist, &tags.album_artist);
        insert_if_present(tag, ItemKey::RecordingDate, &tags.date);
        insert_if_present(tag, ItemKey::AudioSourceUrl, &tags.url);
        insert_if_present(tag, ItemKey::CopyrightMessage, &tags.copyright);
        insert_if_present(tag, ItemKey::Publisher, &tags.publisher);
        insert_if_present(tag, ItemKey::Lyrics, &tags.lyrics);

        if tags.track_number > 0 {
            tag.set_track(tags.track_number);
        }
        if tags.total_tracks > 0 {
            tag.set_track_total(tags.total_tracks);
        }
        if tags.disc_number > 0 {
            tag.set_disk(tags.disc_number);
        }
        if tags.total_discs > 0 {
            tag.set_disk_total(tags.total_discs);
        }

        if let Some(cover) = cover {
            let data = std::fs::read(cover)?;
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(Picture::new_unchecked(
                PictureType::CoverFront,
                Some(mime_for(cover)),
                None,
                data,
            ));
        }

        tag.save_to_path(path, WriteOptions::default())?;
        Ok(())
    }

    fn write_lyrics(&self, path: &Path, lyrics: &str) -> Result<(), TagError> {
        let mut tagged_file = Self::open(path)?;
        let tag = Self::primary_tag_mut(&mut tagged_file, path)?;
        tag.insert_text(ItemKey::Lyrics, lyrics.to_string());
        tag.save_to_path(path, WriteOptions::default())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for(Path::new("/tmp/a.png")), MimeType::Png);
        assert_eq!(mime_for(Path::new("/tmp/a.PNG")), MimeType::Png);
        assert_eq!(mime_for(Path::new("/tmp/a.jpg")), MimeType::Jpeg);
        assert_eq!(mime_for(Path::new("/tmp/a.cover")), MimeType::Jpeg);
    }

    #[test]
    fn test_read_tags_on_non_audio_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("not-audio.flac");
        std::fs::write(&path, b"definitely not flac").unwrap();

        let codec = LoftyTagCodec::new();
        assert!(codec.read_tags(&path).is_err());
        assert!(codec.write_lyrics(&path, "la la").is_err());
    }
}
