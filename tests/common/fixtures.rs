//! Test doubles and builders shared by the end-to-end tests.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tunefetch::tagging::{TagCodec, TagError, TrackTags};

pub const FAKE_AUDIO: &[u8] = b"fLaC\x00\x00\x00\x22fake-audio-payload";

pub fn lookup_body(platform: &str, url: &str) -> String {
    let mut links = serde_json::Map::new();
    links.insert(
        platform.to_string(),
        serde_json::json!({ "url": url, "entityUniqueId": "X" }),
    );
    serde_json::json!({
        "entityUniqueId": "SPOTIFY_SONG::abc",
        "linksByPlatform": links
    })
    .to_string()
}

pub fn convert_body(success: bool, direct_link: &str, file_name: &str) -> String {
    serde_json::json!({
        "success": success,
        "data": {
            "direct_link": direct_link,
            "file_name": file_name,
            "file_size": FAKE_AUDIO.len()
        }
    })
    .to_string()
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("Failed to build reqwest client")
}

/// One recorded `write_tags` call.
#[derive(Debug, Clone)]
pub struct WrittenTags {
    pub path: PathBuf,
    pub tags: TrackTags,
    /// Cover path passed in, and whether it existed during the call.
    pub cover: Option<(PathBuf, bool)>,
}

/// Tag codec that records calls instead of touching audio containers.
pub struct RecordingTagCodec {
    cover_dir: PathBuf,
    read_tags: Option<TrackTags>,
    embedded_cover: bool,
    embedded_lyrics: Option<String>,
    covers_extracted: AtomicUsize,
    pub written: Mutex<Vec<WrittenTags>>,
    pub lyrics_written: Mutex<Vec<(PathBuf, String)>>,
    pub extracted_covers: Mutex<Vec<PathBuf>>,
}

impl RecordingTagCodec {
    pub fn new(cover_dir: &Path) -> Self {
        Self {
            cover_dir: cover_dir.to_path_buf(),
            read_tags: None,
            embedded_cover: false,
            embedded_lyrics: None,
            covers_extracted: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
            lyrics_written: Mutex::new(Vec::new()),
            extracted_covers: Mutex::new(Vec::new()),
        }
    }

    /// Pretend every input carries these tags, a cover and lyrics.
    pub fn with_source_metadata(mut self, tags: TrackTags, lyrics: &str) -> Self {
        self.read_tags = Some(tags);
        self.embedded_cover = true;
        self.embedded_lyrics = Some(lyrics.to_string());
        self
    }

    pub fn written(&self) -> Vec<WrittenTags> {
        self.written.lock().unwrap().clone()
    }
}

impl TagCodec for RecordingTagCodec {
    fn read_tags(&self, _path: &Path) -> Result<TrackTags, TagError> {
        Ok(self.read_tags.clone().unwrap_or_default())
    }

    fn extract_cover(&self, _path: &Path) -> Result<Option<PathBuf>, TagError> {
        if !self.embedded_cover {
            return Ok(None);
        }
        let n = self.covers_extracted.fetch_add(1, Ordering::SeqCst);
        let path = self.cover_dir.join(format!("extracted-cover-{}.jpg", n));
        std::fs::write(&path, b"jpeg")?;
        self.extracted_covers.lock().unwrap().push(path.clone());
        Ok(Some(path))
    }

    fn read_lyrics(&self, _path: &Path) -> Result<Option<String>, TagError> {
        Ok(self.embedded_lyrics.clone())
    }

    fn write_tags(
        &self,
        path: &Path,
        tags: &TrackTags,
        cover: Option<&Path>,
    ) -> Result<(), TagError> {
        self.written.lock().unwrap().push(WrittenTags {
            path: path.to_path_buf(),
            tags: tags.clone(),
            cover: cover.map(|c| (c.to_path_buf(), c.exists())),
        });
        Ok(())
    }

    fn write_lyrics(&self, path: &Path, lyrics: &str) -> Result<(), TagError> {
        self.lyrics_written
            .lock()
            .unwrap()
            .push((path.to_path_buf(), lyrics.to_string()));
        Ok(())
    }
}

/// A shell script standing in for ffmpeg. It answers `-version`, logs every
/// other invocation to `calls.log` next to itself, fails for inputs whose
/// path contains `broken`, and otherwise writes its last argument.
pub const FAKE_FFMPEG_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version test"
  exit 0
fi
echo "$@" >> "$(dirname "$0")/calls.log"
for last; do :; done
case "$2" in
  *broken*)
    echo "broken input: invalid data found" >&2
    exit 1
    ;;
esac
echo converted > "$last"
"#;

#[cfg(unix)]
pub fn write_executable(path: &Path, content: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
pub fn install_fake_ffmpeg(dir: &Path) -> PathBuf {
    let path = dir.join("ffmpeg");
    write_executable(&path, FAKE_FFMPEG_SCRIPT);
    path
}

pub fn read_calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .map(|s| s.lines().map(String::from).collect())
        .unwrap_or_default()
}

/// Zip archive bytes with the given `(name, content, mode)` entries.
pub fn zip_bytes(entries: &[(&str, &str, u32)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content, mode) in entries {
        let options = zip::write::SimpleFileOptions::default().unix_permissions(*mode);
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Tar archive compressed with xz.
pub fn tar_xz_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
