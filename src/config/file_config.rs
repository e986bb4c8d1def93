use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub app_dir: Option<String>,
    pub output_dir: Option<String>,
    pub http_timeout_sec: Option<u64>,
    pub history_enabled: Option<bool>,

    pub naming: Option<NamingConfig>,
    pub services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NamingConfig {
    /// `title-artist`, `artist-title`, `title`, or a `{placeholder}` template.
    pub filename_format: Option<String>,
    pub include_track_number: Option<bool>,
    pub embed_max_quality_cover: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ServicesConfig {
    pub link_lookup_url: Option<String>,
    pub delivery_url: Option<String>,
    pub catalog_api_url: Option<String>,
    pub catalog_track_base: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
output_dir = "/music"
http_timeout_sec = 30

[naming]
filename_format = "{{track}}. {{title}}"
include_track_number = true

[services]
catalog_api_url = "http://catalog.local"
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.output_dir.as_deref(), Some("/music"));
        assert_eq!(config.http_timeout_sec, Some(30));
        let naming = config.naming.unwrap();
        assert_eq!(naming.filename_format.as_deref(), Some("{track}. {title}"));
        assert_eq!(naming.include_track_number, Some(true));
        assert!(naming.embed_max_quality_cover.is_none());
        assert_eq!(
            config.services.unwrap().catalog_api_url.as_deref(),
            Some("http://catalog.local")
        );
        assert!(config.history_enabled.is_none());
    }

    #[test]
    fn test_load_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.app_dir.is_none());
        assert!(config.naming.is_none());
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_dir = ").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
    }
}
