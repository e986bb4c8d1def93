//! Where the transcoder archives come from on each platform.

use super::archive::ArchiveKind;
use super::ToolError;
use crate::obfuscated;

const WINDOWS_ARCHIVE: &str = "aHR0cHM6Ly9naXRodWIuY29tL0J0Yk4vRkZtcGVnLUJ1aWxkcy9yZWxlYXNlcy9kb3dubG9hZC9sYXRlc3QvZmZtcGVnLW1hc3Rlci1sYXRlc3Qtd2luNjQtZ3BsLnppcA==";
const LINUX_ARCHIVE: &str = "aHR0cHM6Ly9naXRodWIuY29tL0J0Yk4vRkZtcGVnLUJ1aWxkcy9yZWxlYXNlcy9kb3dubG9hZC9sYXRlc3QvZmZtcGVnLW1hc3Rlci1sYXRlc3QtbGludXg2NC1ncGwudGFyLnh6";
const MACOS_TRANSCODER_ARCHIVE: &str = "aHR0cHM6Ly9ldmVybWVldC5jeC9mZm1wZWcvZ2V0cmVsZWFzZS96aXA=";
const MACOS_PROBE_ARCHIVE: &str = "aHR0cHM6Ly9ldmVybWVldC5jeC9mZm1wZWcvZ2V0cmVsZWFzZS9mZnByb2JlL3ppcA==";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    pub fn current() -> Result<Self, ToolError> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Result<Self, ToolError> {
        match os {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            other => Err(ToolError::UnsupportedPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSource {
    pub url: String,
    pub kind: ArchiveKind,
}

impl ToolSource {
    pub fn new(url: impl Into<String>, platform: Platform) -> Self {
        let url = url.into();
        let kind = ArchiveKind::from_url(&url, platform);
        Self { url, kind }
    }

    fn decoded(encoded: &str, platform: Platform) -> Result<Self, ToolError> {
        Ok(Self::new(obfuscated::decode(encoded)?, platform))
    }
}

/// Archives to fetch. Windows and Linux ship both executables in one
/// archive; macOS packages the probe separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSources {
    pub transcoder: ToolSource,
    pub probe: Option<ToolSource>,
}

impl ToolSources {
    pub fn for_platform(platform: Platform) -> Result<Self, ToolError> {
        let sources = match platform {
            Platform::Windows => ToolSources {
                transcoder: ToolSource::decoded(WINDOWS_ARCHIVE, platform)?,
                probe: None,
            },
            Platform::Linux => ToolSources {
                transcoder: ToolSource::decoded(LINUX_ARCHIVE, platform)?,
                probe: None,
            },
            Platform::MacOs => ToolSources {
                transcoder: ToolSource::decoded(MACOS_TRANSCODER_ARCHIVE, platform)?,
                probe: Some(ToolSource::decoded(MACOS_PROBE_ARCHIVE, platform)?),
            },
        };
        Ok(sources)
    }
}
