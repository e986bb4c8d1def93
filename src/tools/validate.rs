//! Checks applied to an executable path before it is run.

use std::path::Path;

use super::ToolError;

/// Base names that may be executed.
pub const ALLOWED_EXECUTABLES: &[&str] = &["ffmpeg", "ffmpeg.exe", "ffprobe", "ffprobe.exe"];

/// Refuse to run anything that is not an absolute path to an executable
/// regular file with an allow-listed name.
pub fn validate_executable(path: &Path) -> Result<(), ToolError> {
    if !path.is_absolute() {
        return Err(ToolError::InvalidExecutable(format!(
            "path is not absolute: {}",
            path.display()
        )));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXECUTABLES.contains(&name.as_str()) {
        return Err(ToolError::InvalidExecutable(format!(
            "unexpected executable name: {}",
            path.display()
        )));
    }

    let meta = std::fs::metadata(path).map_err(|e| {
        ToolError::InvalidExecutable(format!("cannot stat {}: {}", path.display(), e))
    })?;
    if meta.is_dir() {
        return Err(ToolError::InvalidExecutable(format!(
            "path is a directory: {}",
            path.display()
        )));
    }
    if !meta.is_file() {
        return Err(ToolError::InvalidExecutable(format!(
            "not a regular file: {}",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(ToolError::InvalidExecutable(format!(
                "file is not executable: {}",
                path.display()
            )));
        }
    }

    Ok(())
}
