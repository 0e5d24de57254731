use std::path::{Path, PathBuf};

use crate::services::separator::SeparationError;

/// Audio container extensions the separation process can decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "aac", "ogg", "wma"];

/// Inputs above this size are accepted but logged, since the models hold the
/// whole decoded track in memory.
const LARGE_INPUT_BYTES: u64 = 500 * 1024 * 1024;

/// An input file that exists, is readable and has a supported extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    /// Absolute path, so the separation process can run in another directory.
    pub path: PathBuf,
    pub extension: String,
    pub size_bytes: u64,
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_supported_format(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Check that `input` can be handed to the separation process.
pub async fn validate_input(input: &Path) -> Result<ValidatedInput, SeparationError> {
    let metadata = match tokio::fs::metadata(input).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SeparationError::InputNotFound(input.to_path_buf()));
        }
        Err(source) => {
            return Err(SeparationError::Unreadable {
                path: input.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_file() {
        return Err(SeparationError::InputNotFound(input.to_path_buf()));
    }

    let extension = extension_of(input).unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(SeparationError::UnsupportedFormat(if extension.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{extension}")
        }));
    }

    let path = tokio::fs::canonicalize(input)
        .await
        .map_err(|source| SeparationError::Unreadable {
            path: input.to_path_buf(),
            source,
        })?;

    if metadata.len() > LARGE_INPUT_BYTES {
        tracing::warn!(
            path = %path.display(),
            size_mb = metadata.len() / 1024 / 1024,
            "Large input file, separation may take significant time and memory"
        );
    }

    Ok(ValidatedInput {
        path,
        extension,
        size_bytes: metadata.len(),
    })
}
