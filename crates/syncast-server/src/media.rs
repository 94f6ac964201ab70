//! Media lookup for play commands.
//!
//! `play <name>` resolves to `<directory>/<name>.<extension>`.

use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Invalid media name: {0:?}")]
    InvalidName(String),

    #[error("Failed to load file at {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File at {} is empty", .path.display())]
    Empty { path: PathBuf },
}

/// Directory of playable media files.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    directory: PathBuf,
    extension: String,
}

impl MediaLibrary {
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path a media name resolves to. Names may not leave the directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, MediaError> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." || name == "." {
            return Err(MediaError::InvalidName(name.to_string()));
        }
        let file_name = if self.extension.is_empty() {
            name.to_string()
        } else {
            format!("{name}.{}", self.extension)
        };
        Ok(self.directory.join(file_name))
    }

    /// Read the whole file for `name`.
    pub async fn load(&self, name: &str) -> Result<Vec<u8>, MediaError> {
        let path = self.path_for(name)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| MediaError::Unreadable {
                path: path.clone(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(MediaError::Empty { path });
        }
        debug!(path = %path.display(), bytes = bytes.len(), "Loaded media file");
        Ok(bytes)
    }
}
