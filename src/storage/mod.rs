//! Persistent storage: capture files and key-value settings.

mod container;
pub mod settings;

use std::fs;
use std::path::{Component, Path, PathBuf};

pub use container::{encode_for_storage, EncodedImage};
pub use settings::{MemorySettings, SettingsError, SettingsStore, TomlSettings};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage not mounted")]
    NotMounted,

    #[error("failed to mount storage at '{}': {source}", path.display())]
    Mount {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid storage path '{0}'")]
    InvalidPath(String),

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Byte sink for captured images.
pub trait FileStore {
    /// Prepare the medium. Failure leaves the store unavailable.
    fn mount(&mut self) -> Result<(), StorageError>;

    fn is_mounted(&self) -> bool;

    /// Write `bytes` to `path`, relative to the store root.
    fn save(&mut self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// File name for capture number `index`, e.g. `IMG_00042.bmp`.
pub fn capture_file_name(prefix: &str, index: u32, extension: &str) -> String {
    format!("{}{:05}.{}", prefix, index, extension)
}

/// Store rooted at a host directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    mounted: bool,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !plain {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for DirStore {
    fn mount(&mut self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::Mount {
            path: self.root.clone(),
            source: e,
        })?;
        if !self.root.is_dir() {
            return Err(StorageError::Mount {
                path: self.root.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            });
        }
        self.mounted = true;
        log::info!("Storage mounted at {}", self.root.display());
        Ok(())
    }

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn save(&mut self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Write {
                path: target.clone(),
                source: e,
            })?;
        }
        fs::write(&target, bytes).map_err(|e| StorageError::Write {
            path: target.clone(),
            source: e,
        })?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), target.display());
        Ok(())
    }
}
