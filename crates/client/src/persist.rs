//! JSON snapshot persistence for small pieces of client state.
//!
//! Used for the signed-in session and the owned-recipes cache. A store is
//! either file-backed (one JSON document per file, replaced atomically) or
//! memory-backed for tests and ephemeral runs.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors reading or writing a persisted snapshot.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory(Arc<Mutex<Option<String>>>),
}

/// A typed JSON snapshot.
#[derive(Debug)]
pub struct JsonStore<T> {
    location: Location,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> JsonStore<T> {
    /// Store backed by a file. Parent directories are created on first save.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            _marker: PhantomData,
        }
    }

    /// Store held in memory. Clones share the same slot.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            location: Location::Memory(Arc::new(Mutex::new(None))),
            _marker: PhantomData,
        }
    }

    /// Path of the backing file, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory(_) => None,
        }
    }

    /// Load the snapshot. A missing file or empty slot yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the file cannot be read or does not parse.
    pub async fn load(&self) -> Result<Option<T>, PersistError> {
        let raw = match &self.location {
            Location::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(raw) => Some(raw),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(source) => {
                    return Err(PersistError::Io {
                        path: path.clone(),
                        source,
                    });
                }
            },
            Location::Memory(slot) => slot.lock().await.clone(),
        };

        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(PersistError::from)
    }

    /// Replace the snapshot.
    ///
    /// File-backed stores write a sibling temp file and rename it over the
    /// target so readers never observe a half-written document.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if encoding or the write fails.
    pub async fn save(&self, value: &T) -> Result<(), PersistError> {
        let raw = serde_json::to_string_pretty(value)?;

        match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|source| PersistError::Io {
                            path: parent.to_path_buf(),
                            source,
                        })?;
                }

                let tmp = temp_path(path);
                tokio::fs::write(&tmp, raw)
                    .await
                    .map_err(|source| PersistError::Io {
                        path: tmp.clone(),
                        source,
                    })?;
                tokio::fs::rename(&tmp, path)
                    .await
                    .map_err(|source| PersistError::Io {
                        path: path.clone(),
                        source,
                    })?;
            }
            Location::Memory(slot) => {
                *slot.lock().await = Some(raw);
            }
        }
        Ok(())
    }

    /// Remove the snapshot. Clearing an absent snapshot is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), PersistError> {
        match &self.location {
            Location::File(path) => match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(PersistError::Io {
                    path: path.clone(),
                    source,
                }),
            },
            Location::Memory(slot) => {
                *slot.lock().await = None;
                Ok(())
            }
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
