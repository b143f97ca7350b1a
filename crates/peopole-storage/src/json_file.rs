//! Single-file JSON repository.
//!
//! Keeps the decoded document in memory behind an async mutex. Every update
//! runs read-modify-write under the lock and persists the whole document by
//! writing a sibling temp file and renaming it over the original.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use peopole_core::error::{PeopoleError, Result};

/// A JSON document persisted to one file.
pub struct JsonFile<T> {
    path: PathBuf,
    state: Mutex<T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    /// Open the document at `path`, creating it (and its parent directory)
    /// with the default value when absent.
    ///
    /// A file that exists but cannot be decoded is replaced by the default
    /// value on the next write; the problem is logged, not returned.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let (value, exists) = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<T>(&content) {
                Ok(v) => (v, true),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt JSON store, starting empty");
                    (T::default(), true)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => (T::default(), false),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable JSON store, starting empty");
                (T::default(), true)
            }
        };

        if !exists {
            persist(&path, &value).await?;
            debug!(path = %path.display(), "Created JSON store");
        }

        Ok(Self {
            path,
            state: Mutex::new(value),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the current document.
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    /// Apply `f` to the document and persist the result.
    ///
    /// The in-memory copy keeps the mutation even if the write fails, so a
    /// transient disk error only costs durability.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut guard = self.state.lock().await;
        let out = f(&mut guard);
        persist(&self.path, &*guard).await?;
        Ok(out)
    }
}

async fn persist<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| PeopoleError::Storage(format!("failed to write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| PeopoleError::Storage(format!("failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}
