//! String-keyed persistent storage backends for the credential store

use crate::error::{ClientError, Result};
use papaya::HashMap;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::debug;

/// Key/value storage the credential store persists into
///
/// Modelled on browser local storage: flat string keys and string values.
pub trait Storage: Send + Sync + 'static {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    /// Write several entries; backends that can do so persist them in one step
    fn set_items(&self, items: &[(&str, &str)]) -> Result<()> {
        for (key, value) in items {
            self.set_item(key, value)?;
        }
        Ok(())
    }

    fn remove_items(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove_item(key)?;
        }
        Ok(())
    }
}

/// In-memory storage, shared between clones
#[derive(Clone)]
pub struct MemoryStorage {
    entries: Arc<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.pin().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.entries.pin().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.entries.pin().remove(key);
        Ok(())
    }
}

/// Storage backed by a single JSON document on disk
///
/// Every mutation rewrites the document through a uniquely named temporary
/// file in the same directory and a rename, so a crash leaves either the old or
/// the new contents.
pub struct FileStorage {
    path: PathBuf,
    entries: HashMap<String, String>,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open (or lazily create) the document at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = HashMap::new();

        if path.exists() {
            let raw = std::fs::read(&path)
                .map_err(|e| ClientError::Storage(format!("reading {}: {e}", path.display())))?;
            if !raw.is_empty() {
                let stored: BTreeMap<String, String> = serde_json::from_slice(&raw)?;
                let pinned = entries.pin();
                for (key, value) in stored {
                    pinned.insert(key, value);
                }
            }
            debug!(path = %path.display(), "Loaded credential storage");
        }

        Ok(Self {
            path,
            entries,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let snapshot: BTreeMap<String, String> = self
            .entries
            .pin()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let contents = serde_json::to_vec_pretty(&snapshot)?;

        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ClientError::Storage(format!("creating {}: {e}", parent.display())))?;
                parent
            }
            None => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| ClientError::Storage(format!("creating temp file in {}: {e}", dir.display())))?;
        tmp.write_all(&contents)
            .map_err(|e| ClientError::Storage(format!("writing {}: {e}", tmp.path().display())))?;
        tmp.persist(&self.path)
            .map_err(|e| ClientError::Storage(format!("replacing {}: {e}", self.path.display())))?;
        Ok(())
    }

    /// Apply `mutate` to the entries and flush, serialized against other writers
    fn write_with(&self, mutate: impl FnOnce(&HashMap<String, String>)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        mutate(&self.entries);
        self.flush()
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.pin().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.set_items(&[(key, value)])
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.remove_items(&[key])
    }

    fn set_items(&self, items: &[(&str, &str)]) -> Result<()> {
        self.write_with(|entries| {
            let pinned = entries.pin();
            for (key, value) in items {
                pinned.insert(key.to_string(), value.to_string());
            }
        })
    }

    fn remove_items(&self, keys: &[&str]) -> Result<()> {
        self.write_with(|entries| {
            let pinned = entries.pin();
            for key in keys {
                pinned.remove(*key);
            }
        })
    }
}
