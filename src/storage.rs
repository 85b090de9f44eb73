//! Durable local storage seam.
//!
//! The character and gallery stores persist through an injected
//! `StorageBackend` rather than touching the filesystem directly, so tests
//! substitute `MemoryStorage` for the real `FileStorage`. Two logical keys
//! exist: the serialized character list and the serialized gallery list.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::config::StudioConfig;

/// Logical key for the persisted character list
pub const CHARACTERS_KEY: &str = "characters.json";

/// Logical key for the persisted gallery list
pub const GALLERY_KEY: &str = "gallery.json";

/// Durable key/value storage for serialized collections.
pub trait StorageBackend: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// File-backed storage rooted in the studio dot-directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Open storage in the default studio directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(StudioConfig::config_dir()?))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StorageBackend for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            debug!("No stored data at {:?}", path);
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        Ok(Some(content))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        std::fs::write(&path, value).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {}", e))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("storage lock poisoned: {}", e))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
