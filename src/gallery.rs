//! Gallery store.
//!
//! An ordered, newest-first log of produced artifacts. Entries are appended at
//! the front on every successful generation; the upscale flow alone may
//! replace an existing entry in place when its image payload matches the
//! pre-upscale source byte for byte. Persistence mirrors the character store:
//! synchronous full-list writes, tolerant loads.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::encoding::EncodedImage;
use crate::error::StudioError;
use crate::gemini::GenerationResult;
use crate::storage::{StorageBackend, GALLERY_KEY};

/// Kind of artifact held by a gallery entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// One produced artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub id: String,
    pub kind: MediaKind,
    pub result: GenerationResult,
    pub created_at: String,
}

pub struct GalleryStore {
    backend: Arc<dyn StorageBackend>,
    /// Index 0 is the newest entry
    entries: Vec<GalleryEntry>,
}

impl GalleryStore {
    /// Load the store, tolerating corrupt or missing data.
    pub fn load(backend: Arc<dyn StorageBackend>) -> Self {
        let entries = match backend.load(GALLERY_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<GalleryEntry>>(&raw) {
                Ok(list) => {
                    info!("Loaded {} gallery entries", list.len());
                    list
                }
                Err(e) => {
                    warn!("Corrupt gallery data, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read gallery storage, starting empty: {}", e);
                Vec::new()
            }
        };
        Self { backend, entries }
    }

    /// Append a new artifact at the front of the log.
    pub fn append(&mut self, result: GenerationResult, kind: MediaKind) -> Result<GalleryEntry, StudioError> {
        let entry = GalleryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            result,
            created_at: Utc::now().to_rfc3339(),
        };
        info!("Appending gallery entry {} ({:?})", entry.id, entry.kind);
        self.entries.insert(0, entry.clone());
        self.persist()?;
        Ok(entry)
    }

    /// Upscale reconciliation: replace the entry whose image payload matches
    /// `source` byte for byte, keeping its id and position; append otherwise.
    pub fn replace_or_append(
        &mut self,
        result: GenerationResult,
        kind: MediaKind,
        source: &EncodedImage,
    ) -> Result<GalleryEntry, StudioError> {
        let matched = self.entries.iter_mut().find(|entry| {
            entry
                .result
                .image
                .as_ref()
                .map(|image| image.data == source.data)
                .unwrap_or(false)
        });

        match matched {
            Some(entry) => {
                info!("Replacing gallery entry {} in place", entry.id);
                entry.result = result;
                entry.kind = kind;
                let replaced = entry.clone();
                self.persist()?;
                Ok(replaced)
            }
            None => self.append(result, kind),
        }
    }

    /// Entries, newest first.
    pub fn list(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&GalleryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), StudioError> {
        let payload = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| StudioError::Storage(e.to_string()))?;
        self.backend
            .save(GALLERY_KEY, &payload)
            .map_err(|e| StudioError::Storage(e.to_string()))
    }
}
