//! Character store.
//!
//! Characters are reusable visual identities that anchor generations for
//! consistency. The store owns the in-memory list and synchronously writes the
//! whole list through its storage backend on every mutation; a corrupt or
//! missing payload at load time degrades to an empty list.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::encoding::EncodedImage;
use crate::error::StudioError;
use crate::storage::{StorageBackend, CHARACTERS_KEY};

/// A named, reusable visual identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    /// Free text woven verbatim into composed prompts
    pub description: String,
    /// Without a reference image the character can only anchor by description
    pub reference_image: Option<EncodedImage>,
    pub created_at: String,
    pub updated_at: String,
}

/// Replacement fields for `update`; the id and creation time are preserved.
#[derive(Debug, Clone)]
pub struct CharacterFields {
    pub name: String,
    pub description: String,
    pub reference_image: Option<EncodedImage>,
}

pub struct CharacterStore {
    backend: Arc<dyn StorageBackend>,
    characters: Vec<Character>,
}

impl CharacterStore {
    /// Load the store, tolerating corrupt or missing data.
    pub fn load(backend: Arc<dyn StorageBackend>) -> Self {
        let characters = match backend.load(CHARACTERS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Character>>(&raw) {
                Ok(list) => {
                    info!("Loaded {} characters", list.len());
                    list
                }
                Err(e) => {
                    warn!("Corrupt character data, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read character storage, starting empty: {}", e);
                Vec::new()
            }
        };
        Self {
            backend,
            characters,
        }
    }

    /// Create a character with a freshly minted id.
    pub fn create(
        &mut self,
        name: &str,
        description: &str,
        reference_image: Option<EncodedImage>,
    ) -> Result<Character, StudioError> {
        let now = Utc::now().to_rfc3339();
        let character = Character {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            reference_image,
            created_at: now.clone(),
            updated_at: now,
        };
        info!("Creating character {} ({})", character.name, character.id);
        self.characters.push(character.clone());
        self.persist()?;
        Ok(character)
    }

    /// Replace all fields of an existing character; the id is immutable.
    pub fn update(&mut self, id: &str, fields: CharacterFields) -> Result<Character, StudioError> {
        let character = self
            .characters
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StudioError::NotFound(format!("character {}", id)))?;

        character.name = fields.name;
        character.description = fields.description;
        character.reference_image = fields.reference_image;
        character.updated_at = Utc::now().to_rfc3339();
        let updated = character.clone();

        info!("Updated character {}", id);
        self.persist()?;
        Ok(updated)
    }

    /// Remove a character. The caller is responsible for clearing a matching
    /// session selection (see `SessionEvent::CharacterDeleted`).
    pub fn delete(&mut self, id: &str) -> Result<(), StudioError> {
        let before = self.characters.len();
        self.characters.retain(|c| c.id != id);
        if self.characters.len() == before {
            return Err(StudioError::NotFound(format!("character {}", id)));
        }
        info!("Deleted character {}", id);
        self.persist()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn list(&self) -> &[Character] {
        &self.characters
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    fn persist(&self) -> Result<(), StudioError> {
        let payload = serde_json::to_string_pretty(&self.characters)
            .map_err(|e| StudioError::Storage(e.to_string()))?;
        self.backend
            .save(CHARACTERS_KEY, &payload)
            .map_err(|e| StudioError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> CharacterStore {
        CharacterStore::load(Arc::new(MemoryStorage::new()))
    }

    fn portrait() -> EncodedImage {
        EncodedImage {
            data: "cG9ydHJhaXQ=".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_create_mints_unique_ids() {
        let mut store = store();
        let a = store.create("Mira", "an astronaut", None).unwrap();
        let b = store.create("Mira", "an astronaut", None).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_update_preserves_id_and_created_at() {
        let mut store = store();
        let created = store.create("Mira", "an astronaut", None).unwrap();

        let updated = store
            .update(
                &created.id,
                CharacterFields {
                    name: "Mira II".to_string(),
                    description: "a veteran astronaut".to_string(),
                    reference_image: Some(portrait()),
                },
            )
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.name, "Mira II");
        assert!(updated.reference_image.is_some());
    }

    #[test]
    fn test_update_missing_id_is_not_found() {
        let mut store = store();
        let result = store.update(
            "ghost",
            CharacterFields {
                name: "x".to_string(),
                description: "y".to_string(),
                reference_image: None,
            },
        );
        assert!(matches!(result, Err(StudioError::NotFound(_))));
    }

    #[test]
    fn test_delete_removes_character() {
        let mut store = store();
        let created = store.create("Mira", "an astronaut", None).unwrap();
        store.delete(&created.id).unwrap();
        assert!(store.get(&created.id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_missing_id_is_not_found() {
        let mut store = store();
        assert!(matches!(
            store.delete("ghost"),
            Err(StudioError::NotFound(_))
        ));
    }

    #[test]
    fn test_mutations_persist_across_reload() {
        let backend = Arc::new(MemoryStorage::new());
        let created = {
            let mut store = CharacterStore::load(backend.clone());
            store.create("Mira", "an astronaut", Some(portrait())).unwrap()
        };

        let reloaded = CharacterStore::load(backend);
        assert_eq!(reloaded.len(), 1);
        let restored = reloaded.get(&created.id).unwrap();
        assert_eq!(restored.name, "Mira");
        assert_eq!(restored.reference_image, Some(portrait()));
    }

    #[test]
    fn test_corrupt_data_degrades_to_empty() {
        let backend = Arc::new(MemoryStorage::new());
        backend.save(CHARACTERS_KEY, "{ not valid json ]").unwrap();

        let store = CharacterStore::load(backend);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_persists() {
        let backend = Arc::new(MemoryStorage::new());
        let id = {
            let mut store = CharacterStore::load(backend.clone());
            let a = store.create("Mira", "an astronaut", None).unwrap();
            store.create("Juno", "a pilot", None).unwrap();
            store.delete(&a.id).unwrap();
            a.id
        };

        let reloaded = CharacterStore::load(backend);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get(&id).is_none());
    }
}
