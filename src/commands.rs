//! Flow boundary for the studio engine.
//!
//! `Studio` owns the session state machine, both persisted stores and the
//! generation gateway, and exposes the user-facing flows. Gateway and store
//! errors are caught here and converted into the session's error state —
//! they never propagate past this layer, and a failed attempt never corrupts
//! the working image or current result.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::characters::{Character, CharacterFields, CharacterStore};
use crate::config::StudioConfig;
use crate::encoding::EncodedImage;
use crate::error::StudioError;
use crate::gallery::{GalleryEntry, GalleryStore, MediaKind};
use crate::gemini::{GenerationApi, GenerationResult};
use crate::session::{Mode, SessionError, SessionEvent, SessionManager, SideEffect};
use crate::storage::StorageBackend;
use crate::video;

pub struct Studio {
    /// The in-memory working session; UI events dispatch straight to it
    pub session: SessionManager,
    characters: CharacterStore,
    gallery: GalleryStore,
    client: Arc<dyn GenerationApi>,
    thumbnail_timeout: Duration,
}

impl Studio {
    pub fn new(
        client: Arc<dyn GenerationApi>,
        backend: Arc<dyn StorageBackend>,
        config: &StudioConfig,
    ) -> Self {
        Self {
            session: SessionManager::new(),
            characters: CharacterStore::load(backend.clone()),
            gallery: GalleryStore::load(backend),
            client,
            thumbnail_timeout: Duration::from_secs(config.thumbnail_timeout_secs),
        }
    }

    pub fn characters(&self) -> &CharacterStore {
        &self.characters
    }

    pub fn gallery(&self) -> &GalleryStore {
        &self.gallery
    }

    /// Run one submission through the session state machine.
    ///
    /// Returns `Err` only for inline validation/transition rejections (no
    /// state change, no network call). Generation failures settle into the
    /// session's error state and return `Ok`.
    pub async fn submit(&mut self) -> Result<(), SessionError> {
        self.session.handle(SessionEvent::Submit)?;

        match self.run_generation().await {
            Ok((result, kind)) => {
                let effects = self
                    .session
                    .handle(SessionEvent::SettleSuccess { result, kind })?;
                self.apply_effects(effects);
            }
            Err(err) => {
                // An authorization failure during video work means the
                // credentials lost the capability; force re-selection.
                if self.session.mode() == Mode::Video
                    && matches!(err, StudioError::Authorization(_))
                {
                    let _ = self.session.handle(SessionEvent::VideoAuthorizationRevoked);
                }
                self.session.handle(SessionEvent::SettleError(err))?;
            }
        }
        Ok(())
    }

    async fn run_generation(&self) -> Result<(GenerationResult, MediaKind), StudioError> {
        let prompt = self.session.prompt_text().to_string();
        let character = self
            .session
            .selected_character_id()
            .and_then(|id| self.characters.get(id))
            .cloned();
        let faithfulness = self.session.faithfulness();
        let modifiers = self.session.style_modifiers().clone();

        match self.session.mode() {
            Mode::Edit => {
                let target = self
                    .session
                    .working_image()
                    .cloned()
                    .ok_or_else(|| StudioError::Invalid("no working image".to_string()))?;
                let additional = self.session.additional_image().cloned();
                let result = self
                    .client
                    .edit_image(
                        &target,
                        &prompt,
                        character.as_ref(),
                        faithfulness,
                        additional.as_ref(),
                        &modifiers,
                    )
                    .await?;
                Ok((result, MediaKind::Image))
            }
            Mode::Generate => {
                let result = self
                    .client
                    .generate_image(
                        &prompt,
                        self.session.aspect_ratio(),
                        character.as_ref(),
                        faithfulness,
                        &modifiers,
                    )
                    .await?;
                Ok((result, MediaKind::Image))
            }
            Mode::Video => {
                let seed = if self.session.use_seed() {
                    self.session.working_image().cloned()
                } else {
                    None
                };
                let mut result = self
                    .client
                    .generate_video(&prompt, seed.as_ref(), self.session.aspect_ratio())
                    .await?;

                // Derive a gallery thumbnail from the finished asset. The
                // video stays playable through its reference even when the
                // derivation fails.
                if let Some(video_ref) = result.video_ref.clone() {
                    match self.client.fetch_video(&video_ref).await {
                        Ok(bytes) => {
                            match video::thumbnail_from_bytes(&bytes, self.thumbnail_timeout).await
                            {
                                Ok(thumbnail) => result.image = Some(thumbnail),
                                Err(e) => warn!("Thumbnail derivation failed: {}", e),
                            }
                        }
                        Err(e) => warn!("Video download for thumbnail failed: {}", e),
                    }
                }
                Ok((result, MediaKind::Video))
            }
        }
    }

    fn apply_effects(&mut self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::AppendToGallery { result, kind } => {
                    if let Err(e) = self.gallery.append(result, kind) {
                        // The result already settled; a persistence failure
                        // must not undo it
                        error!("Failed to persist gallery entry: {}", e);
                    }
                }
            }
        }
    }

    /// Upscale an image, reconciling the gallery in place when the source
    /// matches an existing entry byte for byte.
    pub async fn upscale(&mut self, source: &EncodedImage) -> Result<GalleryEntry, StudioError> {
        let result = self.client.upscale_image(source).await?;
        self.gallery
            .replace_or_append(result, MediaKind::Image, source)
    }

    /// Generate a portrait candidate for the character editor.
    pub async fn generate_character_portrait(
        &self,
        description: &str,
        reference_images: &[EncodedImage],
    ) -> Result<EncodedImage, StudioError> {
        let result = self
            .client
            .generate_character_portrait(description, reference_images)
            .await?;
        result
            .image
            .ok_or_else(|| StudioError::Unknown("portrait generation returned no image".to_string()))
    }

    pub fn create_character(
        &mut self,
        name: &str,
        description: &str,
        portrait: Option<EncodedImage>,
    ) -> Result<Character, StudioError> {
        if name.trim().is_empty() {
            return Err(StudioError::Invalid(
                "character name must not be empty".to_string(),
            ));
        }
        self.characters.create(name, description, portrait)
    }

    pub fn update_character(
        &mut self,
        id: &str,
        fields: CharacterFields,
    ) -> Result<Character, StudioError> {
        if fields.name.trim().is_empty() {
            return Err(StudioError::Invalid(
                "character name must not be empty".to_string(),
            ));
        }
        self.characters.update(id, fields)
    }

    /// Delete a character and clear a matching session selection.
    pub fn delete_character(&mut self, id: &str) -> Result<(), StudioError> {
        self.characters.delete(id)?;
        let _ = self
            .session
            .handle(SessionEvent::CharacterDeleted(id.to_string()));
        Ok(())
    }

    /// Dress a character in a described outfit; the render lands in the gallery.
    pub async fn generate_outfit(
        &mut self,
        character_id: &str,
        outfit_prompt: &str,
    ) -> Result<GalleryEntry, StudioError> {
        let character = self
            .characters
            .get(character_id)
            .cloned()
            .ok_or_else(|| StudioError::NotFound(format!("character {}", character_id)))?;

        let result = self
            .client
            .generate_outfit(&character, outfit_prompt, self.session.faithfulness())
            .await?;
        self.gallery.append(result, MediaKind::Image)
    }

    /// Probe the video capability and flip the session's authorization flag.
    pub async fn authorize_video(&mut self) -> Result<(), StudioError> {
        match self.client.verify_video_access().await {
            Ok(()) => {
                info!("Video capability authorized");
                let _ = self.session.handle(SessionEvent::VideoAuthorized);
                Ok(())
            }
            Err(e) => {
                let _ = self.session.handle(SessionEvent::VideoAuthorizationRevoked);
                Err(e)
            }
        }
    }

    /// Round-trip a gallery entry's stored image back into the working-image
    /// slot for further editing.
    pub fn import_gallery_entry(&mut self, entry_id: &str) -> Result<(), StudioError> {
        let image = self
            .gallery
            .get(entry_id)
            .ok_or_else(|| StudioError::NotFound(format!("gallery entry {}", entry_id)))?
            .result
            .image
            .clone()
            .ok_or_else(|| {
                StudioError::NotFound(format!("gallery entry {} has no image", entry_id))
            })?;

        if self.session.mode() != Mode::Edit {
            self.session
                .handle(SessionEvent::SwitchMode(Mode::Edit))
                .map_err(|e| StudioError::Invalid(e.to_string()))?;
        }
        self.session
            .handle(SessionEvent::SetWorkingImage(Some(image)))
            .map_err(|e| StudioError::Invalid(e.to_string()))?;
        Ok(())
    }
}
