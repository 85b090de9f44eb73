use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::encoding::EncodedImage;
use crate::error::StudioError;
use crate::gallery::MediaKind;
use crate::gemini::GenerationResult;
use crate::prompt::{AspectRatio, StyleModifiers};

/// Rotating status lines shown while a long-running generation is in flight.
/// Purely cosmetic; the index carries no semantic weight.
pub const STATUS_MESSAGES: [&str; 5] = [
    "Warming up the projector...",
    "Composing your frames...",
    "Rendering motion...",
    "Adding finishing touches...",
    "Almost there...",
];

/// Seconds between status-message rotations (driven by the caller's timer)
pub const STATUS_ROTATION_SECS: u64 = 5;

/// Active operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Edit,
    Generate,
    Video,
}

/// Submit lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitState {
    Idle,
    Submitting,
    SettledSuccess,
    SettledError,
}

/// Validation and transition errors; surfaced inline, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SessionError {
    #[error("Prompt text is empty")]
    EmptyPrompt,
    #[error("No working image is loaded")]
    MissingWorkingImage,
    #[error("Video generation has not been authorized")]
    VideoNotAuthorized,
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
}

/// Events driving the session state machine
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// User pressed submit; validated against the current state
    Submit,
    /// A generation settled successfully
    SettleSuccess {
        result: GenerationResult,
        kind: MediaKind,
    },
    /// A generation settled with an error
    SettleError(StudioError),
    SwitchMode(Mode),
    SetPrompt(String),
    SetWorkingImage(Option<EncodedImage>),
    SetAdditionalImage(Option<EncodedImage>),
    SelectCharacter(Option<String>),
    /// A character was removed from the store; clears a matching selection
    CharacterDeleted(String),
    SetFaithfulness(u8),
    SetAspectRatio(AspectRatio),
    SetUseSeed(bool),
    SetStyleModifiers(StyleModifiers),
    /// Timer tick for the cosmetic status rotation
    AdvanceStatusMessage,
    VideoAuthorized,
    VideoAuthorizationRevoked,
}

/// Side effects requested by a transition, applied by the flow layer
#[derive(Debug, Clone)]
pub enum SideEffect {
    AppendToGallery {
        result: GenerationResult,
        kind: MediaKind,
    },
}

/// The in-memory working session. Never persisted.
pub struct SessionManager {
    state: SubmitState,
    mode: Mode,
    prompt_text: String,
    working_image: Option<EncodedImage>,
    additional_image: Option<EncodedImage>,
    selected_character_id: Option<String>,
    faithfulness: u8,
    aspect_ratio: AspectRatio,
    use_seed: bool,
    style_modifiers: StyleModifiers,
    /// Client-side post-processing adjustments; never sent to the provider
    active_filters: Vec<String>,
    current_result: Option<GenerationResult>,
    error_state: Option<StudioError>,
    video_authorized: bool,
    status_message_index: usize,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: SubmitState::Idle,
            mode: Mode::Generate,
            prompt_text: String::new(),
            working_image: None,
            additional_image: None,
            selected_character_id: None,
            faithfulness: 80,
            aspect_ratio: AspectRatio::default(),
            use_seed: false,
            style_modifiers: StyleModifiers::default(),
            active_filters: Vec::new(),
            current_result: None,
            error_state: None,
            video_authorized: false,
            status_message_index: 0,
        }
    }

    /// Apply one event. Pure state transition plus a side-effect list; the
    /// flow layer executes the effects.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SideEffect>, SessionError> {
        match event {
            SessionEvent::Submit => self.begin_submit().map(|_| Vec::new()),
            SessionEvent::SettleSuccess { result, kind } => self.settle_success(result, kind),
            SessionEvent::SettleError(err) => self.settle_error(err).map(|_| Vec::new()),
            SessionEvent::SwitchMode(mode) => self.switch_mode(mode).map(|_| Vec::new()),
            SessionEvent::SetPrompt(text) => {
                self.prompt_text = text;
                Ok(Vec::new())
            }
            SessionEvent::SetWorkingImage(image) => {
                self.working_image = image;
                Ok(Vec::new())
            }
            SessionEvent::SetAdditionalImage(image) => {
                self.additional_image = image;
                Ok(Vec::new())
            }
            SessionEvent::SelectCharacter(id) => {
                self.selected_character_id = id;
                Ok(Vec::new())
            }
            SessionEvent::CharacterDeleted(id) => {
                if self.selected_character_id.as_deref() == Some(id.as_str()) {
                    debug!("Clearing selection of deleted character {}", id);
                    self.selected_character_id = None;
                }
                Ok(Vec::new())
            }
            SessionEvent::SetFaithfulness(level) => {
                self.faithfulness = level.min(100);
                Ok(Vec::new())
            }
            SessionEvent::SetAspectRatio(ratio) => {
                self.aspect_ratio = ratio;
                Ok(Vec::new())
            }
            SessionEvent::SetUseSeed(use_seed) => {
                self.use_seed = use_seed;
                Ok(Vec::new())
            }
            SessionEvent::SetStyleModifiers(modifiers) => {
                self.style_modifiers = modifiers;
                Ok(Vec::new())
            }
            SessionEvent::AdvanceStatusMessage => {
                if self.state == SubmitState::Submitting {
                    self.status_message_index =
                        (self.status_message_index + 1) % STATUS_MESSAGES.len();
                }
                Ok(Vec::new())
            }
            SessionEvent::VideoAuthorized => {
                self.video_authorized = true;
                Ok(Vec::new())
            }
            SessionEvent::VideoAuthorizationRevoked => {
                warn!("Video authorization revoked");
                self.video_authorized = false;
                Ok(Vec::new())
            }
        }
    }

    /// Check whether a submit would be accepted, without changing state.
    pub fn validate_submit(&self) -> Result<(), SessionError> {
        if self.state == SubmitState::Submitting {
            return Err(SessionError::InvalidTransition(
                "a submission is already in flight".to_string(),
            ));
        }
        if self.prompt_text.trim().is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        match self.mode {
            Mode::Edit => {
                if self.working_image.is_none() {
                    return Err(SessionError::MissingWorkingImage);
                }
            }
            Mode::Video => {
                if !self.video_authorized {
                    return Err(SessionError::VideoNotAuthorized);
                }
                if self.use_seed && self.working_image.is_none() {
                    return Err(SessionError::MissingWorkingImage);
                }
            }
            Mode::Generate => {}
        }
        Ok(())
    }

    fn begin_submit(&mut self) -> Result<(), SessionError> {
        self.validate_submit()?;
        info!("Session transitioning to Submitting ({:?})", self.mode);
        self.state = SubmitState::Submitting;
        self.error_state = None;
        self.status_message_index = 0;
        Ok(())
    }

    fn settle_success(
        &mut self,
        result: GenerationResult,
        kind: MediaKind,
    ) -> Result<Vec<SideEffect>, SessionError> {
        if self.state != SubmitState::Submitting {
            return Err(SessionError::InvalidTransition(format!(
                "cannot settle from state {:?}",
                self.state
            )));
        }

        info!("Session settled successfully ({:?})", kind);
        self.state = SubmitState::SettledSuccess;
        self.current_result = Some(result.clone());
        self.error_state = None;

        if self.mode == Mode::Edit {
            // Chained editing: the next submission edits the latest output.
            // A fresh instruction is required per step; character selection
            // and aspect ratio survive.
            self.working_image = result.image.clone();
            self.additional_image = None;
            self.prompt_text.clear();
        }

        Ok(vec![SideEffect::AppendToGallery { result, kind }])
    }

    fn settle_error(&mut self, err: StudioError) -> Result<(), SessionError> {
        if self.state != SubmitState::Submitting {
            return Err(SessionError::InvalidTransition(format!(
                "cannot settle from state {:?}",
                self.state
            )));
        }

        // Failed attempts must not destroy prior state: working image, current
        // result and prompt text all stay exactly as they were.
        warn!("Session settled with error: {}", err);
        self.state = SubmitState::SettledError;
        self.error_state = Some(err);
        Ok(())
    }

    fn switch_mode(&mut self, mode: Mode) -> Result<(), SessionError> {
        if self.state == SubmitState::Submitting {
            return Err(SessionError::InvalidTransition(
                "cannot switch mode while submitting".to_string(),
            ));
        }

        let leaving_image_mode = matches!(self.mode, Mode::Edit | Mode::Video);
        info!("Switching mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.state = SubmitState::Idle;
        self.current_result = None;
        self.error_state = None;
        if leaving_image_mode {
            self.working_image = None;
            self.additional_image = None;
            self.use_seed = false;
        }
        Ok(())
    }

    // -- Accessors --

    pub fn state(&self) -> &SubmitState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn working_image(&self) -> Option<&EncodedImage> {
        self.working_image.as_ref()
    }

    pub fn additional_image(&self) -> Option<&EncodedImage> {
        self.additional_image.as_ref()
    }

    pub fn selected_character_id(&self) -> Option<&str> {
        self.selected_character_id.as_deref()
    }

    pub fn faithfulness(&self) -> u8 {
        self.faithfulness
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn use_seed(&self) -> bool {
        self.use_seed
    }

    pub fn style_modifiers(&self) -> &StyleModifiers {
        &self.style_modifiers
    }

    pub fn active_filters(&self) -> &[String] {
        &self.active_filters
    }

    pub fn set_active_filters(&mut self, filters: Vec<String>) {
        self.active_filters = filters;
    }

    pub fn current_result(&self) -> Option<&GenerationResult> {
        self.current_result.as_ref()
    }

    pub fn error_state(&self) -> Option<&StudioError> {
        self.error_state.as_ref()
    }

    pub fn video_authorized(&self) -> bool {
        self.video_authorized
    }

    pub fn is_submitting(&self) -> bool {
        self.state == SubmitState::Submitting
    }

    /// The current cosmetic status line.
    pub fn status_message(&self) -> &'static str {
        STATUS_MESSAGES[self.status_message_index % STATUS_MESSAGES.len()]
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(tag: &str) -> EncodedImage {
        EncodedImage {
            data: format!("img-{}", tag),
            mime_type: "image/png".to_string(),
        }
    }

    fn result(tag: &str) -> GenerationResult {
        GenerationResult {
            image: Some(image(tag)),
            narrative_text: None,
            video_ref: None,
        }
    }

    fn ready_session(mode: Mode) -> SessionManager {
        let mut session = SessionManager::new();
        session.handle(SessionEvent::SwitchMode(mode)).unwrap();
        session
            .handle(SessionEvent::SetPrompt("make it rain".to_string()))
            .unwrap();
        if mode == Mode::Edit {
            session
                .handle(SessionEvent::SetWorkingImage(Some(image("working"))))
                .unwrap();
        }
        session
    }

    #[test]
    fn test_defaults() {
        let session = SessionManager::new();
        assert_eq!(session.state(), &SubmitState::Idle);
        assert_eq!(session.mode(), Mode::Generate);
        assert_eq!(session.faithfulness(), 80);
        assert!(!session.video_authorized());
        assert!(session.current_result().is_none());
    }

    #[test]
    fn test_empty_prompt_is_rejected_without_transition() {
        let mut session = SessionManager::new();
        let before = session.state().clone();
        let err = session.handle(SessionEvent::Submit).unwrap_err();
        assert_eq!(err, SessionError::EmptyPrompt);
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn test_whitespace_prompt_is_rejected() {
        let mut session = SessionManager::new();
        session
            .handle(SessionEvent::SetPrompt("   \n ".to_string()))
            .unwrap();
        assert_eq!(
            session.handle(SessionEvent::Submit).unwrap_err(),
            SessionError::EmptyPrompt
        );
    }

    #[test]
    fn test_edit_without_working_image_is_rejected() {
        let mut session = SessionManager::new();
        session.handle(SessionEvent::SwitchMode(Mode::Edit)).unwrap();
        session
            .handle(SessionEvent::SetPrompt("p".to_string()))
            .unwrap();
        assert_eq!(
            session.handle(SessionEvent::Submit).unwrap_err(),
            SessionError::MissingWorkingImage
        );
        assert_eq!(session.state(), &SubmitState::Idle);
    }

    #[test]
    fn test_video_requires_authorization() {
        let mut session = SessionManager::new();
        session.handle(SessionEvent::SwitchMode(Mode::Video)).unwrap();
        session
            .handle(SessionEvent::SetPrompt("p".to_string()))
            .unwrap();
        assert_eq!(
            session.handle(SessionEvent::Submit).unwrap_err(),
            SessionError::VideoNotAuthorized
        );

        session.handle(SessionEvent::VideoAuthorized).unwrap();
        assert!(session.handle(SessionEvent::Submit).is_ok());
    }

    #[test]
    fn test_video_with_seed_requires_working_image() {
        let mut session = SessionManager::new();
        session.handle(SessionEvent::SwitchMode(Mode::Video)).unwrap();
        session.handle(SessionEvent::VideoAuthorized).unwrap();
        session
            .handle(SessionEvent::SetPrompt("p".to_string()))
            .unwrap();
        session.handle(SessionEvent::SetUseSeed(true)).unwrap();

        assert_eq!(
            session.handle(SessionEvent::Submit).unwrap_err(),
            SessionError::MissingWorkingImage
        );

        session
            .handle(SessionEvent::SetWorkingImage(Some(image("seed"))))
            .unwrap();
        assert!(session.handle(SessionEvent::Submit).is_ok());
    }

    #[test]
    fn test_submit_while_submitting_is_rejected() {
        let mut session = ready_session(Mode::Generate);
        session.handle(SessionEvent::Submit).unwrap();
        assert!(matches!(
            session.handle(SessionEvent::Submit),
            Err(SessionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_success_settle_emits_gallery_effect() {
        let mut session = ready_session(Mode::Generate);
        session.handle(SessionEvent::Submit).unwrap();

        let effects = session
            .handle(SessionEvent::SettleSuccess {
                result: result("out"),
                kind: MediaKind::Image,
            })
            .unwrap();

        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], SideEffect::AppendToGallery { .. }));
        assert_eq!(session.state(), &SubmitState::SettledSuccess);
        assert!(session.current_result().is_some());
    }

    #[test]
    fn test_edit_success_chains_working_image_and_clears_prompt() {
        let mut session = ready_session(Mode::Edit);
        session
            .handle(SessionEvent::SelectCharacter(Some("c1".to_string())))
            .unwrap();
        session
            .handle(SessionEvent::SetAspectRatio(AspectRatio::Landscape))
            .unwrap();
        session.handle(SessionEvent::Submit).unwrap();

        session
            .handle(SessionEvent::SettleSuccess {
                result: result("edited"),
                kind: MediaKind::Image,
            })
            .unwrap();

        // The next submission edits the latest output
        assert_eq!(session.working_image().unwrap().data, "img-edited");
        assert!(session.prompt_text().is_empty());
        // Mode, character selection and aspect ratio survive
        assert_eq!(session.mode(), Mode::Edit);
        assert_eq!(session.selected_character_id(), Some("c1"));
        assert_eq!(session.aspect_ratio(), AspectRatio::Landscape);
    }

    #[test]
    fn test_generate_success_does_not_chain() {
        let mut session = ready_session(Mode::Generate);
        session.handle(SessionEvent::Submit).unwrap();
        session
            .handle(SessionEvent::SettleSuccess {
                result: result("out"),
                kind: MediaKind::Image,
            })
            .unwrap();

        assert!(session.working_image().is_none());
        assert_eq!(session.prompt_text(), "make it rain");
    }

    #[test]
    fn test_error_settle_is_non_destructive() {
        let mut session = ready_session(Mode::Edit);
        session.handle(SessionEvent::Submit).unwrap();
        session
            .handle(SessionEvent::SettleSuccess {
                result: result("first"),
                kind: MediaKind::Image,
            })
            .unwrap();

        session
            .handle(SessionEvent::SetPrompt("second step".to_string()))
            .unwrap();
        let working_before = session.working_image().cloned();
        let result_before = session.current_result().cloned();

        session.handle(SessionEvent::Submit).unwrap();
        session
            .handle(SessionEvent::SettleError(StudioError::Transient(
                "network down".to_string(),
            )))
            .unwrap();

        assert_eq!(session.working_image().cloned(), working_before);
        assert_eq!(
            session.current_result().map(|r| r.image.clone()),
            result_before.map(|r| r.image)
        );
        // The user may retry the same prompt
        assert_eq!(session.prompt_text(), "second step");
        assert!(matches!(
            session.error_state(),
            Some(StudioError::Transient(_))
        ));
    }

    #[test]
    fn test_resubmit_after_error_clears_error_state() {
        let mut session = ready_session(Mode::Generate);
        session.handle(SessionEvent::Submit).unwrap();
        session
            .handle(SessionEvent::SettleError(StudioError::Unknown(
                "x".to_string(),
            )))
            .unwrap();

        session.handle(SessionEvent::Submit).unwrap();
        assert_eq!(session.state(), &SubmitState::Submitting);
        assert!(session.error_state().is_none());
    }

    #[test]
    fn test_settle_without_submit_is_invalid() {
        let mut session = SessionManager::new();
        assert!(matches!(
            session.handle(SessionEvent::SettleSuccess {
                result: result("x"),
                kind: MediaKind::Image,
            }),
            Err(SessionError::InvalidTransition(_))
        ));
        assert!(matches!(
            session.handle(SessionEvent::SettleError(StudioError::Unknown("x".into()))),
            Err(SessionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_mode_switch_clears_result_and_error() {
        let mut session = ready_session(Mode::Generate);
        session.handle(SessionEvent::Submit).unwrap();
        session
            .handle(SessionEvent::SettleSuccess {
                result: result("out"),
                kind: MediaKind::Image,
            })
            .unwrap();

        session.handle(SessionEvent::SwitchMode(Mode::Edit)).unwrap();
        assert!(session.current_result().is_none());
        assert!(session.error_state().is_none());
        assert_eq!(session.state(), &SubmitState::Idle);
    }

    #[test]
    fn test_leaving_edit_mode_releases_images() {
        let mut session = ready_session(Mode::Edit);
        session
            .handle(SessionEvent::SetAdditionalImage(Some(image("extra"))))
            .unwrap();

        session
            .handle(SessionEvent::SwitchMode(Mode::Generate))
            .unwrap();
        assert!(session.working_image().is_none());
        assert!(session.additional_image().is_none());
    }

    #[test]
    fn test_mode_switch_preserves_character_selection() {
        let mut session = ready_session(Mode::Edit);
        session
            .handle(SessionEvent::SelectCharacter(Some("c1".to_string())))
            .unwrap();

        session
            .handle(SessionEvent::SwitchMode(Mode::Generate))
            .unwrap();
        assert_eq!(session.selected_character_id(), Some("c1"));
    }

    #[test]
    fn test_character_deletion_cascades_selection() {
        let mut session = SessionManager::new();
        session
            .handle(SessionEvent::SelectCharacter(Some("c1".to_string())))
            .unwrap();

        // Deleting some other character leaves the selection untouched
        session
            .handle(SessionEvent::CharacterDeleted("c2".to_string()))
            .unwrap();
        assert_eq!(session.selected_character_id(), Some("c1"));

        // Deleting the selected character clears it
        session
            .handle(SessionEvent::CharacterDeleted("c1".to_string()))
            .unwrap();
        assert_eq!(session.selected_character_id(), None);
    }

    #[test]
    fn test_faithfulness_clamps_to_100() {
        let mut session = SessionManager::new();
        session.handle(SessionEvent::SetFaithfulness(255)).unwrap();
        assert_eq!(session.faithfulness(), 100);
    }

    #[test]
    fn test_status_message_rotation_only_while_submitting() {
        let mut session = ready_session(Mode::Generate);
        let first = session.status_message();

        // Not submitting: ticks are ignored
        session.handle(SessionEvent::AdvanceStatusMessage).unwrap();
        assert_eq!(session.status_message(), first);

        session.handle(SessionEvent::Submit).unwrap();
        session.handle(SessionEvent::AdvanceStatusMessage).unwrap();
        assert_eq!(session.status_message(), STATUS_MESSAGES[1]);

        // Rotation wraps
        for _ in 0..STATUS_MESSAGES.len() {
            session.handle(SessionEvent::AdvanceStatusMessage).unwrap();
        }
        assert_eq!(session.status_message(), STATUS_MESSAGES[1]);
    }

    #[test]
    fn test_new_submit_resets_status_index() {
        let mut session = ready_session(Mode::Generate);
        session.handle(SessionEvent::Submit).unwrap();
        session.handle(SessionEvent::AdvanceStatusMessage).unwrap();
        session
            .handle(SessionEvent::SettleError(StudioError::Unknown("x".into())))
            .unwrap();

        session.handle(SessionEvent::Submit).unwrap();
        assert_eq!(session.status_message(), STATUS_MESSAGES[0]);
    }

    #[test]
    fn test_authorization_revocation() {
        let mut session = SessionManager::new();
        session.handle(SessionEvent::VideoAuthorized).unwrap();
        assert!(session.video_authorized());
        session
            .handle(SessionEvent::VideoAuthorizationRevoked)
            .unwrap();
        assert!(!session.video_authorized());
    }

    #[test]
    fn test_mode_switch_while_submitting_is_rejected() {
        let mut session = ready_session(Mode::Generate);
        session.handle(SessionEvent::Submit).unwrap();
        assert!(matches!(
            session.handle(SessionEvent::SwitchMode(Mode::Edit)),
            Err(SessionError::InvalidTransition(_))
        ));
    }
}
