//! Error taxonomy for the studio engine.
//!
//! Every failure that can reach the UI is one of the variants below. Provider
//! failures arrive as opaque message strings; `classify_provider_error` is the
//! single place that sniffs them into the taxonomy, so the brittle substring
//! table stays centralized and swappable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StudioError {
    /// Local file or binary payload could not be read
    #[error("Failed to read file: {0}")]
    Read(String),

    /// Network/transport failure; the upstream message is passed through verbatim
    #[error("{0}")]
    Transient(String),

    /// Provider refused to produce output due to safety/content rules
    #[error("Generation blocked by content policy: {0}")]
    ContentPolicy(String),

    /// Capability credential invalid or missing (video generation)
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Store-level lookup miss; treated as a caller bug
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected input that should have been validated upstream
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Media asset could not be decoded or processed
    #[error("Failed to decode media: {0}")]
    Decode(String),

    /// Durable storage write failure
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Anything we could not classify; wraps the underlying message
    #[error("Generation failed: {0}")]
    Unknown(String),
}

/// Substring markers for transient network/transport failures
const TRANSIENT_MARKERS: &[&str] = &[
    "network",
    "fetch",
    "timeout",
    "timed out",
    "connection",
    "unavailable",
    "overloaded",
    "rate limit",
    "429",
    "503",
];

/// Substring markers for credential/capability failures.
/// "not found" is included because the provider reports a revoked or wrong
/// API key against the video models as an entity-not-found error.
const AUTHORIZATION_MARKERS: &[&str] = &[
    "api key",
    "unauthorized",
    "unauthenticated",
    "permission",
    "not found",
    "401",
    "403",
];

/// Translate an opaque provider failure message into the taxonomy.
///
/// Best-effort, case-insensitive substring matching against whatever the
/// upstream returns. Safety blocks win over everything else because safety
/// responses often also mention the request transport.
pub fn classify_provider_error(message: &str) -> StudioError {
    let lowered = message.to_lowercase();

    if lowered.contains("safety") || lowered.contains("blocked") {
        return StudioError::ContentPolicy(message.to_string());
    }
    if AUTHORIZATION_MARKERS.iter().any(|m| lowered.contains(m)) {
        return StudioError::Authorization(message.to_string());
    }
    if TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return StudioError::Transient(message.to_string());
    }
    StudioError::Unknown(message.to_string())
}

impl StudioError {
    /// User-facing message with actionable guidance per variant.
    pub fn user_message(&self) -> String {
        match self {
            StudioError::Read(msg) => format!("Could not read the selected file: {}", msg),
            StudioError::Transient(msg) => {
                format!("{} — please check your connection and try again.", msg)
            }
            StudioError::ContentPolicy(_) => {
                "The request was blocked by the provider's safety filters. \
                 Try rewording your prompt or using different images."
                    .to_string()
            }
            StudioError::Authorization(_) => {
                "Your credentials were rejected. Please select a valid API key and retry."
                    .to_string()
            }
            StudioError::NotFound(msg) => format!("Not found: {}", msg),
            StudioError::Invalid(msg) => format!("Invalid input: {}", msg),
            StudioError::Decode(msg) => format!("Could not process the media file: {}", msg),
            StudioError::Storage(msg) => format!("Could not save your data: {}", msg),
            StudioError::Unknown(msg) => {
                format!("Something went wrong during generation: {}", msg)
            }
        }
    }

    /// Whether re-submitting the same request may plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StudioError::Transient(_))
    }
}
