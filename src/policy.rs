//! Retry/fallback policy for generation attempts that yield no image.
//!
//! Two behaviors exist: retry exactly once with a safety-hardening suffix
//! appended to the prompt, or make a single attempt and surface the failure
//! immediately. Both are supported as configuration; the default is no
//! automatic retry.

use serde::{Deserialize, Serialize};

/// Suffix appended to the user prompt on a safety retry
pub const SAFETY_SUFFIX: &str =
    "Keep the result family-friendly; avoid any sensitive, explicit, or unsafe content.";

/// Governs what happens when a gateway call yields no image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of hardened retries after a failed attempt (0 or 1)
    pub max_retries: u32,
    /// Text appended to the user prompt on retry
    pub safety_suffix: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            safety_suffix: SAFETY_SUFFIX.to_string(),
        }
    }
}

impl RetryPolicy {
    /// The single-safety-retry variant.
    pub fn with_safety_retry() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Append the safety suffix to a prompt for a retry attempt.
    pub fn harden(&self, prompt: &str) -> String {
        if prompt.is_empty() {
            self.safety_suffix.clone()
        } else {
            format!("{} {}", prompt, self.safety_suffix)
        }
    }
}
