use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::policy::RetryPolicy;

/// Engine configuration, persisted as JSON in the studio dot-directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioConfig {
    pub schema_version: u32,
    /// Model used for image generation, editing, upscaling and portraits
    pub image_model: String,
    /// Model used for video generation
    pub video_model: String,
    /// Hardened retries after an attempt yields no image (0 or 1)
    pub max_safety_retries: u32,
    /// Text appended to the prompt on a safety retry
    pub safety_suffix: String,
    /// Seconds between polls of a long-running video operation
    pub poll_interval_secs: u64,
    /// Maximum number of polls before the video operation is abandoned
    pub poll_attempt_cap: u32,
    /// Seconds allowed for thumbnail extraction before it fails
    pub thumbnail_timeout_secs: u64,
}

impl Default for StudioConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            schema_version: 1,
            image_model: "gemini-2.5-flash-image-preview".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            max_safety_retries: retry.max_retries,
            safety_suffix: retry.safety_suffix,
            poll_interval_secs: 10,
            poll_attempt_cap: 60,
            thumbnail_timeout_secs: 30,
        }
    }
}

impl StudioConfig {
    /// Get the studio dot-directory
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".image-studio"))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file or return default
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                debug!("Failed to load config, using default: {}", e);
                Self::default()
            }
        }
    }

    /// Load config from file
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: StudioConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// The retry policy encoded in this config
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_safety_retries.min(1),
            safety_suffix: self.safety_suffix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SAFETY_SUFFIX;

    #[test]
    fn test_default_config() {
        let config = StudioConfig::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.max_safety_retries, 0);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.poll_attempt_cap, 60);
        assert_eq!(config.safety_suffix, SAFETY_SUFFIX);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let mut config = StudioConfig::default();
        config.max_safety_retries = 1;
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 1);

        // Retry count is clamped to the two supported behaviors
        config.max_safety_retries = 7;
        assert_eq!(config.retry_policy().max_retries, 1);
    }

    #[test]
    fn test_config_dir() {
        let path = StudioConfig::config_dir().unwrap();
        assert!(path.to_string_lossy().contains(".image-studio"));
    }

    #[test]
    fn test_config_path() {
        let path = StudioConfig::config_path().unwrap();
        assert!(path.to_string_lossy().ends_with("config.json"));
    }

    #[test]
    fn test_json_round_trip() {
        let config = StudioConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: StudioConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.image_model, config.image_model);
        assert_eq!(restored.video_model, config.video_model);
        assert_eq!(restored.poll_attempt_cap, config.poll_attempt_cap);
    }
}
