//! Google Gemini generation gateway.
//!
//! The single seam to the external generation capability. Wraps multi-part
//! request construction against the generateContent endpoint, extracts
//! image/text from heterogeneous response shapes, normalizes failures into
//! the taxonomy, and drives the long-running video operation poll loop.
//!
//! Image parts are submitted in exactly the order the composed role labels
//! describe, followed by the instruction text and finally the raw user prompt.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::characters::Character;
use crate::config::StudioConfig;
use crate::encoding::EncodedImage;
use crate::error::{classify_provider_error, StudioError};
use crate::policy::RetryPolicy;
use crate::prompt::{self, AspectRatio, ComposedPrompt, StyleModifiers};

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODELS: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Generation calls can take a while; video submission even longer
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Output of any generation/edit call.
///
/// A settled, non-error result always carries `image` (a derived thumbnail in
/// the video case) or `video_ref` — never neither.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub image: Option<EncodedImage>,
    /// Accompanying text returned by the model, if any
    pub narrative_text: Option<String>,
    /// Reference to a generated video asset
    pub video_ref: Option<String>,
}

impl GenerationResult {
    pub fn has_payload(&self) -> bool {
        self.image.is_some() || self.video_ref.is_some()
    }
}

/// Polling parameters for long-running video operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 60,
        }
    }
}

// -- Response types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponsePart {
    inline_data: Option<GeminiInlineData>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoOperation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<VideoOperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoOperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoHandle>,
}

#[derive(Debug, Deserialize)]
struct VideoHandle {
    uri: Option<String>,
}

/// The external generation capability, as one substitutable interface.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn edit_image(
        &self,
        target: &EncodedImage,
        prompt: &str,
        character: Option<&Character>,
        faithfulness: u8,
        additional: Option<&EncodedImage>,
        modifiers: &StyleModifiers,
    ) -> Result<GenerationResult, StudioError>;

    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        character: Option<&Character>,
        faithfulness: u8,
        modifiers: &StyleModifiers,
    ) -> Result<GenerationResult, StudioError>;

    async fn upscale_image(&self, target: &EncodedImage) -> Result<GenerationResult, StudioError>;

    async fn generate_character_portrait(
        &self,
        description: &str,
        reference_images: &[EncodedImage],
    ) -> Result<GenerationResult, StudioError>;

    async fn generate_outfit(
        &self,
        character: &Character,
        outfit_prompt: &str,
        faithfulness: u8,
    ) -> Result<GenerationResult, StudioError>;

    /// Long-running: resolves only once the provider reports the operation done.
    async fn generate_video(
        &self,
        prompt: &str,
        seed_image: Option<&EncodedImage>,
        aspect_ratio: AspectRatio,
    ) -> Result<GenerationResult, StudioError>;

    /// Download the bytes behind a video reference.
    async fn fetch_video(&self, video_ref: &str) -> Result<Vec<u8>, StudioError>;

    /// Probe whether the configured credentials can reach the video capability.
    async fn verify_video_access(&self) -> Result<(), StudioError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    image_model: String,
    video_model: String,
    policy: RetryPolicy,
    poll: PollConfig,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Result<Self, StudioError> {
        Self::with_options(
            api_key,
            &StudioConfig::default(),
            RetryPolicy::default(),
            PollConfig::default(),
        )
    }

    /// Build a client from persisted configuration.
    pub fn from_config(api_key: &str, config: &StudioConfig) -> Result<Self, StudioError> {
        let poll = PollConfig {
            interval: Duration::from_secs(config.poll_interval_secs),
            max_attempts: config.poll_attempt_cap,
        };
        Self::with_options(api_key, config, config.retry_policy(), poll)
    }

    fn with_options(
        api_key: &str,
        config: &StudioConfig,
        policy: RetryPolicy,
        poll: PollConfig,
    ) -> Result<Self, StudioError> {
        if api_key.trim().is_empty() {
            return Err(StudioError::Authorization(
                "Gemini API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| StudioError::Unknown(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            image_model: config.image_model.clone(),
            video_model: config.video_model.clone(),
            policy,
            poll,
        })
    }

    /// Build the generateContent body: images in composed order, then the
    /// instruction text, then the raw user prompt as the final part.
    pub fn build_request_body(
        composed: &ComposedPrompt,
        user_prompt_override: Option<&str>,
        aspect_ratio: Option<AspectRatio>,
    ) -> serde_json::Value {
        let mut parts: Vec<serde_json::Value> = composed
            .images
            .iter()
            .map(|part| {
                serde_json::json!({
                    "inlineData": {
                        "mimeType": part.image.mime_type,
                        "data": part.image.data,
                    }
                })
            })
            .collect();

        if !composed.instruction.is_empty() {
            parts.push(serde_json::json!({ "text": composed.instruction }));
        }
        let user_prompt = user_prompt_override.unwrap_or(&composed.user_prompt);
        if !user_prompt.is_empty() {
            parts.push(serde_json::json!({ "text": user_prompt }));
        }

        let mut generation_config = serde_json::json!({
            "responseModalities": ["IMAGE", "TEXT"],
        });
        if let Some(ratio) = aspect_ratio {
            generation_config["imageConfig"] =
                serde_json::json!({ "aspectRatio": ratio.as_str() });
        }

        serde_json::json!({
            "contents": [{ "parts": parts }],
            "generationConfig": generation_config,
        })
    }

    /// First inline binary part becomes the image; first text part becomes the
    /// narrative. No binary part means the attempt failed — there is no
    /// partial-result state.
    pub fn extract_result(response: &GeminiResponse) -> Option<GenerationResult> {
        let parts = response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())?;

        let image = parts.iter().find_map(|p| p.inline_data.as_ref()).map(|d| {
            EncodedImage::from_base64(d.data.clone(), d.mime_type.clone())
        })?;
        let narrative_text = parts.iter().find_map(|p| p.text.clone());

        Some(GenerationResult {
            image: Some(image),
            narrative_text,
            video_ref: None,
        })
    }

    /// Why a response came back without an image, when the provider says.
    fn refusal_reason(response: &GeminiResponse) -> Option<String> {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Some(reason);
        }
        let candidate = response.candidates.first()?;
        match candidate.finish_reason.as_deref() {
            Some("STOP") | None => candidate
                .content
                .as_ref()
                .and_then(|c| c.parts.iter().find_map(|p| p.text.clone())),
            Some(other) => Some(other.to_string()),
        }
    }

    /// Map a non-success HTTP response into the taxonomy.
    fn classify_http_failure(status: u16, body: &str) -> StudioError {
        // Truncate the body so huge provider errors don't flood the UI
        let truncated = if body.len() > 300 { &body[..300] } else { body };
        match status {
            401 | 403 => StudioError::Authorization(format!("HTTP {}: {}", status, truncated)),
            429 | 500..=599 => StudioError::Transient(format!("HTTP {}: {}", status, truncated)),
            _ => classify_provider_error(&format!("HTTP {}: {}", status, truncated)),
        }
    }

    fn map_transport_error(err: reqwest::Error) -> StudioError {
        if err.is_timeout() || err.is_connect() {
            StudioError::Transient(format!("Request failed: {}", err))
        } else {
            StudioError::Unknown(format!("Request failed: {}", err))
        }
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, StudioError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header("x-goog-api-key", self.key_header()?)
            .json(body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::classify_http_failure(status.as_u16(), &error_body));
        }

        response
            .json()
            .await
            .map_err(|e| StudioError::Unknown(format!("Failed to parse provider response: {}", e)))
    }

    fn key_header(&self) -> Result<HeaderValue, StudioError> {
        HeaderValue::from_str(&self.api_key)
            .map_err(|e| StudioError::Authorization(format!("Invalid API key header: {}", e)))
    }

    /// Submit a composed request, applying the configured safety-retry policy
    /// when an attempt yields no image.
    async fn run_image_request(
        &self,
        composed: &ComposedPrompt,
        aspect_ratio: Option<AspectRatio>,
    ) -> Result<GenerationResult, StudioError> {
        let url = format!("{}/{}:generateContent", GEMINI_MODELS, self.image_model);
        let mut last_refusal: Option<String> = None;

        for attempt in 0..=self.policy.max_retries {
            let hardened;
            let user_prompt = if attempt == 0 {
                None
            } else {
                hardened = self.policy.harden(&composed.user_prompt);
                Some(hardened.as_str())
            };

            let body = Self::build_request_body(composed, user_prompt, aspect_ratio);
            debug!(
                "Gemini image request: {} image part(s), attempt {}",
                composed.images.len(),
                attempt + 1
            );

            let raw = self.post_json(&url, &body).await?;
            let response: GeminiResponse = serde_json::from_value(raw).map_err(|e| {
                StudioError::Unknown(format!("Unexpected provider response shape: {}", e))
            })?;

            if let Some(result) = Self::extract_result(&response) {
                info!("Gemini returned an image on attempt {}", attempt + 1);
                return Ok(result);
            }

            last_refusal = Self::refusal_reason(&response);
            if attempt < self.policy.max_retries {
                warn!(
                    "Attempt {} returned no image ({:?}), retrying with safety suffix",
                    attempt + 1,
                    last_refusal
                );
            }
        }

        // Terminal: every allowed attempt came back without an image
        Err(match last_refusal {
            Some(reason) => classify_content_refusal(&reason),
            None if self.policy.max_retries > 0 => StudioError::ContentPolicy(
                "The provider returned no image even after a hardened retry; \
                 the request was likely blocked by safety filters."
                    .to_string(),
            ),
            None => StudioError::Unknown("The provider returned no image".to_string()),
        })
    }
}

/// A refusal that names safety is a content-policy block; anything else goes
/// through the shared classifier.
fn classify_content_refusal(reason: &str) -> StudioError {
    let lowered = reason.to_lowercase();
    if lowered.contains("safety") || lowered.contains("prohibited") || lowered.contains("blocklist")
    {
        StudioError::ContentPolicy(reason.to_string())
    } else {
        classify_provider_error(reason)
    }
}

#[async_trait]
impl GenerationApi for GeminiClient {
    async fn edit_image(
        &self,
        target: &EncodedImage,
        prompt: &str,
        character: Option<&Character>,
        faithfulness: u8,
        additional: Option<&EncodedImage>,
        modifiers: &StyleModifiers,
    ) -> Result<GenerationResult, StudioError> {
        let composed =
            prompt::compose_edit(prompt, target, character, faithfulness, additional, modifiers);
        self.run_image_request(&composed, None).await
    }

    async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        character: Option<&Character>,
        faithfulness: u8,
        modifiers: &StyleModifiers,
    ) -> Result<GenerationResult, StudioError> {
        let composed = prompt::compose_generate(prompt, character, faithfulness, modifiers);
        self.run_image_request(&composed, Some(aspect_ratio)).await
    }

    async fn upscale_image(&self, target: &EncodedImage) -> Result<GenerationResult, StudioError> {
        let composed = prompt::compose_upscale(target);
        self.run_image_request(&composed, None).await
    }

    async fn generate_character_portrait(
        &self,
        description: &str,
        reference_images: &[EncodedImage],
    ) -> Result<GenerationResult, StudioError> {
        let composed = prompt::compose_portrait(description, reference_images);
        self.run_image_request(&composed, None).await
    }

    async fn generate_outfit(
        &self,
        character: &Character,
        outfit_prompt: &str,
        faithfulness: u8,
    ) -> Result<GenerationResult, StudioError> {
        let composed = prompt::compose_outfit(character, outfit_prompt, faithfulness);
        self.run_image_request(&composed, None).await
    }

    async fn generate_video(
        &self,
        prompt_text: &str,
        seed_image: Option<&EncodedImage>,
        aspect_ratio: AspectRatio,
    ) -> Result<GenerationResult, StudioError> {
        let composed = prompt::compose_video(prompt_text, seed_image);

        let full_prompt = if composed.user_prompt.is_empty() {
            composed.instruction.clone()
        } else {
            format!("{}\n\n{}", composed.instruction, composed.user_prompt)
        };

        let mut instance = serde_json::json!({ "prompt": full_prompt });
        if let Some(part) = composed.images.first() {
            instance["image"] = serde_json::json!({
                "bytesBase64Encoded": part.image.data,
                "mimeType": part.image.mime_type,
            });
        }
        let body = serde_json::json!({
            "instances": [instance],
            "parameters": {
                "aspectRatio": aspect_ratio.as_str(),
                "numberOfVideos": 1,
            }
        });

        let url = format!(
            "{}/{}:predictLongRunning",
            GEMINI_MODELS, self.video_model
        );
        info!("Submitting video generation ({})", aspect_ratio.as_str());
        let raw = self.post_json(&url, &body).await?;
        let operation: VideoOperation = serde_json::from_value(raw).map_err(|e| {
            StudioError::Unknown(format!("Unexpected video operation shape: {}", e))
        })?;
        let name = operation.name.ok_or_else(|| {
            StudioError::Unknown("Video operation did not return a handle".to_string())
        })?;

        // Poll the operation handle until completion or the attempt cap
        for attempt in 1..=self.poll.max_attempts {
            tokio::time::sleep(self.poll.interval).await;

            let poll_url = format!("{}/{}", GEMINI_BASE, name);
            let response = self
                .client
                .get(&poll_url)
                .header("x-goog-api-key", self.key_header()?)
                .send()
                .await
                .map_err(Self::map_transport_error)?;

            let status = response.status();
            if !status.is_success() {
                let error_body = response.text().await.unwrap_or_default();
                return Err(Self::classify_http_failure(status.as_u16(), &error_body));
            }

            let operation: VideoOperation = response.json().await.map_err(|e| {
                StudioError::Unknown(format!("Failed to parse video operation: {}", e))
            })?;

            if let Some(err) = operation.error {
                let message = err
                    .message
                    .unwrap_or_else(|| "video generation failed".to_string());
                return Err(classify_provider_error(&message));
            }

            if operation.done {
                let uri = operation
                    .response
                    .and_then(|r| r.generate_video_response)
                    .and_then(|r| r.generated_samples.into_iter().next())
                    .and_then(|s| s.video)
                    .and_then(|v| v.uri)
                    .ok_or_else(|| {
                        StudioError::Unknown(
                            "Video operation completed without a playable reference".to_string(),
                        )
                    })?;
                info!("Video ready after {} poll(s)", attempt);
                return Ok(GenerationResult {
                    image: None,
                    narrative_text: None,
                    video_ref: Some(uri),
                });
            }

            debug!("Video operation pending, poll {}", attempt);
        }

        Err(StudioError::Transient(format!(
            "Timed out waiting for the video operation after {} polls",
            self.poll.max_attempts
        )))
    }

    async fn fetch_video(&self, video_ref: &str) -> Result<Vec<u8>, StudioError> {
        let mut url = url::Url::parse(video_ref)
            .map_err(|e| StudioError::Unknown(format!("Invalid video reference: {}", e)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(Self::classify_http_failure(status.as_u16(), &error_body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StudioError::Transient(format!("Video download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }

    async fn verify_video_access(&self) -> Result<(), StudioError> {
        let url = format!("{}/{}", GEMINI_MODELS, self.video_model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", self.key_header()?)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let error_body = response.text().await.unwrap_or_default();
        match Self::classify_http_failure(status.as_u16(), &error_body) {
            // A missing model entity means the key cannot see the capability
            StudioError::NotFound(msg) | StudioError::Unknown(msg) if status.as_u16() == 404 => {
                Err(StudioError::Authorization(msg))
            }
            other => Err(other),
        }
    }
}
