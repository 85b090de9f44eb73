//! Binary transcoding utility.
//!
//! Converts raw uploaded bytes to base64 with a detected MIME type and back.
//! `EncodedImage` is the payload representation used on the wire, in the
//! stores, and across the session; standard base64 is canonical, so two
//! payloads hold identical bytes exactly when their `data` strings are equal.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StudioError;

/// Fallback MIME type when detection fails, matching the provider default
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// A binary payload carried as base64 plus its MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

impl EncodedImage {
    /// Build from raw base64 that already exists (e.g. a provider response part).
    pub fn from_base64(data: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        }
    }
}

/// Sniff the MIME type from magic bytes.
fn detect_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        DEFAULT_MIME_TYPE
    }
}

/// Encode raw bytes into a base64 payload with a sniffed MIME type.
///
/// Empty input fails with `Read` — an upload that yielded no bytes is a
/// failed read, not an empty image.
pub fn encode_bytes(bytes: &[u8]) -> Result<EncodedImage, StudioError> {
    if bytes.is_empty() {
        return Err(StudioError::Read("file produced no data".to_string()));
    }
    Ok(EncodedImage {
        data: STANDARD.encode(bytes),
        mime_type: detect_mime_type(bytes).to_string(),
    })
}

/// Read and encode a file from disk.
pub fn encode_file(path: &Path) -> Result<EncodedImage, StudioError> {
    let bytes = std::fs::read(path)
        .map_err(|e| StudioError::Read(format!("{}: {}", path.display(), e)))?;
    encode_bytes(&bytes)
}

/// Decode a payload back into raw bytes for download/preview reconstruction.
pub fn decode(image: &EncodedImage) -> Result<Vec<u8>, StudioError> {
    STANDARD
        .decode(&image.data)
        .map_err(|e| StudioError::Read(format!("invalid base64 payload: {}", e)))
}
