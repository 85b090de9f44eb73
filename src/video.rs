//! Video post-processing.
//!
//! Derives a representative still image from a generated video asset for
//! gallery display: seek a fixed offset into the asset, capture the visible
//! frame, re-encode as a lossy still. Frame extraction shells out to ffmpeg
//! with a hard timeout so an asset that never finishes seeking fails instead
//! of hanging the flow.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

use crate::encoding::{encode_bytes, EncodedImage};
use crate::error::StudioError;

/// Offset into the asset at which the thumbnail frame is captured
pub const THUMBNAIL_OFFSET_SECS: u32 = 1;

/// Quality for the lossy still
const JPEG_QUALITY: u8 = 80;

/// ffmpeg invocation: seek, grab one frame, pipe it out as png.
fn ffmpeg_args(path: &Path) -> Vec<String> {
    vec![
        "-ss".to_string(),
        THUMBNAIL_OFFSET_SECS.to_string(),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-f".to_string(),
        "image2pipe".to_string(),
        "-vcodec".to_string(),
        "png".to_string(),
        "-".to_string(),
    ]
}

/// Capture the frame at the fixed offset and return it as a JPEG still.
pub async fn extract_thumbnail(
    video_path: &Path,
    timeout: Duration,
) -> Result<EncodedImage, StudioError> {
    debug!("Extracting thumbnail from {:?}", video_path);

    let child = tokio::process::Command::new("ffmpeg")
        .args(ffmpeg_args(video_path))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| StudioError::Decode(format!("failed to launch ffmpeg: {}", e)))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            warn!("Thumbnail extraction timed out after {:?}", timeout);
            StudioError::Decode(format!(
                "thumbnail extraction timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| StudioError::Decode(format!("ffmpeg did not complete: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr.lines().last().unwrap_or("unknown ffmpeg failure");
        return Err(StudioError::Decode(format!(
            "ffmpeg exited with {}: {}",
            output.status, tail
        )));
    }
    if output.stdout.is_empty() {
        return Err(StudioError::Decode(
            "ffmpeg produced no frame data".to_string(),
        ));
    }

    reencode_frame(&output.stdout)
}

/// Convenience wrapper for in-memory video payloads: round-trip through a
/// temp file since ffmpeg needs a seekable input.
pub async fn thumbnail_from_bytes(
    video_bytes: &[u8],
    timeout: Duration,
) -> Result<EncodedImage, StudioError> {
    let mut file = tempfile::Builder::new()
        .prefix("image-studio-video-")
        .suffix(".mp4")
        .tempfile()
        .map_err(|e| StudioError::Decode(format!("failed to create temp file: {}", e)))?;
    file.write_all(video_bytes)
        .map_err(|e| StudioError::Decode(format!("failed to write temp file: {}", e)))?;

    extract_thumbnail(file.path(), timeout).await
}

/// Re-encode a captured png frame as a JPEG still.
fn reencode_frame(png_bytes: &[u8]) -> Result<EncodedImage, StudioError> {
    use image::codecs::jpeg::JpegEncoder;

    let frame = image::load_from_memory(png_bytes)
        .map_err(|e| StudioError::Decode(format!("failed to decode captured frame: {}", e)))?;
    let rgb = frame.to_rgb8();

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder
        .encode_image(&rgb)
        .map_err(|e| StudioError::Decode(format!("JPEG encode failed: {}", e)))?;

    encode_bytes(&jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ffmpeg_available() -> bool {
        std::process::Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_ffmpeg_args_shape() {
        let args = ffmpeg_args(Path::new("/tmp/clip.mp4"));

        // Seek happens before the input so ffmpeg jumps instead of decoding
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], THUMBNAIL_OFFSET_SECS.to_string());
        assert_eq!(args[input + 1], "/tmp/clip.mp4");

        // Exactly one frame, piped to stdout
        let frames = args.iter().position(|a| a == "-frames:v").unwrap();
        assert_eq!(args[frames + 1], "1");
        assert_eq!(args.last().unwrap(), "-");
    }

    #[test]
    fn test_reencode_frame_produces_jpeg() {
        // A real 2x2 png, produced in-process
        let mut png = Vec::new();
        let buffer = image::RgbImage::from_pixel(2, 2, image::Rgb([200u8, 10, 10]));
        image::DynamicImage::ImageRgb8(buffer)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let still = reencode_frame(&png).unwrap();
        assert_eq!(still.mime_type, "image/jpeg");
        assert!(!still.data.is_empty());
    }

    #[test]
    fn test_reencode_frame_rejects_garbage() {
        let result = reencode_frame(&[0, 1, 2, 3, 4]);
        assert!(matches!(result, Err(StudioError::Decode(_))));
    }

    #[tokio::test]
    async fn test_extract_thumbnail_missing_file() {
        if !ffmpeg_available() {
            eprintln!("Skipping test_extract_thumbnail_missing_file: ffmpeg not installed");
            return;
        }

        let result = extract_thumbnail(
            Path::new("/nonexistent/definitely-missing.mp4"),
            Duration::from_secs(10),
        )
        .await;
        assert!(matches!(result, Err(StudioError::Decode(_))));
    }

    #[tokio::test]
    async fn test_thumbnail_from_garbage_bytes() {
        if !ffmpeg_available() {
            eprintln!("Skipping test_thumbnail_from_garbage_bytes: ffmpeg not installed");
            return;
        }

        let result = thumbnail_from_bytes(b"not a video", Duration::from_secs(10)).await;
        assert!(matches!(result, Err(StudioError::Decode(_))));
    }
}
