use crate::error::EncodeError;
use crate::frame::CapturedFrame;
use chrono::SecondsFormat;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageEncoder};
use tracing::debug;

/// JPEG quality factor (0.9 of max)
const JPEG_QUALITY: u8 = 90;

const FILENAME_PREFIX: &str = "camera-capture-";
const MIME_TYPE: &str = "image/jpeg";

/// Encoded, transport-ready image payload
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub filename: String,
}

/// Rasterize a captured frame into a JPEG artifact at its native dimensions.
///
/// Deterministic given identical frame and timestamp: the filename is the
/// capture timestamp with `:` and `.` replaced by `-`, prefixed
/// `camera-capture-` and suffixed `.jpg`.
pub fn encode(frame: &CapturedFrame) -> Result<ImageArtifact, EncodeError> {
    if frame.is_empty() {
        return Err(EncodeError::EncodingFailed {
            details: "frame is empty".to_string(),
        });
    }
    if !frame.validate_size() {
        return Err(EncodeError::EncodingFailed {
            details: format!(
                "pixel buffer size {} does not match {}x{} RGB24 frame",
                frame.pixels.len(),
                frame.width,
                frame.height
            ),
        });
    }

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .write_image(&frame.pixels, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| EncodeError::EncodingFailed {
            details: e.to_string(),
        })?;

    let filename = filename_for_timestamp(frame);
    debug!("Encoded frame into {} ({} bytes)", filename, bytes.len());

    Ok(ImageArtifact {
        bytes,
        mime_type: MIME_TYPE,
        filename,
    })
}

fn filename_for_timestamp(frame: &CapturedFrame) -> String {
    let stamp = frame
        .timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}{}.jpg", FILENAME_PREFIX, stamp)
}
