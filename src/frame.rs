use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Bytes per pixel for the RGB24 raster produced by capture
pub const RGB24_BYTES_PER_PIXEL: usize = 3;

/// A single still frame pulled from an active camera stream.
///
/// Frames carry an uncompressed RGB24 raster at the live stream's native
/// dimensions. Pixel data is shared so a frame can be handed to the encoder
/// without copying.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Capture timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// Raw RGB24 pixel data
    pub pixels: Arc<Vec<u8>>,
}

impl CapturedFrame {
    pub fn new(width: u32, height: u32, timestamp: DateTime<Utc>, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            timestamp,
            pixels: Arc::new(pixels),
        }
    }

    /// Expected pixel buffer size for the frame dimensions
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * RGB24_BYTES_PER_PIXEL
    }

    /// Check that the pixel buffer matches the declared dimensions
    pub fn validate_size(&self) -> bool {
        self.pixels.len() == self.expected_size()
    }

    /// Whether the frame carries any pixels at all
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_frame_size() {
        let frame = CapturedFrame::new(4, 2, Utc::now(), vec![0u8; 4 * 2 * 3]);
        assert!(frame.validate_size());
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_invalid_frame_size() {
        let frame = CapturedFrame::new(640, 480, Utc::now(), vec![0u8; 100]);
        assert!(!frame.validate_size());
    }

    #[test]
    fn test_empty_frame() {
        let frame = CapturedFrame::new(0, 0, Utc::now(), Vec::new());
        assert!(frame.is_empty());

        let degenerate = CapturedFrame::new(640, 0, Utc::now(), vec![0u8; 10]);
        assert!(degenerate.is_empty());
    }
}
