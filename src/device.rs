use crate::error::CaptureError;
use crate::frame::{CapturedFrame, RGB24_BYTES_PER_PIXEL};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Camera orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Operator-facing camera
    Front,
    /// World-facing camera
    Rear,
}

impl Orientation {
    /// The opposite orientation
    pub fn toggled(&self) -> Self {
        match self {
            Orientation::Front => Orientation::Rear,
            Orientation::Rear => Orientation::Front,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Front => "Front",
            Orientation::Rear => "Rear",
        }
    }
}

/// Constraints handed to the device backend when requesting a stream.
///
/// Width and height are hints; the backend may open the device at a
/// different native resolution. Audio is never requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConstraints {
    pub orientation: Orientation,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl DeviceConstraints {
    pub fn new(orientation: Orientation, ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            orientation,
            ideal_width,
            ideal_height,
            audio: false,
        }
    }
}

/// A live device stream exclusively owned by one capture session.
///
/// `release` must be idempotent; implementations also release on drop so the
/// device cannot leak past an abnormal exit of the owning session.
pub trait DeviceStream: Send {
    /// Native stream dimensions (width, height)
    fn dimensions(&self) -> (u32, u32);

    /// Read the current visual buffer as an RGB24 raster
    fn read_frame(&mut self) -> Result<CapturedFrame, CaptureError>;

    /// Release the underlying device
    fn release(&mut self);

    /// Whether the stream has been released
    fn is_released(&self) -> bool;
}

/// Camera device backend able to hand out exclusive streams
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Request a stream under the given constraints.
    ///
    /// Fails with `DeviceBusy` if another holder already owns the device
    /// and with `DeviceAccess` when acquisition is denied or unavailable.
    async fn acquire(
        &self,
        constraints: &DeviceConstraints,
    ) -> Result<Box<dyn DeviceStream>, CaptureError>;
}

/// Registry of claimed device identifiers, enforcing one holder per device
#[derive(Default)]
pub struct DeviceClaims {
    claimed: Mutex<HashSet<String>>,
}

impl DeviceClaims {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim a device, failing if it is already held
    pub fn claim(&self, device: &str) -> Result<(), CaptureError> {
        let mut claimed = self.claimed.lock();
        if !claimed.insert(device.to_string()) {
            return Err(CaptureError::DeviceBusy {
                device: device.to_string(),
            });
        }
        debug!("Device '{}' claimed", device);
        Ok(())
    }

    /// Release a previously claimed device (no-op if not claimed)
    pub fn release(&self, device: &str) {
        let mut claimed = self.claimed.lock();
        if claimed.remove(device) {
            debug!("Device '{}' released", device);
        }
    }

    pub fn is_claimed(&self, device: &str) -> bool {
        self.claimed.lock().contains(device)
    }
}

/// Deterministic in-memory camera backend.
///
/// Produces synthetic RGB24 frames at the requested ideal resolution so the
/// pipeline runs without hardware. Can be configured to deny acquisition.
pub struct StubCamera {
    device: String,
    claims: Arc<DeviceClaims>,
    deny_with: Option<String>,
}

impl StubCamera {
    pub fn new(device: impl Into<String>, claims: Arc<DeviceClaims>) -> Self {
        Self {
            device: device.into(),
            claims,
            deny_with: None,
        }
    }

    /// Backend that denies every acquisition with the given cause
    pub fn denying(device: impl Into<String>, claims: Arc<DeviceClaims>, cause: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            claims,
            deny_with: Some(cause.into()),
        }
    }
}

#[async_trait]
impl CameraDevice for StubCamera {
    async fn acquire(
        &self,
        constraints: &DeviceConstraints,
    ) -> Result<Box<dyn DeviceStream>, CaptureError> {
        if let Some(cause) = &self.deny_with {
            return Err(CaptureError::DeviceAccess {
                details: cause.clone(),
            });
        }

        self.claims.claim(&self.device)?;
        debug!(
            "Stub stream opened on '{}' ({}x{}, {})",
            self.device,
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.orientation.as_str()
        );

        Ok(Box::new(StubStream {
            device: self.device.clone(),
            claims: Arc::clone(&self.claims),
            width: constraints.ideal_width,
            height: constraints.ideal_height,
            orientation: constraints.orientation,
            frame_counter: 0,
            released: false,
        }))
    }
}

/// Stream handed out by [`StubCamera`]
pub struct StubStream {
    device: String,
    claims: Arc<DeviceClaims>,
    width: u32,
    height: u32,
    orientation: Orientation,
    frame_counter: u64,
    released: bool,
}

impl DeviceStream for StubStream {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<CapturedFrame, CaptureError> {
        if self.released {
            return Err(CaptureError::FrameRead {
                details: "stream already released".to_string(),
            });
        }

        self.frame_counter += 1;
        let mut pixels =
            vec![0u8; self.width as usize * self.height as usize * RGB24_BYTES_PER_PIXEL];
        // Gradient pattern seeded by the frame counter, distinct per orientation
        let seed = (self.frame_counter as u8).wrapping_mul(31);
        let channel_bias = match self.orientation {
            Orientation::Front => 0u8,
            Orientation::Rear => 128u8,
        };
        for (i, px) in pixels.chunks_exact_mut(RGB24_BYTES_PER_PIXEL).enumerate() {
            px[0] = seed.wrapping_add(i as u8);
            px[1] = channel_bias;
            px[2] = (i / self.width as usize) as u8;
        }

        Ok(CapturedFrame::new(self.width, self.height, Utc::now(), pixels))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.claims.release(&self.device);
        }
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for StubStream {
    fn drop(&mut self) {
        if !self.released {
            warn!("Stub stream for '{}' dropped without release", self.device);
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_produces_frames_at_requested_resolution() {
        let claims = DeviceClaims::new();
        let camera = StubCamera::new("cam0", Arc::clone(&claims));
        let constraints = DeviceConstraints::new(Orientation::Rear, 640, 480);

        let mut stream = camera.acquire(&constraints).await.unwrap();
        assert_eq!(stream.dimensions(), (640, 480));

        let frame = stream.read_frame().unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
        assert!(frame.validate_size());

        stream.release();
        assert!(!claims.is_claimed("cam0"));
    }

    #[tokio::test]
    async fn test_second_acquire_fails_while_claimed() {
        let claims = DeviceClaims::new();
        let camera = StubCamera::new("cam0", Arc::clone(&claims));
        let constraints = DeviceConstraints::new(Orientation::Rear, 1280, 720);

        let _stream = camera.acquire(&constraints).await.unwrap();
        let second = camera.acquire(&constraints).await;
        assert!(matches!(second, Err(CaptureError::DeviceBusy { .. })));
    }

    #[tokio::test]
    async fn test_drop_releases_claim() {
        let claims = DeviceClaims::new();
        let camera = StubCamera::new("cam0", Arc::clone(&claims));
        let constraints = DeviceConstraints::new(Orientation::Front, 320, 240);

        {
            let _stream = camera.acquire(&constraints).await.unwrap();
            assert!(claims.is_claimed("cam0"));
        }
        assert!(!claims.is_claimed("cam0"));
    }

    #[tokio::test]
    async fn test_denying_backend_reports_cause() {
        let claims = DeviceClaims::new();
        let camera = StubCamera::denying("cam0", claims, "Permission denied");
        let constraints = DeviceConstraints::new(Orientation::Rear, 1280, 720);

        let result = camera.acquire(&constraints).await;
        match result {
            Err(CaptureError::DeviceAccess { details }) => {
                assert_eq!(details, "Permission denied");
            }
            other => panic!("Unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_released_stream_refuses_reads() {
        let claims = DeviceClaims::new();
        let camera = StubCamera::new("cam0", claims);
        let constraints = DeviceConstraints::new(Orientation::Rear, 64, 64);

        let mut stream = camera.acquire(&constraints).await.unwrap();
        stream.release();
        stream.release(); // idempotent
        assert!(stream.is_released());
        assert!(matches!(
            stream.read_frame(),
            Err(CaptureError::FrameRead { .. })
        ));
    }
}
