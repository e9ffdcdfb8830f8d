use crate::device::{CameraDevice, DeviceConstraints, DeviceStream, Orientation};
use crate::error::{CaptureError, Result};
use crate::events::{EventBus, FoodwatchEvent};
use crate::frame::CapturedFrame;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Capture session lifecycle states.
///
/// `Idle -> Requesting -> Active`, `Requesting -> Error`, `Error ->
/// Requesting` on retry, any state `-> Stopped`. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Active,
    Error,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Requesting => "Requesting",
            SessionState::Active => "Active",
            SessionState::Error => "Error",
            SessionState::Stopped => "Stopped",
        }
    }
}

/// Stateful owner of a live camera acquisition.
///
/// The session exclusively owns its device stream; every exit path
/// (error, explicit stop, drop) releases it. Operations take `&mut self`,
/// so `start`/`switch_orientation`/`stop` are serialized per session and
/// two live streams can never coexist.
pub struct CaptureSession {
    device: Arc<dyn CameraDevice>,
    event_bus: Arc<EventBus>,
    orientation: Orientation,
    ideal_resolution: (u32, u32),
    state: SessionState,
    stream: Option<Box<dyn DeviceStream>>,
    last_error: Option<String>,
}

impl CaptureSession {
    pub fn new(
        device: Arc<dyn CameraDevice>,
        event_bus: Arc<EventBus>,
        orientation: Orientation,
        ideal_resolution: (u32, u32),
    ) -> Self {
        Self {
            device,
            event_bus,
            orientation,
            ideal_resolution,
            state: SessionState::Idle,
            stream: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Human-readable cause of the last acquisition failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Acquire a device stream with the given orientation.
    ///
    /// Any live stream is fully torn down before the new request is made.
    /// On failure the session lands in `Error` with a recorded cause and is
    /// not retried automatically; calling `start` again retries.
    pub async fn start(&mut self, orientation: Orientation) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Err(CaptureError::NotActive {
                state: self.state.as_str().to_string(),
            }
            .into());
        }

        self.teardown_stream();
        self.orientation = orientation;
        self.state = SessionState::Requesting;
        self.last_error = None;

        let constraints = DeviceConstraints::new(
            orientation,
            self.ideal_resolution.0,
            self.ideal_resolution.1,
        );
        debug!(
            "Requesting device stream ({}, {}x{})",
            orientation.as_str(),
            constraints.ideal_width,
            constraints.ideal_height
        );

        match self.device.acquire(&constraints).await {
            Ok(stream) => {
                let (width, height) = stream.dimensions();
                self.stream = Some(stream);
                self.state = SessionState::Active;
                info!(
                    "Camera active ({}, {}x{})",
                    orientation.as_str(),
                    width,
                    height
                );
                self.event_bus.publish(FoodwatchEvent::CameraStarted {
                    orientation: orientation.as_str().to_string(),
                    timestamp: SystemTime::now(),
                });
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Error;
                self.last_error = Some(e.to_string());
                warn!("Camera acquisition failed: {}", e);
                self.event_bus.publish(FoodwatchEvent::CameraError {
                    error: e.to_string(),
                    timestamp: SystemTime::now(),
                });
                Err(e.into())
            }
        }
    }

    /// Toggle Front/Rear and re-acquire.
    ///
    /// The previous stream is always torn down first, even if the new
    /// acquisition fails.
    pub async fn switch_orientation(&mut self) -> Result<()> {
        let next = self.orientation.toggled();
        debug!("Switching camera orientation to {}", next.as_str());
        self.start(next).await
    }

    /// Read the current visual buffer as a still frame.
    ///
    /// Valid only while `Active`.
    pub fn capture_frame(&mut self) -> Result<CapturedFrame> {
        if self.state != SessionState::Active {
            return Err(CaptureError::NotActive {
                state: self.state.as_str().to_string(),
            }
            .into());
        }

        let state = self.state;
        let stream = self.stream.as_mut().ok_or_else(|| CaptureError::NotActive {
            state: state.as_str().to_string(),
        })?;

        let frame = stream.read_frame()?;
        debug!("Captured frame ({}x{})", frame.width, frame.height);
        self.event_bus.publish(FoodwatchEvent::FrameCaptured {
            width: frame.width,
            height: frame.height,
            timestamp: SystemTime::now(),
        });
        Ok(frame)
    }

    /// Release the device stream and terminate the session.
    ///
    /// Idempotent; safe to call from any state.
    pub fn stop(&mut self) {
        self.teardown_stream();
        if self.state != SessionState::Stopped {
            info!("Capture session stopped");
            self.state = SessionState::Stopped;
        }
    }

    fn teardown_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
            debug!("Device stream released");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Release on owner teardown regardless of state
        self.teardown_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceClaims, StubCamera};

    fn session_with_stub() -> (CaptureSession, Arc<DeviceClaims>) {
        let claims = DeviceClaims::new();
        let camera = Arc::new(StubCamera::new("cam0", Arc::clone(&claims)));
        let bus = Arc::new(EventBus::new(16));
        let session = CaptureSession::new(camera, bus, Orientation::Rear, (1280, 720));
        (session, claims)
    }

    #[tokio::test]
    async fn test_start_transitions_to_active() {
        let (mut session, claims) = session_with_stub();
        assert_eq!(session.state(), SessionState::Idle);

        session.start(Orientation::Rear).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.orientation(), Orientation::Rear);
        assert!(claims.is_claimed("cam0"));
    }

    #[tokio::test]
    async fn test_switch_orientation_tears_down_then_reacquires() {
        let (mut session, claims) = session_with_stub();
        session.start(Orientation::Rear).await.unwrap();

        // If the old stream were not released first, the stub backend
        // would reject the second acquisition as busy.
        session.switch_orientation().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.orientation(), Orientation::Front);
        assert!(claims.is_claimed("cam0"));
    }

    #[tokio::test]
    async fn test_capture_frame_requires_active_state() {
        let (mut session, _claims) = session_with_stub();
        let err = session.capture_frame().unwrap_err();
        assert!(matches!(
            err,
            crate::error::FoodwatchError::Capture(CaptureError::NotActive { .. })
        ));

        session.start(Orientation::Rear).await.unwrap();
        let frame = session.capture_frame().unwrap();
        assert_eq!((frame.width, frame.height), (1280, 720));
        assert!(frame.validate_size());
    }

    #[tokio::test]
    async fn test_stop_releases_device_and_is_idempotent() {
        let (mut session, claims) = session_with_stub();
        session.start(Orientation::Rear).await.unwrap();
        assert!(claims.is_claimed("cam0"));

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!claims.is_claimed("cam0"));

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_start_after_stop_is_rejected() {
        let (mut session, _claims) = session_with_stub();
        session.stop();
        let err = session.start(Orientation::Rear).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::FoodwatchError::Capture(CaptureError::NotActive { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_start_lands_in_error_with_cause() {
        let claims = DeviceClaims::new();
        let camera = Arc::new(StubCamera::denying(
            "cam0",
            Arc::clone(&claims),
            "Permission denied",
        ));
        let bus = Arc::new(EventBus::new(16));
        let mut session = CaptureSession::new(camera, bus, Orientation::Rear, (1280, 720));

        assert!(session.start(Orientation::Rear).await.is_err());
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.last_error(), Some("Device access failed: Permission denied"));
        assert!(!claims.is_claimed("cam0"));
    }

    /// Backend that denies the first acquisition and succeeds afterwards
    struct FlakyCamera {
        inner: StubCamera,
        attempts: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl CameraDevice for FlakyCamera {
        async fn acquire(
            &self,
            constraints: &crate::device::DeviceConstraints,
        ) -> std::result::Result<Box<dyn crate::device::DeviceStream>, CaptureError> {
            let attempt = self
                .attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if attempt == 0 {
                return Err(CaptureError::DeviceAccess {
                    details: "device warming up".to_string(),
                });
            }
            self.inner.acquire(constraints).await
        }
    }

    #[tokio::test]
    async fn test_retry_from_error_state() {
        let claims = DeviceClaims::new();
        let camera = Arc::new(FlakyCamera {
            inner: StubCamera::new("cam0", Arc::clone(&claims)),
            attempts: std::sync::atomic::AtomicU32::new(0),
        });
        let bus = Arc::new(EventBus::new(16));
        let mut session = CaptureSession::new(camera, bus, Orientation::Rear, (640, 480));

        assert!(session.start(Orientation::Rear).await.is_err());
        assert_eq!(session.state(), SessionState::Error);

        session.start(Orientation::Rear).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_drop_releases_device() {
        let (mut session, claims) = session_with_stub();
        session.start(Orientation::Rear).await.unwrap();
        assert!(claims.is_claimed("cam0"));

        drop(session);
        assert!(!claims.is_claimed("cam0"));
    }

    #[tokio::test]
    async fn test_exclusive_acquisition_across_sessions() {
        let claims = DeviceClaims::new();
        let camera = Arc::new(StubCamera::new("cam0", Arc::clone(&claims)));
        let bus = Arc::new(EventBus::new(16));

        let mut first =
            CaptureSession::new(Arc::clone(&camera) as Arc<dyn CameraDevice>, Arc::clone(&bus), Orientation::Rear, (640, 480));
        first.start(Orientation::Rear).await.unwrap();

        let mut second =
            CaptureSession::new(camera, bus, Orientation::Rear, (640, 480));
        let err = second.start(Orientation::Rear).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::FoodwatchError::Capture(CaptureError::DeviceBusy { .. })
        ));
        assert_eq!(second.state(), SessionState::Error);
    }
}
