pub mod aggregate;
pub mod alert;
pub mod client;
pub mod config;
pub mod device;
pub mod encoder;
pub mod error;
pub mod events;
pub mod frame;
pub mod impact;
pub mod pipeline;
pub mod session;
pub mod workflow;

pub use aggregate::aggregate;
pub use alert::{evaluate, AlertState};
pub use client::{DetectionClient, DetectionResponse, DetectionResult};
pub use config::FoodwatchConfig;
pub use device::{CameraDevice, DeviceClaims, DeviceConstraints, DeviceStream, Orientation, StubCamera};
pub use encoder::{encode, ImageArtifact};
pub use error::{CaptureError, DetectionError, EncodeError, FoodwatchError, Result, WorkflowError};
pub use events::{EventBus, FoodwatchEvent};
pub use frame::CapturedFrame;
pub use impact::{estimate, ImpactEstimate};
pub use pipeline::DetectionPipeline;
pub use session::{CaptureSession, SessionState};
pub use workflow::{Channel, NotificationWorkflow, NotifyOutcome, WorkflowState};
