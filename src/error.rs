use thiserror::Error;

/// Camera acquisition and capture-session errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device access failed: {details}")]
    DeviceAccess { details: String },

    #[error("Device '{device}' is already held by another session")]
    DeviceBusy { device: String },

    #[error("Capture session is not active (state: {state})")]
    NotActive { state: String },

    #[error("Device stream produced no frame: {details}")]
    FrameRead { details: String },
}

/// Image encoding errors
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Encoding failed: {details}")]
    EncodingFailed { details: String },
}

/// Detection client and aggregation errors
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detection endpoint returned HTTP {status}")]
    Transport { status: u16 },

    #[error("Detection response failed schema validation: {details}")]
    MalformedResponse { details: String },

    #[error("Detection service reported failure{}", .message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    DetectionFailed { message: Option<String> },

    #[error("Detection tally is internally inconsistent: {details}")]
    InconsistentTally { details: String },

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl DetectionError {
    /// Single operator-facing message for all detection failures.
    ///
    /// The variant is preserved for diagnostics; the operator only sees
    /// that detection failed and should retry.
    pub fn user_message(&self) -> &'static str {
        "Detection failed - please try again"
    }
}

/// Notification workflow contract violations
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Unknown notification channel: {name}")]
    UnknownChannel { name: String },

    #[error("Cannot acknowledge before any notification has been sent")]
    NothingSentYet,
}

#[derive(Error, Debug)]
pub enum FoodwatchError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("System error: {message}")]
    System { message: String },
}

impl FoodwatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FoodwatchError>;
