use crate::device::Orientation;
use crate::error::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FoodwatchConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Device identifier handed to the camera backend
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Initial camera orientation
    #[serde(default = "default_camera_orientation")]
    pub orientation: Orientation,

    /// Preferred resolution hint (width, height)
    #[serde(default = "default_camera_resolution")]
    pub ideal_resolution: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Detection endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Alert threshold applied when a class has no per-class override
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u32,

    /// Class names the detection model is trained on
    #[serde(default = "default_known_classes")]
    pub known_classes: Vec<String>,

    /// Per-class alert threshold overrides
    #[serde(default)]
    pub class_thresholds: HashMap<String, u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowConfig {
    /// Delay before the impact estimate is revealed after the first
    /// notification, in milliseconds
    #[serde(default = "default_impact_reveal_delay_ms")]
    pub impact_reveal_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus channel capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_camera_device() -> String {
    "camera0".to_string()
}

fn default_camera_orientation() -> Orientation {
    Orientation::Rear
}

fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}

fn default_endpoint() -> String {
    "http://127.0.0.1:5000/api/predict".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_alert_threshold() -> u32 {
    5
}

fn default_known_classes() -> Vec<String> {
    [
        "Apple",
        "Orange",
        "Banana",
        "Grape",
        "Strawberry",
        "Peach",
        "Pear",
        "Kiwi",
        "Pineapple",
        "Mango",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_impact_reveal_delay_ms() -> u64 {
    1_000
}

fn default_event_bus_capacity() -> usize {
    100
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            orientation: default_camera_orientation(),
            ideal_resolution: default_camera_resolution(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            alert_threshold: default_alert_threshold(),
            known_classes: default_known_classes(),
            class_thresholds: HashMap::new(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            impact_reveal_delay_ms: default_impact_reveal_delay_ms(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for FoodwatchConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            workflow: WorkflowConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl FoodwatchConfig {
    /// Load configuration from a TOML file with FOODWATCH_ environment
    /// variable overrides. A missing file falls back to defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        let builder = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("FOODWATCH").separator("_"));

        let settings: FoodwatchConfig = builder.build()?.try_deserialize()?;
        settings.validate()?;

        info!("Configuration loaded (endpoint: {})", settings.detection.endpoint);
        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.detection.endpoint.is_empty() {
            return Err(config::ConfigError::Message(
                "detection.endpoint must not be empty".to_string(),
            )
            .into());
        }
        if self.camera.ideal_resolution.0 == 0 || self.camera.ideal_resolution.1 == 0 {
            return Err(config::ConfigError::Message(
                "camera.ideal_resolution must be non-zero".to_string(),
            )
            .into());
        }
        if self.detection.request_timeout_ms == 0 {
            return Err(config::ConfigError::Message(
                "detection.request_timeout_ms must be non-zero".to_string(),
            )
            .into());
        }
        if self.system.event_bus_capacity == 0 {
            return Err(config::ConfigError::Message(
                "system.event_bus_capacity must be non-zero".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Threshold for a class, falling back to the global default
    pub fn threshold_for(&self, class_name: &str) -> u32 {
        self.detection
            .class_thresholds
            .get(class_name)
            .copied()
            .unwrap_or(self.detection.alert_threshold)
    }

    /// Every known class paired with its effective alert threshold
    pub fn watched_classes(&self) -> Vec<(String, u32)> {
        self.detection
            .known_classes
            .iter()
            .map(|class_name| (class_name.clone(), self.threshold_for(class_name)))
            .collect()
    }

    /// Default configuration rendered as TOML for --print-config
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&FoodwatchConfig::default())?)
    }
}
