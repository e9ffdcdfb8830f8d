use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::debug;

/// Events that can occur in the capture-to-alert pipeline.
///
/// Components report here instead of holding a global notification side
/// channel; the operator-facing layer subscribes and renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FoodwatchEvent {
    /// Camera stream acquired and ready for capture
    CameraStarted {
        orientation: String,
        timestamp: SystemTime,
    },
    /// Camera acquisition or capture failed
    CameraError { error: String, timestamp: SystemTime },
    /// A still frame was captured from the live stream
    FrameCaptured {
        width: u32,
        height: u32,
        timestamp: SystemTime,
    },
    /// An encoded image was submitted for detection
    DetectionSubmitted {
        submission_id: String,
        filename: String,
        timestamp: SystemTime,
    },
    /// Detection completed with per-class counts
    DetectionCompleted {
        submission_id: String,
        total_detections: u32,
        timestamp: SystemTime,
    },
    /// Detection failed (transport, schema, or service failure)
    DetectionFailed {
        submission_id: String,
        error: String,
        timestamp: SystemTime,
    },
    /// A class count crossed its alert threshold
    AlertRaised {
        class_name: String,
        observed_count: u32,
        threshold: u32,
        timestamp: SystemTime,
    },
    /// A notification channel was invoked for the active alert
    NotificationSent { channel: String, timestamp: SystemTime },
    /// The active alert was acknowledged by the operator
    AlertAcknowledged { timestamp: SystemTime },
    /// The impact estimate is ready for display
    ImpactReady {
        class_name: String,
        quantity: u32,
        mass_saved_kg: f64,
        currency_saved: f64,
        co2_reduced_kg: f64,
        timestamp: SystemTime,
    },
    /// System shutdown requested
    ShutdownRequested { reason: String, timestamp: SystemTime },
}

impl FoodwatchEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            FoodwatchEvent::CameraStarted { orientation, .. } => {
                format!("Camera started ({})", orientation)
            }
            FoodwatchEvent::CameraError { error, .. } => {
                format!("Camera error: {}", error)
            }
            FoodwatchEvent::FrameCaptured { width, height, .. } => {
                format!("Frame captured ({}x{})", width, height)
            }
            FoodwatchEvent::DetectionSubmitted { filename, .. } => {
                format!("Submitted {} for detection", filename)
            }
            FoodwatchEvent::DetectionCompleted {
                total_detections, ..
            } => {
                format!("Detection found {} items", total_detections)
            }
            FoodwatchEvent::DetectionFailed { error, .. } => {
                format!("Detection failed: {}", error)
            }
            FoodwatchEvent::AlertRaised {
                class_name,
                observed_count,
                threshold,
                ..
            } => {
                format!(
                    "High quantity alert: {} count ({}) exceeds threshold ({})",
                    class_name, observed_count, threshold
                )
            }
            FoodwatchEvent::NotificationSent { channel, .. } => {
                format!("Alert sent to {}", channel)
            }
            FoodwatchEvent::AlertAcknowledged { .. } => "Alert acknowledged".to_string(),
            FoodwatchEvent::ImpactReady {
                mass_saved_kg,
                currency_saved,
                ..
            } => {
                format!(
                    "Impact: {} kg saved, {} currency saved",
                    mass_saved_kg, currency_saved
                )
            }
            FoodwatchEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }
}

/// Broadcast event bus connecting pipeline stages to the operator layer
pub struct EventBus {
    sender: broadcast::Sender<FoodwatchEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: FoodwatchEvent) {
        debug!("Event: {}", event.description());
        if let Err(e) = self.sender.send(event) {
            // No active subscribers is normal during startup and shutdown
            debug!("Event published with no subscribers: {}", e);
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<FoodwatchEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
