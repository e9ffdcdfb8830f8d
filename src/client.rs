use crate::encoder::ImageArtifact;
use crate::error::DetectionError;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// One detected object instance returned by the remote classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub class_id: i64,
    pub class_name: String,
    pub confidence: f64,
    /// Bounding box in pixel units: [x, y, width, height]
    pub bbox: [f64; 4],
}

/// Full outcome of one detection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<DetectionResult>,
    pub annotated_image_url: Option<String>,
    pub total_detections: u32,
    pub class_counts: std::collections::HashMap<String, u32>,
}

/// Raw wire shape, before domain-level success handling
#[derive(Debug, Deserialize)]
struct WireResponse {
    success: bool,
    #[serde(default)]
    detections: Option<Vec<DetectionResult>>,
    #[serde(default)]
    annotated_image_url: Option<String>,
    #[serde(default)]
    total_detections: Option<u32>,
    #[serde(default)]
    class_counts: Option<std::collections::HashMap<String, u32>>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the remote detection endpoint.
///
/// Each `submit` is one independent multipart POST; there is no retry and
/// no request de-duplication. The generation counter lets callers discard
/// stale responses when submissions overlap (last-response-wins).
pub struct DetectionClient {
    http: Client,
    endpoint: String,
    generation: AtomicU64,
}

impl DetectionClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DetectionError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            generation: AtomicU64::new(0),
        })
    }

    /// Hand out a new submission generation.
    ///
    /// The most recently issued generation is the only current one.
    pub fn begin_submission(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether a generation is still the latest issued
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Submit an image artifact and parse the structured response.
    ///
    /// Suspends until the endpoint answers or the request times out.
    pub async fn submit(&self, artifact: &ImageArtifact) -> Result<DetectionResponse, DetectionError> {
        debug!(
            "Submitting {} ({} bytes) to {}",
            artifact.filename,
            artifact.bytes.len(),
            self.endpoint
        );

        let part = Part::bytes(artifact.bytes.clone())
            .file_name(artifact.filename.clone())
            .mime_str(artifact.mime_type)?;
        let form = Form::new().part("image", part);

        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Detection endpoint returned HTTP {}", status.as_u16());
            return Err(DetectionError::Transport {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

/// Parse and validate a detection response body.
///
/// Schema violations map to `MalformedResponse`; a well-formed body with
/// `success:false` maps to `DetectionFailed` carrying the server's error
/// message when present.
pub fn parse_response(body: &str) -> Result<DetectionResponse, DetectionError> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| DetectionError::MalformedResponse {
            details: e.to_string(),
        })?;

    if !wire.success {
        return Err(DetectionError::DetectionFailed {
            message: wire.error,
        });
    }

    let detections = wire
        .detections
        .ok_or_else(|| DetectionError::MalformedResponse {
            details: "missing 'detections' field".to_string(),
        })?;
    let total_detections =
        wire.total_detections
            .ok_or_else(|| DetectionError::MalformedResponse {
                details: "missing 'total_detections' field".to_string(),
            })?;
    let class_counts = wire
        .class_counts
        .ok_or_else(|| DetectionError::MalformedResponse {
            details: "missing 'class_counts' field".to_string(),
        })?;

    for detection in &detections {
        if !(0.0..=1.0).contains(&detection.confidence) {
            return Err(DetectionError::MalformedResponse {
                details: format!(
                    "confidence {} for '{}' is outside [0, 1]",
                    detection.confidence, detection.class_name
                ),
            });
        }
        if detection.bbox.iter().any(|v| *v < 0.0) {
            return Err(DetectionError::MalformedResponse {
                details: format!("negative bbox value for '{}'", detection.class_name),
            });
        }
        if detection.class_id < 0 {
            return Err(DetectionError::MalformedResponse {
                details: format!("negative class_id for '{}'", detection.class_name),
            });
        }
    }

    Ok(DetectionResponse {
        detections,
        annotated_image_url: wire.annotated_image_url,
        total_detections,
        class_counts,
    })
}
