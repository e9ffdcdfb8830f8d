use crate::aggregate::aggregate;
use crate::alert::{evaluate, AlertState};
use crate::client::{DetectionClient, DetectionResponse};
use crate::config::FoodwatchConfig;
use crate::encoder;
use crate::error::Result;
use crate::events::{EventBus, FoodwatchEvent};
use crate::session::CaptureSession;
use crate::workflow::NotificationWorkflow;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The alert currently driving a notification workflow
struct ActiveAlert {
    state: AlertState,
    workflow: NotificationWorkflow,
}

/// Capture-to-alert pipeline coordinator.
///
/// Owns the detection client and the active alert/workflow pair. Alert
/// state itself is always recomputed from the latest aggregation; only the
/// notification workflow is stateful, and it is discarded (not reset)
/// whenever the observed count for the alerted class changes.
pub struct DetectionPipeline {
    config: FoodwatchConfig,
    event_bus: Arc<EventBus>,
    client: Arc<DetectionClient>,
    active: Option<ActiveAlert>,
}

impl DetectionPipeline {
    pub fn new(config: FoodwatchConfig, event_bus: Arc<EventBus>) -> Result<Self> {
        let client = Arc::new(
            DetectionClient::new(
                config.detection.endpoint.clone(),
                Duration::from_millis(config.detection.request_timeout_ms),
            )
            .map_err(crate::error::FoodwatchError::from)?,
        );
        Ok(Self {
            config,
            event_bus,
            client,
            active: None,
        })
    }

    pub fn client(&self) -> Arc<DetectionClient> {
        Arc::clone(&self.client)
    }

    /// Alert state derived from the most recent applied detection
    pub fn active_alert(&self) -> Option<&AlertState> {
        self.active.as_ref().map(|a| &a.state)
    }

    /// Notification workflow for the active alert
    pub fn workflow_mut(&mut self) -> Option<&mut NotificationWorkflow> {
        self.active.as_mut().map(|a| &mut a.workflow)
    }

    /// Capture a still from the session, encode it, submit it for
    /// detection, and fold the result into the alert state.
    ///
    /// Returns the validated per-class counts, or `None` when the response
    /// came back stale (a newer submission was issued while this one was in
    /// flight) and was discarded unapplied.
    pub async fn capture_and_submit(
        &mut self,
        session: &mut CaptureSession,
    ) -> Result<Option<Vec<(String, u32)>>> {
        let frame = session.capture_frame()?;
        let artifact = encoder::encode(&frame).map_err(crate::error::FoodwatchError::from)?;

        let submission_id = Uuid::new_v4().to_string();
        let generation = self.client.begin_submission();
        self.event_bus.publish(FoodwatchEvent::DetectionSubmitted {
            submission_id: submission_id.clone(),
            filename: artifact.filename.clone(),
            timestamp: SystemTime::now(),
        });

        let outcome = self.client.submit(&artifact).await;

        if !self.client.is_current(generation) {
            // Last-response-wins: a newer submission superseded this one
            debug!(
                "Discarding stale detection response (generation {})",
                generation
            );
            return Ok(None);
        }

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!("Detection submission {} failed: {}", submission_id, e);
                self.event_bus.publish(FoodwatchEvent::DetectionFailed {
                    submission_id,
                    error: e.user_message().to_string(),
                    timestamp: SystemTime::now(),
                });
                return Err(crate::error::FoodwatchError::from(e));
            }
        };

        match self.apply_detection(&response) {
            Ok(counts) => {
                self.event_bus.publish(FoodwatchEvent::DetectionCompleted {
                    submission_id,
                    total_detections: response.total_detections,
                    timestamp: SystemTime::now(),
                });
                Ok(Some(counts))
            }
            Err(e) => {
                self.event_bus.publish(FoodwatchEvent::DetectionFailed {
                    submission_id,
                    error: e.to_string(),
                    timestamp: SystemTime::now(),
                });
                Err(e)
            }
        }
    }

    /// Validate a detection response and re-derive the alert state.
    ///
    /// Evaluation runs on every application, never as a one-shot edge
    /// trigger. The triggered class with the highest count becomes the
    /// active alert; an existing workflow survives only while its class and
    /// observed count are unchanged.
    pub fn apply_detection(&mut self, response: &DetectionResponse) -> Result<Vec<(String, u32)>> {
        let counts = aggregate(response).map_err(crate::error::FoodwatchError::from)?;

        let mut triggered: Option<AlertState> = None;
        for (class_name, count) in &counts {
            let state = evaluate(class_name, *count, self.config.threshold_for(class_name));
            if state.is_triggered {
                let replace = match &triggered {
                    Some(current) => state.observed_count > current.observed_count,
                    None => true,
                };
                if replace {
                    triggered = Some(state);
                }
            }
        }

        match triggered {
            Some(state) => self.raise_or_keep(state),
            None => {
                if let Some(previous) = self.active.take() {
                    info!(
                        "Alert for '{}' cleared (count below threshold)",
                        previous.state.class_name
                    );
                    previous.workflow.discard();
                }
            }
        }

        Ok(counts)
    }

    fn raise_or_keep(&mut self, state: AlertState) {
        let unchanged = self
            .active
            .as_ref()
            .map(|a| {
                a.state.class_name == state.class_name
                    && a.state.observed_count == state.observed_count
            })
            .unwrap_or(false);
        if unchanged {
            // Same alert occurrence; notification history stays valid
            if let Some(active) = self.active.as_mut() {
                active.state = state;
            }
            return;
        }

        if let Some(previous) = self.active.take() {
            debug!(
                "Alert superseded ('{}' x{} -> '{}' x{}), discarding workflow",
                previous.state.class_name,
                previous.state.observed_count,
                state.class_name,
                state.observed_count
            );
            previous.workflow.discard();
        }

        info!(
            "High quantity alert: {} count ({}) meets threshold ({})",
            state.class_name, state.observed_count, state.threshold
        );
        self.event_bus.publish(FoodwatchEvent::AlertRaised {
            class_name: state.class_name.clone(),
            observed_count: state.observed_count,
            threshold: state.threshold,
            timestamp: SystemTime::now(),
        });

        let workflow = NotificationWorkflow::new(
            state.class_name.clone(),
            state.observed_count,
            Arc::clone(&self.event_bus),
            Duration::from_millis(self.config.workflow.impact_reveal_delay_ms),
        );
        self.active = Some(ActiveAlert { state, workflow });
    }

    /// Discard any active alert and its workflow
    pub fn clear_alert(&mut self) {
        if let Some(active) = self.active.take() {
            active.workflow.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DetectionResult;
    use crate::workflow::Channel;
    use std::collections::HashMap;

    fn pipeline_with_threshold(threshold: u32) -> (DetectionPipeline, Arc<EventBus>) {
        let mut config = FoodwatchConfig::default();
        config.detection.alert_threshold = threshold;
        let bus = Arc::new(EventBus::new(32));
        let pipeline = DetectionPipeline::new(config, Arc::clone(&bus)).unwrap();
        (pipeline, bus)
    }

    fn response_with(counts: &[(&str, u32)]) -> DetectionResponse {
        let mut detections = Vec::new();
        let mut class_counts = HashMap::new();
        for (i, (class_name, count)) in counts.iter().enumerate() {
            class_counts.insert(class_name.to_string(), *count);
            for _ in 0..*count {
                detections.push(DetectionResult {
                    class_id: i as i64,
                    class_name: class_name.to_string(),
                    confidence: 0.8,
                    bbox: [0.0, 0.0, 50.0, 50.0],
                });
            }
        }
        DetectionResponse {
            total_detections: detections.len() as u32,
            detections,
            annotated_image_url: None,
            class_counts,
        }
    }

    #[tokio::test]
    async fn test_below_threshold_raises_no_alert() {
        let (mut pipeline, _bus) = pipeline_with_threshold(5);
        pipeline.apply_detection(&response_with(&[("apple", 3)])).unwrap();
        assert!(pipeline.active_alert().is_none());
    }

    #[tokio::test]
    async fn test_threshold_boundary_raises_alert() {
        let (mut pipeline, bus) = pipeline_with_threshold(5);
        let mut receiver = bus.subscribe();

        pipeline.apply_detection(&response_with(&[("apple", 5)])).unwrap();
        let alert = pipeline.active_alert().unwrap();
        assert!(alert.is_triggered);
        assert_eq!(alert.class_name, "apple");
        assert_eq!(alert.observed_count, 5);

        assert!(matches!(
            receiver.recv().await.unwrap(),
            FoodwatchEvent::AlertRaised { observed_count: 5, .. }
        ));
    }

    #[tokio::test]
    async fn test_highest_count_class_wins() {
        let (mut pipeline, _bus) = pipeline_with_threshold(2);
        pipeline
            .apply_detection(&response_with(&[("apple", 3), ("pear", 6)]))
            .unwrap();
        assert_eq!(pipeline.active_alert().unwrap().class_name, "pear");
    }

    #[tokio::test]
    async fn test_count_change_discards_workflow() {
        let (mut pipeline, _bus) = pipeline_with_threshold(3);

        pipeline.apply_detection(&response_with(&[("apple", 4)])).unwrap();
        pipeline.workflow_mut().unwrap().notify(Channel::FoodBank);
        assert_eq!(pipeline.workflow_mut().unwrap().sent_channels().len(), 1);

        // New count for the same class: fresh occurrence, fresh workflow
        pipeline.apply_detection(&response_with(&[("apple", 6)])).unwrap();
        assert_eq!(pipeline.active_alert().unwrap().observed_count, 6);
        assert!(pipeline.workflow_mut().unwrap().sent_channels().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_count_keeps_workflow() {
        let (mut pipeline, _bus) = pipeline_with_threshold(3);

        pipeline.apply_detection(&response_with(&[("apple", 4)])).unwrap();
        pipeline.workflow_mut().unwrap().notify(Channel::Kitchen);

        pipeline.apply_detection(&response_with(&[("apple", 4)])).unwrap();
        assert_eq!(pipeline.workflow_mut().unwrap().sent_channels().len(), 1);
    }

    #[tokio::test]
    async fn test_count_dropping_below_threshold_clears_alert() {
        let (mut pipeline, _bus) = pipeline_with_threshold(3);

        pipeline.apply_detection(&response_with(&[("apple", 4)])).unwrap();
        assert!(pipeline.active_alert().is_some());

        pipeline.apply_detection(&response_with(&[("apple", 1)])).unwrap();
        assert!(pipeline.active_alert().is_none());
    }

    #[tokio::test]
    async fn test_inconsistent_response_is_rejected() {
        let (mut pipeline, _bus) = pipeline_with_threshold(3);
        let mut response = response_with(&[("apple", 4)]);
        response.class_counts.insert("apple".to_string(), 9);

        assert!(pipeline.apply_detection(&response).is_err());
        assert!(pipeline.active_alert().is_none());
    }

    #[tokio::test]
    async fn test_per_class_threshold_override() {
        let mut config = FoodwatchConfig::default();
        config.detection.alert_threshold = 5;
        config
            .detection
            .class_thresholds
            .insert("durian".to_string(), 2);
        let bus = Arc::new(EventBus::new(32));
        let mut pipeline = DetectionPipeline::new(config, bus).unwrap();

        pipeline
            .apply_detection(&response_with(&[("durian", 2), ("apple", 4)]))
            .unwrap();
        let alert = pipeline.active_alert().unwrap();
        assert_eq!(alert.class_name, "durian");
        assert_eq!(alert.threshold, 2);
    }
}
