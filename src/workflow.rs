use crate::error::WorkflowError;
use crate::events::{EventBus, FoodwatchEvent};
use crate::impact;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Notification channels for an active alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    FoodBank,
    DeliveryPartners,
    Kitchen,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::FoodBank, Channel::DeliveryPartners, Channel::Kitchen];

    /// Operator-facing channel name
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::FoodBank => "Food Bank",
            Channel::DeliveryPartners => "Delivery Partners",
            Channel::Kitchen => "Kitchen",
        }
    }

    /// Parse a channel from its name, failing on anything outside the
    /// fixed set
    pub fn from_name(name: &str) -> Result<Self, WorkflowError> {
        match name {
            "Food Bank" | "FoodBank" => Ok(Channel::FoodBank),
            "Delivery Partners" | "DeliveryPartners" => Ok(Channel::DeliveryPartners),
            "Kitchen" => Ok(Channel::Kitchen),
            other => Err(WorkflowError::UnknownChannel {
                name: other.to_string(),
            }),
        }
    }
}

/// Progress of a notification workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    NoneSent,
    PartiallySent { sent: usize },
    Acknowledged,
}

/// Outcome of a `notify` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Channel newly added to the sent set
    Sent,
    /// Channel was already notified; the call was a no-op
    AlreadySent,
}

/// Per-alert tracker of which channels have been informed.
///
/// Scoped to one alert occurrence: when the underlying observed count
/// changes, the workflow is discarded (cancelling any pending impact
/// reveal), never reset. A channel enters the sent set at most once, and
/// `acknowledged` is monotonic.
pub struct NotificationWorkflow {
    class_name: String,
    quantity: u32,
    event_bus: Arc<EventBus>,
    reveal_delay: Duration,
    sent: HashSet<Channel>,
    acknowledged: bool,
    impact_scheduled: bool,
    cancel: CancellationToken,
}

impl NotificationWorkflow {
    pub fn new(
        class_name: impl Into<String>,
        quantity: u32,
        event_bus: Arc<EventBus>,
        reveal_delay: Duration,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            quantity,
            event_bus,
            reveal_delay,
            sent: HashSet::new(),
            acknowledged: false,
            impact_scheduled: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> WorkflowState {
        if self.acknowledged {
            WorkflowState::Acknowledged
        } else if self.sent.is_empty() {
            WorkflowState::NoneSent
        } else {
            WorkflowState::PartiallySent {
                sent: self.sent.len(),
            }
        }
    }

    pub fn sent_channels(&self) -> &HashSet<Channel> {
        &self.sent
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Invoke a notification channel for the active alert.
    ///
    /// Idempotent per channel. The first channel ever sent schedules a
    /// one-time impact reveal after the configured delay; subsequent
    /// notifications never reschedule it.
    pub fn notify(&mut self, channel: Channel) -> NotifyOutcome {
        if !self.sent.insert(channel) {
            debug!("Channel {} already notified", channel.as_str());
            return NotifyOutcome::AlreadySent;
        }

        info!("Notification sent to {}", channel.as_str());
        self.event_bus.publish(FoodwatchEvent::NotificationSent {
            channel: channel.as_str().to_string(),
            timestamp: SystemTime::now(),
        });

        if self.sent.len() == 1 && !self.impact_scheduled {
            self.impact_scheduled = true;
            self.schedule_impact_reveal();
        }

        NotifyOutcome::Sent
    }

    /// Parse a channel name and notify it
    pub fn notify_named(&mut self, name: &str) -> Result<NotifyOutcome, WorkflowError> {
        let channel = Channel::from_name(name)?;
        Ok(self.notify(channel))
    }

    /// Mark the alert as acknowledged.
    ///
    /// Valid only once at least one channel has been notified; acknowledged
    /// never reverts to false.
    pub fn acknowledge(&mut self) -> Result<(), WorkflowError> {
        if self.sent.is_empty() {
            return Err(WorkflowError::NothingSentYet);
        }
        if !self.acknowledged {
            self.acknowledged = true;
            info!("Alert for '{}' acknowledged", self.class_name);
            self.event_bus.publish(FoodwatchEvent::AlertAcknowledged {
                timestamp: SystemTime::now(),
            });
        }
        Ok(())
    }

    /// Discard the workflow, cancelling any pending impact reveal.
    ///
    /// Called when the alert's observed count changes and the notification
    /// history no longer applies.
    pub fn discard(&self) {
        self.cancel.cancel();
    }

    fn schedule_impact_reveal(&self) {
        let event_bus = Arc::clone(&self.event_bus);
        let cancel = self.cancel.clone();
        let delay = self.reveal_delay;
        let class_name = self.class_name.clone();
        let quantity = self.quantity;

        debug!(
            "Impact reveal scheduled in {} ms for '{}'",
            delay.as_millis(),
            class_name
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Impact reveal for '{}' cancelled", class_name);
                }
                _ = tokio::time::sleep(delay) => {
                    let impact = impact::estimate(quantity as f64);
                    event_bus.publish(FoodwatchEvent::ImpactReady {
                        class_name,
                        quantity,
                        mass_saved_kg: impact.mass_saved_kg,
                        currency_saved: impact.currency_saved,
                        co2_reduced_kg: impact.co2_reduced_kg,
                        timestamp: SystemTime::now(),
                    });
                }
            }
        });
    }
}

impl Drop for NotificationWorkflow {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
