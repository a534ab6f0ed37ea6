//! Status subscriber trait and implementations.

use crate::core::StatusEvent;
use crate::errors::SubscriberError;
use parking_lot::RwLock;
use std::fmt::Debug;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};

/// Receives build and build set status transitions.
///
/// Delivery is synchronous and happens outside the scheduler's task table
/// lock. Implementations should return quickly; anything slow belongs
/// behind a channel (see [`ChannelSubscriber`]).
pub trait StatusSubscriber: Send + Sync + Debug {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Errors are logged by the notifier and otherwise ignored.
    fn on_event(&self, event: &StatusEvent) -> Result<(), SubscriberError>;
}

/// A subscriber that logs every transition through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingSubscriber {
    level: Level,
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingSubscriber {
    /// Creates a logging subscriber at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging subscriber.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl StatusSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &StatusEvent) -> Result<(), SubscriberError> {
        let event_type = event.event_type();
        let build_set_id = event.build_set_id();
        if self.level == Level::DEBUG {
            debug!(event_type = %event_type, build_set_id = %build_set_id, event = ?event, "Status changed");
        } else {
            info!(event_type = %event_type, build_set_id = %build_set_id, "Status changed");
        }
        Ok(())
    }
}

/// A subscriber that keeps every event, for tests and inspection.
#[derive(Debug, Default)]
pub struct CollectingSubscriber {
    events: RwLock<Vec<StatusEvent>>,
}

impl CollectingSubscriber {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.read().clone()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Events whose type starts with `prefix` (e.g. `"build."`, `"build_set."`).
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<StatusEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl StatusSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &StatusEvent) -> Result<(), SubscriberError> {
        self.events.write().push(event.clone());
        Ok(())
    }
}

/// Forwards events to an unbounded channel, e.g. for a websocket transport.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSubscriber {
    /// Creates a subscriber and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &StatusEvent) -> Result<(), SubscriberError> {
        self.tx
            .send(event.clone())
            .map_err(|_| SubscriberError("event channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BuildStatusChangedEvent, TaskState};
    use crate::executor::TaskId;
    use uuid::Uuid;

    fn running_event() -> StatusEvent {
        BuildStatusChangedEvent::new(Uuid::new_v4(), TaskId::new(1), "lib", TaskState::Ready, TaskState::Running)
            .into()
    }

    #[test]
    fn test_logging_subscriber() {
        assert!(LoggingSubscriber::default().on_event(&running_event()).is_ok());
        assert!(LoggingSubscriber::debug().on_event(&running_event()).is_ok());
    }

    #[test]
    fn test_collecting_subscriber() {
        let subscriber = CollectingSubscriber::new();
        assert!(subscriber.is_empty());

        subscriber.on_event(&running_event()).unwrap();
        assert_eq!(subscriber.len(), 1);
        assert_eq!(subscriber.events_of_type("build.").len(), 1);
        assert!(subscriber.events_of_type("build_set.").is_empty());

        subscriber.clear();
        assert!(subscriber.is_empty());
    }

    #[tokio::test]
    async fn test_channel_subscriber() {
        let (subscriber, mut rx) = ChannelSubscriber::new();
        let event = running_event();

        subscriber.on_event(&event).unwrap();
        assert_eq!(rx.recv().await, Some(event));

        drop(rx);
        assert!(subscriber.on_event(&running_event()).is_err());
    }
}
