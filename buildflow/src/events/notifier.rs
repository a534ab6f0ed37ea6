//! Fan-out of status events to subscribers.

use super::StatusSubscriber;
use crate::core::StatusEvent;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifies a subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Routes status transitions to the currently attached subscribers.
///
/// Publishing delivers to a snapshot of the subscriber list taken when the
/// event is published, so subscribing or unsubscribing concurrently never
/// blocks delivery. A subscriber that errors or panics is logged and skipped.
#[derive(Debug, Default)]
pub struct StatusNotifier {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn StatusSubscriber>)>>,
    next_id: AtomicU64,
}

impl StatusNotifier {
    /// Creates a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn StatusSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        debug!(subscription = %id, "Subscriber attached");
        id
    }

    /// Detaches a subscriber. Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        before != subscribers.len()
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publishes an event, returning how many subscribers accepted it.
    pub fn publish(&self, event: impl Into<StatusEvent>) -> usize {
        let event = event.into();
        let snapshot: Vec<_> = self.subscribers.read().clone();

        let mut delivered = 0;
        for (id, subscriber) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(subscription = %id, event_type = %event.event_type(), error = %e, "Subscriber rejected event");
                }
                Err(_) => {
                    warn!(subscription = %id, event_type = %event.event_type(), "Subscriber panicked");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BuildStatusChangedEvent, TaskState};
    use crate::errors::SubscriberError;
    use crate::events::CollectingSubscriber;
    use crate::executor::TaskId;
    use uuid::Uuid;

    #[derive(Debug)]
    struct RejectingSubscriber;

    impl StatusSubscriber for RejectingSubscriber {
        fn on_event(&self, _event: &StatusEvent) -> Result<(), SubscriberError> {
            Err(SubscriberError("not interested".into()))
        }
    }

    #[derive(Debug)]
    struct PanickingSubscriber;

    impl StatusSubscriber for PanickingSubscriber {
        fn on_event(&self, _event: &StatusEvent) -> Result<(), SubscriberError> {
            panic!("subscriber bug");
        }
    }

    fn event() -> BuildStatusChangedEvent {
        BuildStatusChangedEvent::new(Uuid::new_v4(), TaskId::new(7), "app", TaskState::Pending, TaskState::Ready)
    }

    #[test]
    fn test_publish_to_all() {
        let notifier = StatusNotifier::new();
        let a = Arc::new(CollectingSubscriber::new());
        let b = Arc::new(CollectingSubscriber::new());
        notifier.subscribe(a.clone());
        notifier.subscribe(b.clone());

        assert_eq!(notifier.publish(event()), 2);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = StatusNotifier::new();
        let collector = Arc::new(CollectingSubscriber::new());
        let id = notifier.subscribe(collector.clone());

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.publish(event()), 0);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_faulty_subscribers_are_isolated() {
        let notifier = StatusNotifier::new();
        let collector = Arc::new(CollectingSubscriber::new());
        notifier.subscribe(Arc::new(RejectingSubscriber));
        notifier.subscribe(Arc::new(PanickingSubscriber));
        notifier.subscribe(collector.clone());

        assert_eq!(notifier.publish(event()), 1);
        assert_eq!(collector.len(), 1);
        assert_eq!(notifier.subscriber_count(), 3);
    }
}
