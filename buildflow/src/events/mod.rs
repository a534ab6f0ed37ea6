//! Status notification.
//!
//! Every task and build set transition is published through a
//! [`StatusNotifier`] to attached [`StatusSubscriber`]s: logging, in-memory
//! collection, or a channel feeding an external transport.

mod notifier;
mod subscribers;

pub use notifier::{StatusNotifier, SubscriptionId};
pub use subscribers::{ChannelSubscriber, CollectingSubscriber, LoggingSubscriber, StatusSubscriber};
