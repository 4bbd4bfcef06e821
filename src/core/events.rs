//! Change notifications.
//!
//! Every committed write publishes a [`ChangeEvent`] on the [`ChangeFeed`]. Read-side
//! views subscribe and recompute from the store. Delivery is best effort: a slow
//! subscriber may miss events (it sees `Lagged`) and the same logical change can be
//! observed more than once, so consumers must treat every event as "something changed".

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

/// Kind of row that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    /// A guardian row
    Guardian,
    /// A student row
    Student,
    /// An enrollment row
    Enrollment,
    /// A charge row
    Charge,
    /// A payment row
    Payment,
    /// The school settings row
    Settings,
}

/// What happened to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeAction {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted
    Delete,
}

/// One "entities changed" signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeEvent {
    /// Table the change happened in
    pub entity: EntityKind,
    /// Primary key of the changed row
    pub id: i64,
    /// Kind of change
    pub action: ChangeAction,
}

impl ChangeEvent {
    /// Shorthand for an insert event.
    #[must_use]
    pub const fn inserted(entity: EntityKind, id: i64) -> Self {
        Self {
            entity,
            id,
            action: ChangeAction::Insert,
        }
    }

    /// Shorthand for an update event.
    #[must_use]
    pub const fn updated(entity: EntityKind, id: i64) -> Self {
        Self {
            entity,
            id,
            action: ChangeAction::Update,
        }
    }

    /// Shorthand for a delete event.
    #[must_use]
    pub const fn deleted(entity: EntityKind, id: i64) -> Self {
        Self {
            entity,
            id,
            action: ChangeAction::Delete,
        }
    }
}

/// Broadcast channel carrying [`ChangeEvent`]s from writers to read-side views.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed {
    /// Creates a feed that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber. It only sees events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Publishes one event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!(?event, receivers, "change published"),
            Err(_) => trace!(?event, "change published with no subscribers"),
        }
    }

    /// Publishes several events in order.
    pub fn publish_all<I>(&self, events: I)
    where
        I: IntoIterator<Item = ChangeEvent>,
    {
        for event in events {
            self.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_events() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();

        feed.publish(ChangeEvent::inserted(EntityKind::Payment, 7));
        feed.publish(ChangeEvent::updated(EntityKind::Charge, 3));

        assert_eq!(
            rx.recv().await.unwrap(),
            ChangeEvent::inserted(EntityKind::Payment, 7)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ChangeEvent::updated(EntityKind::Charge, 3)
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let feed = ChangeFeed::new(4);
        feed.publish(ChangeEvent::deleted(EntityKind::Student, 1));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let feed = ChangeFeed::new(4);
        feed.publish(ChangeEvent::inserted(EntityKind::Student, 1));
        let mut rx = feed.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
