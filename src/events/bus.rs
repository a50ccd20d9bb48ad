//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from services and the supervisor.
//!
//! ## Architecture
//! ```text
//! Publishers:                         Subscriber (one):
//!   Service 1 ──┐
//!   Service 2 ──┼──────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Supervisor ─┘  (broadcast chan)     (in Supervisor::run)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks, so state transitions can
//!   publish without yielding.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn publish_without_receivers_is_fine() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ShutdownRequested));
    }

    #[test]
    fn receivers_see_later_events_only() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::ServiceStopped));
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ShutdownRequested));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::ShutdownRequested);
        assert!(rx.try_recv().is_err());
    }
}
