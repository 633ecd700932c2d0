//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Publishers are
//! the supervisor, the retry chain and the monitor; the single consumer is the
//! supervisor's listener that fans events out to the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.
//! - [`Bus::emit`] logs the event before publishing it, so the log is complete
//!   even when nobody listens.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers without logging it.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Logs the event at its kind's level, then publishes it.
    pub fn emit(&self, ev: Event) {
        ev.log();
        self.publish(ev);
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

    #[tokio::test]
    async fn receivers_only_see_events_after_subscribing() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::HostStarting));

        let mut rx = bus.subscribe();
        bus.emit(Event::new(EventKind::HostRunning).with_unit("a"));

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::HostRunning);
        assert_eq!(ev.unit.as_deref(), Some("a"));
    }
}
