//! # Event bus for broadcasting engine events.
//!
//! [`Bus`] is a wrapper around [`tokio::sync::broadcast`] that lets the job
//! manager and session manager broadcast [`Event`]s to any number of
//! subscribers.
//!
//! ## Key characteristics:
//! - **Broadcast semantics**: all active subscribers receive a clone of each event
//! - **Non-persistent**: events are lost if there are no active subscribers
//! - **Bounded capacity**: old events are dropped when the channel is full
//!
//! Publishing never blocks; the engine emits events after its internal lock
//! has been released, so a slow subscriber can never stall dispatch.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for engine events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    ///
    /// When capacity is exceeded, the oldest unreceived events are dropped
    /// for the lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no active subscribers the event is dropped silently;
    /// the engine operates fine without observers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
