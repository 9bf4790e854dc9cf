//! # SubscriberSet: fan-out of engine events to attached subscribers.
//!
//! The engine publishes at job-completion rate: a run over thousands of
//! small jobs can burst hundreds of [`JobFinished`](crate::EventKind::JobFinished)
//! events in a few milliseconds. The set therefore decouples every
//! subscriber behind its own bounded queue and worker task, so a slow
//! handler can neither stall dispatch nor starve the other subscribers —
//! it only loses its own events.
//!
//! ## Guarantees
//! - [`SubscriberSet::emit`] returns immediately, whatever the subscribers do.
//! - Each subscriber sees its events strictly in emit order.
//! - A panic inside one handler is confined to the event that caused it.
//!
//! ## Non-guarantees
//! - No ordering across *different* subscribers.
//! - No redelivery: when a subscriber's queue is full, events are dropped
//!   for that subscriber. Drops are counted per subscriber and reported at
//!   the first occurrence and then once every `DROP_REPORT_EVERY` drops,
//!   so a burst of completions cannot flood stderr.
//!
//! The usual wiring is [`JobManager::attach`](crate::JobManager::attach),
//! which couples a set to the manager's event bus for the manager's whole
//! lifetime; [`SubscriberSet::spawn_listener`] does the same for any other
//! broadcast receiver (e.g. a session manager's).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::events::Event;

use super::Subscribe;

/// After the first dropped event, further drops for the same subscriber are
/// reported only once per this many occurrences.
const DROP_REPORT_EVERY: u64 = 128;

/// One attached subscriber: its queue plus drop accounting.
struct Outlet {
    sub: Arc<dyn Subscribe>,
    tx: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

impl Outlet {
    /// Hands one event to the subscriber's queue, accounting a drop when
    /// the queue is full or its worker is gone.
    fn offer(&self, ev: &Arc<Event>) {
        if self.tx.try_send(Arc::clone(ev)).is_ok() {
            return;
        }
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped == 1 || dropped % DROP_REPORT_EVERY == 0 {
            eprintln!(
                "[jobvisor] subscriber '{}' has dropped {dropped} events so far",
                self.sub.name()
            );
        }
    }
}

/// Fan-out over a fixed group of subscribers, one queue and worker task per
/// subscriber.
pub struct SubscriberSet {
    outlets: Vec<Outlet>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker task per subscriber, sized by
    /// the subscriber's own [`Subscribe::queue_capacity`].
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut outlets = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            workers.push(tokio::spawn(drive(Arc::clone(&sub), rx)));
            outlets.push(Outlet {
                sub,
                tx,
                dropped: AtomicU64::new(0),
            });
        }

        Self { outlets, workers }
    }

    /// Offers one event to every subscriber without waiting for any of them.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for outlet in &self.outlets {
            outlet.offer(&ev);
        }
    }

    /// Couples this set to a broadcast receiver (from
    /// [`JobManager::subscribe`](crate::JobManager::subscribe) or
    /// [`SessionManager::subscribe`](crate::SessionManager::subscribe)).
    ///
    /// The pump forwards every event into the set and, once the event
    /// source is dropped, shuts the set down; the returned handle completes
    /// after the last subscriber finished its backlog.
    pub fn spawn_listener(self, mut rx: broadcast::Receiver<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => self.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        eprintln!("[jobvisor] subscriber pump lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            self.shutdown().await;
        })
    }

    /// Graceful shutdown: closes every queue and waits for the workers to
    /// drain what was already accepted.
    pub async fn shutdown(self) {
        drop(self.outlets);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outlets.len()
    }
}

/// Worker loop of a single subscriber. Events are handled strictly in queue
/// order; a panicking handler forfeits only the event it was given.
async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()))
            .catch_unwind()
            .await;
        if let Err(panic) = handled {
            eprintln!(
                "[jobvisor] subscriber '{}' panicked while handling an event: {panic:?}",
                sub.name()
            );
        }
    }
}
