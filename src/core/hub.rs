use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::core::events::LogEvent;

/// History retained for late subscribers.
const HISTORY_CAP: usize = 100;
/// How much of that history a new subscriber gets replayed.
const REPLAY_LEN: usize = 20;
/// Per-subscriber queue depth; a subscriber that falls this far behind is
/// retired rather than allowed to stall producers.
const SUBSCRIBER_QUEUE: usize = 64;

/// Fan-out point between all producers (dispatcher workers, voice pipeline,
/// schedule trigger) and the live log subscribers.
///
/// `publish` never blocks and never fails: history mutation and delivery
/// attempts happen under one short-lived lock, and any subscriber whose
/// queue is full or closed is removed on the spot.
pub struct LogHub {
    inner: Mutex<HubInner>,
}

struct HubInner {
    history: VecDeque<LogEvent>,
    subscribers: HashMap<Uuid, mpsc::Sender<LogEvent>>,
}

impl LogHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HubInner {
                history: VecDeque::with_capacity(HISTORY_CAP),
                subscribers: HashMap::new(),
            }),
        })
    }

    pub fn publish(&self, event: LogEvent) {
        let mut inner = self.lock();
        inner.history.push_back(event.clone());
        if inner.history.len() > HISTORY_CAP {
            inner.history.pop_front();
        }
        inner.subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(subscriber = %id, "log subscriber queue full, retiring");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = %id, "log subscriber gone, retiring");
                false
            }
        });
    }

    /// Registers a subscriber and seeds its queue with a replay of the most
    /// recent buffered events. Registration and replay happen under the same
    /// lock, so the subscriber sees no gap and no duplicate around the
    /// replay/live boundary.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        let id = Uuid::new_v4();
        let mut inner = self.lock();
        let skip = inner.history.len().saturating_sub(REPLAY_LEN);
        for event in inner.history.iter().skip(skip) {
            // Replay always fits: REPLAY_LEN < SUBSCRIBER_QUEUE.
            let _ = tx.try_send(event.clone());
        }
        inner.subscribers.insert(id, tx);
        Subscription {
            id,
            rx,
            hub: Arc::clone(self),
        }
    }

    /// Idempotent; also invoked by `Subscription` drop.
    pub fn unsubscribe(&self, id: Uuid) {
        self.lock().subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn history(&self) -> Vec<LogEvent> {
        self.lock().history.iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        // A panic while holding this lock cannot leave the hub in a state
        // worth rejecting; keep publishing.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One live subscriber. Dropping it unregisters from the hub, which covers
/// every transport exit path (close, error, timeout).
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<LogEvent>,
    hub: Arc<LogHub>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
