//! Subscriber fan-out.
//!
//! Every observer (WebSocket client, terminal UI, test harness) holds a
//! bounded queue. Broadcasts never block: a subscriber that cannot keep up
//! is disconnected and must reconnect and re-sync from `initial_state`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::events::DomainMessage;

/// Maximum queued messages per subscriber before disconnection.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 1024;

pub type SubscriberId = u64;

pub struct FanoutHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<DomainMessage>>>,
    next_id: AtomicU64,
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a subscriber; the caller drains the receiver. The first
    /// message a well-behaved caller sends is the `initial_state`
    /// snapshot, queued before any broadcast can interleave.
    pub fn subscribe(&self, initial: DomainMessage) -> (SubscriberId, mpsc::Receiver<DomainMessage>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tx.try_send(initial).expect("fresh queue cannot be full");
        self.subscribers.lock().expect("hub lock").insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().expect("hub lock").remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("hub lock").len()
    }

    /// Deliver a message to every subscriber, dropping the slow ones.
    pub fn broadcast(&self, message: &DomainMessage) {
        let mut dropped = Vec::new();
        {
            let subscribers = self.subscribers.lock().expect("hub lock");
            for (id, tx) in subscribers.iter() {
                match tx.try_send(message.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_))
                    | Err(mpsc::error::TrySendError::Closed(_)) => dropped.push(*id),
                }
            }
        }
        for id in dropped {
            tracing::warn!(subscriber = id, "disconnecting slow or closed subscriber");
            self.unsubscribe(id);
        }
    }

    /// Deliver to one subscriber only (request acks and errors).
    pub fn send_to(&self, id: SubscriberId, message: DomainMessage) {
        let tx = {
            let subscribers = self.subscribers.lock().expect("hub lock");
            subscribers.get(&id).cloned()
        };
        if let Some(tx) = tx
            && tx.try_send(message).is_err()
        {
            self.unsubscribe(id);
        }
    }
}
