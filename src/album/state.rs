// SPDX-License-Identifier: GPL-3.0-only
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Album sync state of a single pin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Loading,
    Populated { count: usize },
    Failed { message: String },
    /// The pin was removed. Only sent as an event; a deleted pin reads back as Idle.
    Deleted,
}

/// State-change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub pin_id: i64,
    #[serde(flatten)]
    pub state: SyncState,
}

pub type SubscriptionId = u64;

pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<SyncEvent>,
}

/// Fan-out of sync events. Subscribers whose receiver was dropped are pruned on emit.
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    senders: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<SyncEvent>>>,
}

impl Subscribers {
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        debug!(subscription = id, "Subscribed to sync events");
        Subscription { id, events: rx }
    }

    /// Returns false if the id was unknown or already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self
            .senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some();
        if removed {
            debug!(subscription = id, "Unsubscribed from sync events");
        }
        removed
    }

    pub fn emit(&self, event: SyncEvent) {
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
