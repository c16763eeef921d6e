use std::collections::{HashMap, VecDeque};

use teloxide::types::{ChatId, MessageId};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Tracks, for each source message, the replica id every target channel
/// received. Reply resolution is only needed for a recent window of
/// messages, so retention is bounded: registering a new source message
/// past capacity evicts the oldest registered one.
pub struct IdentityMap {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    replicas: HashMap<MessageId, HashMap<ChatId, MessageId>>,
    /// Registration order, oldest first.
    order: VecDeque<MessageId>,
}

impl IdentityMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                replicas: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Create an empty per-target record for `source`. Idempotent: a
    /// second call for the same id leaves recorded replicas untouched,
    /// since overwriting would orphan later replies.
    pub async fn register(&self, source: MessageId) {
        let mut inner = self.inner.lock().await;
        if inner.replicas.contains_key(&source) {
            return;
        }
        while inner.order.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.replicas.remove(&evicted);
                debug!("Evicted source message {} from identity map", evicted.0);
            }
        }
        inner.replicas.insert(source, HashMap::new());
        inner.order.push_back(source);
    }

    /// Record that `target` received `replica` for `source`. A call for
    /// an unregistered source id signals a caller-logic defect; it is a
    /// warn-logged no-op rather than fabricating a record.
    pub async fn record_replica(&self, source: MessageId, target: ChatId, replica: MessageId) {
        let mut inner = self.inner.lock().await;
        match inner.replicas.get_mut(&source) {
            Some(per_target) => {
                per_target.insert(target, replica);
            }
            None => {
                warn!(
                    "record_replica for unregistered source message {} (target {})",
                    source.0, target.0
                );
            }
        }
    }

    /// The replica id `target` received for `parent`, if the send to
    /// that target succeeded. `None` covers "never sent", "send failed"
    /// and "evicted" alike; replies then degrade to top-level posts.
    pub async fn resolve_replica_parent(
        &self,
        parent: MessageId,
        target: ChatId,
    ) -> Option<MessageId> {
        let inner = self.inner.lock().await;
        inner.replicas.get(&parent)?.get(&target).copied()
    }
}
