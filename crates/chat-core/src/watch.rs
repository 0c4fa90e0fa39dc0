//! Subscriber registry shared by the document store implementations.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::store::{Subscription, SubscriptionHandle};
use crate::tree;

struct Watcher {
    segments: Vec<String>,
    tx: mpsc::UnboundedSender<Value>,
}

/// Fan-out of path snapshots to live subscriptions.
///
/// Callers must hold their tree lock across `register`/`notify` so a write
/// can never slip between the initial snapshot and registration.
#[derive(Default)]
pub struct Watchers {
    watchers: Mutex<HashMap<u64, Watcher>>,
    next_handle: AtomicU64,
}

impl Watchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watch on `segments`, queueing `current` as its first snapshot.
    pub fn register(&self, segments: Vec<String>, current: Value) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(current);

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.watchers.lock().insert(id, Watcher { segments, tx });
        Subscription::new(SubscriptionHandle(id), rx)
    }

    pub fn remove(&self, handle: SubscriptionHandle) -> bool {
        self.watchers.lock().remove(&handle.0).is_some()
    }

    /// Push the new value to every watcher whose path overlaps `written`.
    /// Watchers whose receiver is gone are dropped.
    pub fn notify(&self, root: &Value, written: &[String]) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|id, watcher| {
            if !tree::overlaps(&watcher.segments, written) {
                return true;
            }
            let snapshot = tree::get(root, &watcher.segments)
                .cloned()
                .unwrap_or(Value::Null);
            let alive = watcher.tx.send(snapshot).is_ok();
            if !alive {
                debug!("[Watch] Dropping closed subscription {}", id);
            }
            alive
        });
    }

    pub fn len(&self) -> usize {
        self.watchers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> Vec<String> {
        tree::split_path(p).unwrap()
    }

    #[tokio::test]
    async fn test_register_delivers_current_value_first() {
        let watchers = Watchers::new();
        let mut sub = watchers.register(path("/a"), json!([1]));
        assert_eq!(sub.next().await, Some(json!([1])));
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn test_notify_only_reaches_overlapping_paths() {
        let watchers = Watchers::new();
        let mut a = watchers.register(path("/a"), Value::Null);
        let mut b = watchers.register(path("/b"), Value::Null);
        a.next().await;
        b.next().await;

        let root = json!({"a": {"x": 1}, "b": 2});
        watchers.notify(&root, &path("/a/x"));

        assert_eq!(a.try_next(), Some(json!({"x": 1})));
        assert!(b.try_next().is_none());
    }

    #[tokio::test]
    async fn test_dropped_receivers_are_pruned() {
        let watchers = Watchers::new();
        let sub = watchers.register(path("/a"), Value::Null);
        drop(sub);
        watchers.notify(&json!({"a": 1}), &path("/a"));
        assert!(watchers.is_empty());
    }
}
