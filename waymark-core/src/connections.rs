//! Live connection tracking for the drain sequence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// Every open connection of one run, keyed by an id local to that run.
///
/// The count lives in a `watch` channel so the drain can wait for it to
/// reach zero without polling.
pub(crate) struct ConnectionSet {
    next_id: AtomicU64,
    handles: DashMap<u64, Option<AbortHandle>>,
    count: watch::Sender<usize>,
}

impl ConnectionSet {
    pub(crate) fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            next_id: AtomicU64::new(0),
            handles: DashMap::new(),
            count,
        }
    }

    /// Track a new connection. The entry is removed when the guard drops.
    pub(crate) fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(id, None);
        self.count.send_modify(|n| *n += 1);
        ConnectionGuard {
            id,
            set: Arc::clone(self),
        }
    }

    /// Attach the abort handle of the task serving `id`, unless that task
    /// already finished.
    pub(crate) fn attach(&self, id: u64, handle: AbortHandle) {
        if let Some(mut slot) = self.handles.get_mut(&id) {
            *slot = Some(handle);
        }
    }

    fn release(&self, id: u64) {
        if self.handles.remove(&id).is_some() {
            self.count.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    pub(crate) fn len(&self) -> usize {
        *self.count.borrow()
    }

    pub(crate) async fn wait_empty(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub(crate) fn abort_all(&self) {
        // Aborted tasks are dropped later by the runtime, not inside this loop.
        for entry in self.handles.iter() {
            if let Some(handle) = entry.value() {
                handle.abort();
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.handles.clear();
        self.count.send_replace(0);
    }
}

pub(crate) struct ConnectionGuard {
    id: u64,
    set: Arc<ConnectionSet>,
}

impl ConnectionGuard {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.set.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn count_follows_guards() {
        let set = Arc::new(ConnectionSet::new());
        let a = set.register();
        let b = set.register();
        assert_eq!(set.len(), 2);
        drop(a);
        assert_eq!(set.len(), 1);
        drop(b);
        assert_eq!(set.len(), 0);
    }

    #[tokio::test]
    async fn wait_empty_returns_once_last_guard_drops() {
        let set = Arc::new(ConnectionSet::new());
        let guard = set.register();
        let waiter = {
            let set = set.clone();
            tokio::spawn(async move { set.wait_empty().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn clear_then_late_guard_drop_does_not_underflow() {
        let set = Arc::new(ConnectionSet::new());
        let guard = set.register();
        set.clear();
        assert_eq!(set.len(), 0);
        drop(guard);
        assert_eq!(set.len(), 0);
    }
}
