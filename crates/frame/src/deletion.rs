//! Deferred-release queues.
//!
//! A release action is registered when the resource is created (or when it
//! is retired) and runs only once the GPU can no longer touch it. Actions
//! run newest-first, so a resource is always released before the resources
//! it was built from.

use tracing::{debug, info, warn};

/// A boxed release action.
pub type ReleaseAction = Box<dyn FnOnce() + Send + 'static>;

/// Ordered log of release actions, flushed in reverse registration order.
#[derive(Default)]
pub struct DeletionQueue {
    actions: Vec<ReleaseAction>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an action. Nothing runs until [`flush`](Self::flush).
    pub fn push<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.actions.push(Box::new(action));
    }

    /// Runs every pending action, last registered first, and returns how
    /// many ran. The queue is empty afterwards.
    pub fn flush(&mut self) -> usize {
        let count = self.actions.len();
        while let Some(action) = self.actions.pop() {
            action();
        }
        count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Forgets every pending action without running or dropping it.
    ///
    /// Used when the GPU cannot be proven idle: releasing anything at that
    /// point could free memory the device is still using.
    pub(crate) fn leak(&mut self) -> usize {
        let actions = std::mem::take(&mut self.actions);
        let count = actions.len();
        std::mem::forget(actions);
        count
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                "Deletion queue dropped with {} pending action(s); they will not run",
                self.actions.len()
            );
        }
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.actions.len())
            .finish()
    }
}

/// Engine-lifetime release log.
///
/// Resources that live as long as the engine register here. The queue is
/// flushed exactly once, at shutdown, after the device is confirmed idle.
#[derive(Debug, Default)]
pub struct GlobalDeletionQueue {
    queue: DeletionQueue,
}

impl GlobalDeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(action);
        debug!("Engine release registered ({} pending)", self.queue.len());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn flush(&mut self) -> usize {
        let count = self.queue.flush();
        info!("Released {} engine-lifetime resource(s)", count);
        count
    }

    pub(crate) fn leak(&mut self) -> usize {
        self.queue.leak()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> ReleaseAction) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |id: u32| -> ReleaseAction {
            let sink = sink.clone();
            Box::new(move || sink.lock().unwrap().push(id))
        };
        (log, make)
    }

    #[test]
    fn test_flush_runs_in_reverse_order() {
        let (log, make) = recorder();
        let mut queue = DeletionQueue::new();
        for id in 1..=4 {
            queue.push(make(id));
        }
        assert_eq!(queue.len(), 4);

        assert_eq!(queue.flush(), 4);
        assert_eq!(*log.lock().unwrap(), vec![4, 3, 2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_second_flush_runs_nothing() {
        let (log, make) = recorder();
        let mut queue = DeletionQueue::new();
        queue.push(make(1));
        queue.flush();

        assert_eq!(queue.flush(), 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let mut queue = DeletionQueue::new();
        assert_eq!(queue.flush(), 0);
    }

    #[test]
    fn test_drop_does_not_run_actions_but_releases_captures() {
        let ran = Arc::new(AtomicBool::new(false));
        let captured = Arc::new(());
        {
            let mut queue = DeletionQueue::new();
            let ran = ran.clone();
            let inner = captured.clone();
            queue.push(move || {
                drop(inner);
                ran.store(true, Ordering::SeqCst);
            });
            assert_eq!(Arc::strong_count(&captured), 2);
        }
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(Arc::strong_count(&captured), 1);
    }

    #[test]
    fn test_leak_neither_runs_nor_drops() {
        let captured = Arc::new(());
        let mut queue = DeletionQueue::new();
        let inner = captured.clone();
        queue.push(move || drop(inner));

        assert_eq!(queue.leak(), 1);
        assert!(queue.is_empty());
        drop(queue);
        assert_eq!(Arc::strong_count(&captured), 2);
    }

    #[test]
    fn test_global_queue_flushes_newest_first() {
        let (log, make) = recorder();
        let mut global = GlobalDeletionQueue::new();
        global.push(make(1));
        global.push(make(2));

        assert_eq!(global.flush(), 2);
        assert_eq!(*log.lock().unwrap(), vec![2, 1]);
    }
}
