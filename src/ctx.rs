//! Cancellation and deadline signal passed into blocking operations

use crate::{Error, Result};
use parking_lot::Mutex;
use std::{sync::{Arc, Weak}, time::{Duration, Instant}};

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Hooks {
    canceled: bool,
    next_id:  u64,
    list:     Vec<(u64, Hook)>,
}

struct Inner {
    deadline: Option<Instant>,
    hooks:    Mutex<Hooks>,
    /// Registration on the parent that forwards its cancellation to this context
    parent:   Option<(Arc<Inner>, u64)>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        Self { deadline, hooks: Mutex::new(Hooks::default()), parent: None }
    }

    fn cancel(&self) {
        let hooks = {
            let mut state = self.hooks.lock();
            if state.canceled {
                return;
            }
            state.canceled = true;
            std::mem::take(&mut state.list)
        };
        for (_, hook) in hooks {
            hook();
        }
    }

    fn is_canceled(&self) -> bool {
        self.hooks.lock().canceled
    }

    /// Registers a hook. Runs it right away when the context is already canceled.
    fn register(&self, hook: Hook) -> Option<u64> {
        let mut state = self.hooks.lock();
        if state.canceled {
            drop(state);
            hook();
            None
        } else {
            state.next_id += 1;
            let id = state.next_id;
            state.list.push((id, hook));
            Some(id)
        }
    }

    fn deregister(&self, id: u64) {
        self.hooks.lock().list.retain(|(hook_id, _)| *hook_id != id);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some((parent, id)) = self.parent.take() {
            parent.deregister(id);
        }
    }
}

/**
    Carries a cancellation signal and an optional deadline into every blocking operation:
    waiting for a pooled session, executing a statement and fetching rows.

    Contexts form a tree. Canceling a parent cancels every context derived from it,
    and a derived context never outlives its parent's deadline.

    # Example

    ```
    use augur::Context;
    use std::time::Duration;

    let root = Context::background();
    let (ctx, cancel) = root.with_cancel();
    let ctx = ctx.with_timeout(Duration::from_secs(5));
    assert!(ctx.check().is_ok());
    assert!(ctx.deadline().is_some());

    cancel.cancel();
    assert_eq!(ctx.check(), Err(augur::Error::Canceled));
    ```
*/
#[derive(Clone, Default)]
pub struct Context {
    inner: Option<Arc<Inner>>,
}

/// Cancels the context it was created with (and all contexts derived from it).
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

/// Keeps a cancellation hook registered. Dropping the guard removes the hook.
pub(crate) struct HookGuard {
    inner: Weak<Inner>,
    id:    u64,
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.deregister(self.id);
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.deadline())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

impl Context {
    /// Returns a context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self { inner: None }
    }

    fn derive(&self, deadline: Option<Instant>) -> Arc<Inner> {
        let deadline = match (self.deadline(), deadline) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };
        let mut child = Inner::new(deadline);
        if let Some(parent) = &self.inner {
            if parent.is_canceled() {
                child.hooks.get_mut().canceled = true;
                return Arc::new(child);
            }
            // The child is only known once it is allocated, hence the two step registration.
            let child = Arc::new_cyclic(|weak: &Weak<Inner>| {
                let weak = weak.clone();
                let id = parent.register(Box::new(move || {
                    if let Some(child) = weak.upgrade() {
                        child.cancel();
                    }
                }));
                child.parent = id.map(|id| (parent.clone(), id));
                child
            });
            if parent.is_canceled() {
                child.cancel();
            }
            return child;
        }
        Arc::new(child)
    }

    /// Returns a derived context and a handle that cancels it.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let inner = self.derive(None);
        (Context { inner: Some(inner.clone()) }, CancelHandle { inner })
    }

    /// Returns a derived context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a derived context that expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        Context { inner: Some(self.derive(Some(deadline))) }
    }

    /// Returns the point in time when this context expires.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.as_ref().and_then(|inner| inner.deadline)
    }

    /// Returns the time left until the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline().map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` if the context was explicitly canceled.
    pub fn is_canceled(&self) -> bool {
        self.inner.as_ref().map_or(false, |inner| inner.is_canceled())
    }

    /// Returns `true` if the context has a deadline that has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline().map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// Returns an error if the context is done: `Canceled` or `DeadlineExceeded`.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else if self.is_expired() {
            Err(Error::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Runs `hook` when the context is canceled. The hook is removed when the guard is dropped.
    /// If the context is already canceled, `hook` runs immediately.
    pub(crate) fn on_cancel<F>(&self, hook: F) -> Option<HookGuard>
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self.inner.as_ref()?;
        let id = inner.register(Box::new(hook))?;
        Some(HookGuard { inner: Arc::downgrade(inner), id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn background_never_done() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
        assert!(ctx.on_cancel(|| {}).is_none());
    }

    #[test]
    fn cancel_propagates_to_children() {
        let (parent, cancel) = Context::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        let (grandchild, _) = child.with_cancel();
        cancel.cancel();
        assert_eq!(child.check(), Err(Error::Canceled));
        assert_eq!(grandchild.check(), Err(Error::Canceled));
    }

    #[test]
    fn child_deadline_is_capped_by_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(child.check(), Err(Error::DeadlineExceeded));
    }

    #[test]
    fn hooks_run_once_and_can_be_removed() {
        let count = Arc::new(AtomicUsize::new(0));
        let (ctx, cancel) = Context::background().with_cancel();

        let counter = count.clone();
        let kept = ctx.on_cancel(move || { counter.fetch_add(1, Ordering::SeqCst); });
        let counter = count.clone();
        let removed = ctx.on_cancel(move || { counter.fetch_add(10, Ordering::SeqCst); });
        drop(removed);

        cancel.cancel();
        cancel.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(kept);

        let counter = count.clone();
        let late = ctx.on_cancel(move || { counter.fetch_add(100, Ordering::SeqCst); });
        assert!(late.is_none());
        assert_eq!(count.load(Ordering::SeqCst), 101);
    }

    #[test]
    fn dropped_child_deregisters_from_parent() {
        let (parent, _cancel) = Context::background().with_cancel();
        for _ in 0..10 {
            let _child = parent.with_timeout(Duration::from_secs(1));
        }
        let inner = parent.inner.as_ref().unwrap();
        assert!(inner.hooks.lock().list.is_empty());
    }
}
