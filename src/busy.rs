//! Busy-state coordinator
//!
//! Serializes mutating operations and coalesces repeated triggers: while the
//! owning component is busy, at most one pending handler is kept per operation
//! key, and registering again under the same key overwrites the previous
//! handler (latest intent wins). Flipping the busy flag back to false drains
//! the queue.
//!
//! File-system and config-change events arrive in bursts (editors emit
//! create+modify+rename for one logical save); without coalescing a single
//! save would queue redundant full rebuilds back-to-back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Handler = Box<dyn FnOnce() + Send + 'static>;

/// Key-addressable, overwrite-on-busy handler queue guarded by one mutex and
/// one boolean flag. There is no reentrant dispatch: handlers are removed
/// from the queue immediately before they run, with the lock released.
#[derive(Default)]
pub struct BusyState {
    busy: AtomicBool,
    handlers: Mutex<HashMap<String, Handler>>,
}

impl BusyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Flip the busy flag. Clearing it runs every queued handler.
    pub fn set_busy(&self, value: bool) {
        self.busy.store(value, Ordering::SeqCst);
        if !value {
            self.invoke_all();
        }
    }

    /// Mark busy until the returned guard is dropped; the drop drains the
    /// queue even when the critical section exits early with an error.
    pub fn enter(&self) -> BusyGuard<'_> {
        self.set_busy(true);
        BusyGuard(self)
    }

    /// Run `handler` as soon as the coordinator is free. If it is already
    /// free, the handler runs now; otherwise it is stored under `key`,
    /// replacing any handler previously queued there.
    pub fn invoke_asap(&self, key: &str, handler: impl FnOnce() + Send + 'static) {
        self.lock().insert(key.to_string(), Box::new(handler));
        if !self.is_busy() {
            self.invoke_all();
        }
    }

    /// Remove a pending handler. Used by a running operation to drop the
    /// re-trigger caused by its own file write.
    pub fn unsubscribe(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn invoke_all(&self) {
        loop {
            let next = {
                let mut handlers = self.lock();
                let key = handlers.keys().next().cloned();
                key.and_then(|k| handlers.remove(&k))
            };
            match next {
                Some(handler) => handler(),
                None => break,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the busy flag (draining the queue) on drop.
pub struct BusyGuard<'a>(&'a BusyState);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set_busy(false);
    }
}

/// Lock a mutex, recovering the inner value if a previous holder panicked.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
