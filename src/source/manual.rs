use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{EventSource, SourceHandler};

/// In-process [`EventSource`] fired explicitly with [`fire`](Self::fire).
///
/// Handlers run in subscription order on the calling thread, outside any lock.
pub struct ManualSource<T> {
    next: AtomicU64,
    handlers: Mutex<BTreeMap<u64, SourceHandler<T>>>,
}

impl<T: 'static> ManualSource<T> {
    /// Creates a source with no handlers.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            handlers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Runs every current handler with `args`. Returns how many ran.
    pub fn fire(&self, args: &T) -> usize {
        let snapshot: Vec<SourceHandler<T>> = self.handlers.lock().values().cloned().collect();
        for handler in &snapshot {
            handler(args);
        }
        snapshot.len()
    }

    /// Number of subscribed handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl<T: 'static> Default for ManualSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventSource for ManualSource<T> {
    type Args = T;
    type Token = u64;

    fn subscribe(&self, handler: SourceHandler<T>) -> u64 {
        let token = self.next.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().insert(token, handler);
        token
    }

    fn unsubscribe(&self, token: u64) {
        self.handlers.lock().remove(&token);
    }
}

impl<T> fmt::Debug for ManualSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualSource")
            .field("handlers", &self.handlers.lock().len())
            .finish()
    }
}
