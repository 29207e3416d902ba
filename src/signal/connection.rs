//! # Connection: one subscription to a signal.
//!
//! A [`Connection`] is a handle to a subscription record owned by exactly one
//! [`Signal`](crate::Signal). It carries an identity, a [`ConnectionKind`] and a
//! three-state lifecycle:
//!
//! ```text
//!            sleep()              destroy() / kill / first delivery (one-shot kinds)
//!   Awake ◄──────────► Asleep ───────────────────────────► Dead
//!     │      wake()                                         ▲
//!     └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - State is monotonic toward `Dead`; once dead, `wake`/`sleep` are no-ops.
//! - `destroy()` only marks the connection dead and drops its callback. Unlinking
//!   from the owning signal happens lazily on the next dispatch.
//! - One-shot kinds are *claimed* (atomically moved to `Dead`) by the dispatcher
//!   before their callback runs, so they fire at most once even under recursive
//!   or concurrent emits.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::LinkControl;

const ASLEEP: u8 = 1;
const AWAKE: u8 = 2;
const DEAD: u8 = 3;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Skipped at dispatch time but still linked.
    Asleep,
    /// Receives every dispatch.
    Awake,
    /// Terminal; the callback will never run again.
    Dead,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            ASLEEP => ConnectionState::Asleep,
            AWAKE => ConnectionState::Awake,
            _ => ConnectionState::Dead,
        }
    }
}

/// How a connection reacts to deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Created by [`Signal::connect`](crate::Signal::connect); fires on every emit.
    Persistent,
    /// Created by [`Signal::once`](crate::Signal::once) or a waiter; fires once.
    OneShot,
    /// Created by [`Signal::expire`](crate::Signal::expire); races a deadline.
    Expiring,
}

impl ConnectionKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectionKind::Persistent => "persistent",
            ConnectionKind::OneShot => "one_shot",
            ConnectionKind::Expiring => "expiring",
        }
    }

    /// True for kinds that die after their first delivery.
    pub fn is_single_use(&self) -> bool {
        !matches!(self, ConnectionKind::Persistent)
    }
}

pub(crate) type Every<A> = Arc<dyn Fn(&A) + Send + Sync>;
pub(crate) type Once<A> = Box<dyn FnOnce(&A) + Send>;

/// Callback owned by a connection.
pub(crate) enum Handler<A> {
    Every(Every<A>),
    Once(Once<A>),
}

/// What the dispatcher should do with a connection for one emit.
pub(crate) enum Step<A> {
    /// Dead: unlink it.
    Evict,
    /// Asleep: leave it alone.
    Skip,
    /// Persistent and awake: call the shared callback.
    Call(Every<A>),
    /// Claimed single-use connection: unlink, then run the callback.
    Claimed(Handler<A>),
}

struct Inner<A> {
    id: u64,
    kind: ConnectionKind,
    name: Arc<str>,
    state: AtomicU8,
    handler: Mutex<Option<Handler<A>>>,
    closed: CancellationToken,
}

/// Handle to a subscription. Cheap to clone; clones refer to the same record.
pub struct Connection<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for Connection<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> Connection<A> {
    pub(crate) fn new(id: u64, kind: ConnectionKind, name: Arc<str>, handler: Handler<A>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                kind,
                name,
                state: AtomicU8::new(AWAKE),
                handler: Mutex::new(Some(handler)),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Process-unique identity, assigned at creation and never reused.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Kind chosen by the subscribing operation.
    pub fn kind(&self) -> ConnectionKind {
        self.inner.kind
    }

    /// Display name (given, or generated as `"unnamed connection N"`).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_raw(self.inner.state.load(Ordering::Acquire))
    }

    /// True until the connection is dead.
    pub fn is_alive(&self) -> bool {
        self.state() != ConnectionState::Dead
    }

    /// Resumes delivery. No-op on a dead connection.
    pub fn wake(&self) {
        self.transition(AWAKE);
    }

    /// Pauses delivery without unlinking. No-op on a dead connection.
    pub fn sleep(&self) {
        self.transition(ASLEEP);
    }

    /// Marks the connection dead and drops its callback. Idempotent.
    ///
    /// A pending [`Waiter`](crate::Waiter) backed by this connection resumes with
    /// [`WaitError::Cancelled`](crate::WaitError::Cancelled).
    pub fn destroy(&self) {
        if self.inner.state.swap(DEAD, Ordering::AcqRel) == DEAD {
            return;
        }
        let handler = self.inner.handler.lock().take();
        drop(handler);
        self.inner.closed.cancel();
    }

    /// Resolves once the connection is dead.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    fn transition(&self, to: u8) {
        let _ = self
            .inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s != DEAD).then_some(to)
            });
    }

    /// Decides how this connection takes part in one dispatch.
    ///
    /// Single-use kinds are moved to `Dead` by compare-and-swap here; only the
    /// winner receives the callback.
    pub(crate) fn step(&self) -> Step<A> {
        match self.inner.state.load(Ordering::Acquire) {
            DEAD => return Step::Evict,
            ASLEEP => return Step::Skip,
            _ => {}
        }

        if !self.inner.kind.is_single_use() {
            return match &*self.inner.handler.lock() {
                Some(Handler::Every(f)) => Step::Call(Arc::clone(f)),
                Some(Handler::Once(_)) | None => Step::Skip,
            };
        }

        match self
            .inner
            .state
            .compare_exchange(AWAKE, DEAD, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                let handler = self.inner.handler.lock().take();
                self.inner.closed.cancel();
                handler.map_or(Step::Evict, Step::Claimed)
            }
            Err(DEAD) => Step::Evict,
            Err(_) => Step::Skip,
        }
    }
}

impl<A> LinkControl for Connection<A> {
    fn id(&self) -> u64 {
        self.inner.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn disable(&self) {
        self.sleep();
    }

    fn enable(&self) {
        self.wake();
    }

    fn terminate(&self) {
        self.destroy();
    }

    fn is_live(&self) -> bool {
        self.is_alive()
    }
}

impl<A> PartialEq for Connection<A> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<A> Eq for Connection<A> {}

impl<A> fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field(
                "state",
                &ConnectionState::from_raw(self.inner.state.load(Ordering::Acquire)),
            )
            .finish()
    }
}
