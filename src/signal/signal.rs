//! # Signal: named broadcast channel with synchronous fan-out.
//!
//! A [`Signal`] owns its connections, a weak ordered list of attached downstream
//! signals, and a middleware chain.
//!
//! ## Dispatch
//! ```text
//! emit(args)
//!   ├─► dead signal?          ─► report SignalDestroyed, return Err
//!   ├─► middlewares (in order) ─► first `false` vetoes the whole emit
//!   │                           └► panic: report MiddlewarePanicked, return Err
//!   ├─► attached signals (attachment order, dead targets skipped and pruned)
//!   └─► local connections (subscription order, over a snapshot)
//!          Dead   ─► evict (unlink from signal and registry)
//!          Asleep ─► skip
//!          Awake  ─► persistent: call
//!                    single-use: claim → unlink → call
//!                    (panics caught and reported per connection)
//! ```
//!
//! ## Rules
//! - Attached signals are served **before** local connections.
//! - No lock is held while user code (callbacks, middlewares) runs, so callbacks
//!   may freely subscribe, emit or destroy, including on the same signal.
//! - Nothing raised inside `emit` unwinds into the caller.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::{Link, LinkControl, Registry, SignalControl};
use crate::error::SignalError;
use crate::events::{Event, EventKind};
use crate::signal::connection::{Connection, ConnectionKind, Handler, Step};

pub(crate) type Middleware<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// Outcome of one successful [`Signal::emit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// A middleware returned `false`; nothing was delivered.
    pub vetoed: bool,
    /// Attached signals the emit was propagated to.
    pub propagated: usize,
    /// Local callbacks that ran to completion.
    pub delivered: usize,
    /// Local callbacks that panicked (reported, delivery continued).
    pub failed: usize,
    /// Asleep connections.
    pub skipped: usize,
    /// Dead connections unlinked by this dispatch.
    pub evicted: usize,
}

pub(crate) struct SignalInner<A> {
    pub(crate) id: u64,
    pub(crate) name: Arc<str>,
    alive: AtomicBool,
    pub(crate) registry: Arc<Registry>,
    connections: Mutex<BTreeMap<u64, Connection<A>>>,
    pub(crate) bindings: Mutex<BTreeMap<u64, Arc<dyn LinkControl>>>,
    attached: Mutex<Vec<Weak<SignalInner<A>>>>,
    middlewares: Mutex<Vec<Middleware<A>>>,
}

/// Handle to a signal. Cheap to clone; clones refer to the same signal.
///
/// Dropping the last handle of a live signal tears it down like [`Signal::destroy`].
pub struct Signal<A> {
    pub(crate) inner: Arc<SignalInner<A>>,
}

impl<A> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> SignalInner<A> {
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn reject_dead(&self) -> SignalError {
        self.registry.report(
            self.id,
            SignalError::SignalDestroyed {
                signal: self.name.clone(),
            },
        )
    }

    /// Kills one connection: removes it from this signal and the registry, marks it dead.
    pub(crate) fn unlink(&self, id: u64) {
        let removed = self.connections.lock().remove(&id);
        self.registry.unlink(id);
        if let Some(conn) = removed {
            conn.destroy();
            self.killed(id, conn.name());
        }
    }

    fn killed(&self, id: u64, name: &str) {
        tracing::debug!(signal = %self.name, connection = name, id, "connection killed");
        self.registry.publish(
            Event::new(EventKind::ConnectionKilled)
                .with_signal(self.id, self.name.clone())
                .with_connection(id, name),
        );
    }

    /// Kills every connection and source binding. Returns how many links died.
    fn kill_all(&self) -> usize {
        let conns = std::mem::take(&mut *self.connections.lock());
        let bindings = std::mem::take(&mut *self.bindings.lock());
        let count = conns.len() + bindings.len();

        for (id, conn) in conns {
            self.registry.unlink(id);
            conn.destroy();
            self.killed(id, conn.name());
        }
        for (id, binding) in bindings {
            self.registry.unlink(id);
            binding.terminate();
        }
        count
    }

    /// Teardown shared by `destroy` and drop; caller has already cleared `alive`.
    fn release(&self) {
        self.kill_all();
        self.attached.lock().clear();
        self.registry.forget_signal(self.id);

        tracing::debug!(signal = %self.name, id = self.id, "signal destroyed");
        self.registry.publish(
            Event::new(EventKind::SignalDestroyed).with_signal(self.id, self.name.clone()),
        );
    }

    fn cleanup(&self) -> usize {
        if !self.is_alive() {
            return 0;
        }
        let count = self.kill_all();
        self.registry.publish(
            Event::new(EventKind::SignalCleaned)
                .with_signal(self.id, self.name.clone())
                .with_reason(count.to_string()),
        );
        count
    }

    /// Live attached signals, pruning stale entries.
    fn live_attached(&self) -> Vec<Arc<SignalInner<A>>> {
        let mut live = Vec::new();
        self.attached.lock().retain(|w| match w.upgrade() {
            Some(s) if s.is_alive() => {
                live.push(s);
                true
            }
            _ => false,
        });
        live
    }

    /// True if propagation starting at `self` can reach the signal `target`.
    fn reaches(self: &Arc<Self>, target: u64) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![Arc::clone(self)];
        while let Some(sig) = stack.pop() {
            if sig.id == target {
                return true;
            }
            if !visited.insert(sig.id) {
                continue;
            }
            stack.extend(sig.attached.lock().iter().filter_map(Weak::upgrade));
        }
        false
    }

    fn invoke(&self, conn: &Connection<A>, call: impl FnOnce(), report: &mut DispatchReport) {
        match catch_unwind(AssertUnwindSafe(call)) {
            Ok(()) => report.delivered += 1,
            Err(panic) => {
                report.failed += 1;
                let reason = crate::panic_message(panic.as_ref());
                tracing::warn!(
                    signal = %self.name,
                    connection = conn.name(),
                    id = conn.id(),
                    %reason,
                    "callback panicked"
                );
                self.registry.publish(
                    Event::new(EventKind::CallbackPanicked)
                        .with_signal(self.id, self.name.clone())
                        .with_connection(conn.id(), conn.name())
                        .with_reason(reason),
                );
            }
        }
    }

    pub(crate) fn dispatch(&self, args: &A) -> Result<DispatchReport, SignalError> {
        if !self.is_alive() {
            return Err(self.reject_dead());
        }
        let mut report = DispatchReport::default();

        let chain: Vec<Middleware<A>> = self.middlewares.lock().clone();
        for (index, middleware) in chain.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| middleware(args))) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::trace!(signal = %self.name, index, "emit vetoed");
                    self.registry.publish(
                        Event::new(EventKind::EmitVetoed)
                            .with_signal(self.id, self.name.clone())
                            .with_reason(index.to_string()),
                    );
                    report.vetoed = true;
                    return Ok(report);
                }
                Err(panic) => {
                    let err = SignalError::MiddlewarePanicked {
                        signal: self.name.clone(),
                        index,
                        reason: crate::panic_message(panic.as_ref()),
                    };
                    return Err(self.registry.report(self.id, err));
                }
            }
        }

        for target in self.live_attached() {
            if target.dispatch(args).is_ok() {
                report.propagated += 1;
            }
        }

        let snapshot: Vec<Connection<A>> = self.connections.lock().values().cloned().collect();
        for conn in &snapshot {
            match conn.step() {
                Step::Evict => {
                    self.unlink(conn.id());
                    report.evicted += 1;
                }
                Step::Skip => report.skipped += 1,
                Step::Call(f) => self.invoke(conn, || f(args), &mut report),
                Step::Claimed(handler) => {
                    self.unlink(conn.id());
                    match handler {
                        Handler::Every(f) => self.invoke(conn, || f(args), &mut report),
                        Handler::Once(f) => self.invoke(conn, move || f(args), &mut report),
                    }
                }
            }
        }

        tracing::trace!(
            signal = %self.name,
            delivered = report.delivered,
            failed = report.failed,
            propagated = report.propagated,
            "emit done"
        );
        Ok(report)
    }
}

impl<A> Drop for SignalInner<A> {
    fn drop(&mut self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            self.release();
        }
    }
}

impl<A> SignalControl for SignalInner<A>
where
    A: Send + Sync + 'static,
{
    fn destroy(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        *self.middlewares.lock() = vec![Arc::new(|_: &A| false)];
        self.release();
    }

    fn cleanup(&self) -> usize {
        SignalInner::cleanup(self)
    }

    fn is_alive(&self) -> bool {
        SignalInner::is_alive(self)
    }
}

impl<A> SignalInner<A>
where
    A: Send + Sync + 'static,
{
    /// Allocates, links and returns a new connection.
    pub(crate) fn register(
        &self,
        kind: ConnectionKind,
        name: Option<Arc<str>>,
        handler: Handler<A>,
    ) -> Result<Connection<A>, SignalError> {
        if !self.is_alive() {
            return Err(self.reject_dead());
        }
        let id = Registry::next_connection_id();
        let name = name.unwrap_or_else(|| self.registry.unnamed_connection_name());
        let conn = Connection::new(id, kind, name, handler);

        {
            let mut conns = self.connections.lock();
            if !self.is_alive() {
                drop(conns);
                return Err(self.reject_dead());
            }
            conns.insert(id, conn.clone());
            self.registry
                .link(id, Link::Internal(Arc::new(conn.clone())));
        }

        tracing::debug!(
            signal = %self.name,
            connection = conn.name(),
            id,
            kind = kind.as_label(),
            "connection created"
        );
        self.registry.publish(
            Event::new(EventKind::ConnectionCreated)
                .with_signal(self.id, self.name.clone())
                .with_connection(id, conn.name())
                .with_reason(kind.as_label()),
        );
        Ok(conn)
    }
}

impl<A> Signal<A>
where
    A: Send + Sync + 'static,
{
    /// Creates a signal registered in `registry`.
    ///
    /// Without a name, the signal is called `"unnamed signal N"`. On a registry
    /// that was already shut down the signal comes back destroyed.
    pub fn new(registry: &Arc<Registry>, name: Option<&str>) -> Self {
        let id = Registry::next_signal_id();
        let name: Arc<str> = match name {
            Some(n) => n.into(),
            None => registry.unnamed_signal_name(),
        };

        let inner = Arc::new(SignalInner {
            id,
            name: name.clone(),
            alive: AtomicBool::new(true),
            registry: Arc::clone(registry),
            connections: Mutex::new(BTreeMap::new()),
            bindings: Mutex::new(BTreeMap::new()),
            attached: Mutex::new(Vec::new()),
            middlewares: Mutex::new(Vec::new()),
        });
        let weak: Weak<SignalInner<A>> = Arc::downgrade(&inner);
        let control: Weak<dyn SignalControl> = weak;
        registry.track_signal(id, name.clone(), control);

        tracing::debug!(signal = %name, id, "signal created");
        registry.publish(Event::new(EventKind::SignalCreated).with_signal(id, name));

        // Checked after tracking: either shutdown drained this signal or we see its token.
        if registry.is_shut_down() {
            SignalControl::destroy(&*inner);
        }
        Self { inner }
    }

    /// Process-unique identity.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// False once destroyed.
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    /// Registry this signal belongs to.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Number of linked connections (dead ones linger until the next dispatch).
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Snapshot of linked connections in dispatch order.
    pub fn connections(&self) -> Vec<Connection<A>> {
        self.inner.connections.lock().values().cloned().collect()
    }

    /// Number of live attached signals.
    pub fn attached_count(&self) -> usize {
        self.inner.live_attached().len()
    }

    /// Number of middleware predicates.
    pub fn middleware_count(&self) -> usize {
        self.inner.middlewares.lock().len()
    }

    /// Broadcasts `args` to attached signals, then to every awake connection.
    ///
    /// ### Errors
    /// - [`SignalError::SignalDestroyed`] after [`destroy`](Self::destroy)
    /// - [`SignalError::MiddlewarePanicked`] if a predicate panicked
    ///
    /// A veto by a middleware is not an error: the report has `vetoed = true`.
    pub fn emit(&self, args: A) -> Result<DispatchReport, SignalError> {
        self.inner.dispatch(&args)
    }

    /// Same as [`emit`](Self::emit), for a borrowed payload.
    pub fn emit_ref(&self, args: &A) -> Result<DispatchReport, SignalError> {
        self.inner.dispatch(args)
    }

    /// Subscribes `callback` to every future emit while awake.
    pub fn connect<F>(&self, callback: F) -> Result<Connection<A>, SignalError>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.inner
            .register(ConnectionKind::Persistent, None, Handler::Every(Arc::new(callback)))
    }

    /// Same as [`connect`](Self::connect), with a display name.
    pub fn connect_named<F>(
        &self,
        name: impl Into<Arc<str>>,
        callback: F,
    ) -> Result<Connection<A>, SignalError>
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.inner.register(
            ConnectionKind::Persistent,
            Some(name.into()),
            Handler::Every(Arc::new(callback)),
        )
    }

    /// Subscribes `callback` to the next emit only.
    ///
    /// The connection is killed before the callback runs.
    pub fn once<F>(&self, callback: F) -> Result<Connection<A>, SignalError>
    where
        F: FnOnce(&A) + Send + 'static,
    {
        self.inner
            .register(ConnectionKind::OneShot, None, Handler::Once(Box::new(callback)))
    }

    /// Same as [`once`](Self::once), with a display name.
    pub fn once_named<F>(
        &self,
        name: impl Into<Arc<str>>,
        callback: F,
    ) -> Result<Connection<A>, SignalError>
    where
        F: FnOnce(&A) + Send + 'static,
    {
        self.inner.register(
            ConnectionKind::OneShot,
            Some(name.into()),
            Handler::Once(Box::new(callback)),
        )
    }

    /// Appends a predicate that can veto emits. Predicates run in registration order.
    pub fn add_middleware<F>(&self, predicate: F) -> Result<(), SignalError>
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let mut chain = self.inner.middlewares.lock();
        if !self.inner.is_alive() {
            drop(chain);
            return Err(self.inner.reject_dead());
        }
        chain.push(Arc::new(predicate));
        Ok(())
    }

    /// Makes every emit on `self` also emit on `other` (before local delivery).
    ///
    /// ### Errors
    /// - [`SignalError::SelfAttach`] if `other` is `self`
    /// - [`SignalError::AlreadyAttached`] if `other` is already attached
    /// - [`SignalError::AttachCycle`] if `other` propagates back into `self`
    /// - [`SignalError::SignalDestroyed`] if either signal is destroyed
    ///
    /// The attachment does not keep `other` alive.
    pub fn attach(&self, other: &Signal<A>) -> Result<(), SignalError> {
        let me = &self.inner;
        if !me.is_alive() {
            return Err(me.reject_dead());
        }
        if Arc::ptr_eq(me, &other.inner) {
            return Err(me.registry.report(
                me.id,
                SignalError::SelfAttach {
                    signal: me.name.clone(),
                },
            ));
        }
        if !other.inner.is_alive() {
            return Err(other.inner.reject_dead());
        }

        let target = Arc::downgrade(&other.inner);
        let duplicate = me.attached.lock().iter().any(|w| Weak::ptr_eq(w, &target));
        if duplicate {
            return Err(me.registry.report(
                me.id,
                SignalError::AlreadyAttached {
                    signal: me.name.clone(),
                    target: other.inner.name.clone(),
                },
            ));
        }
        if other.inner.reaches(me.id) {
            return Err(me.registry.report(
                me.id,
                SignalError::AttachCycle {
                    signal: me.name.clone(),
                    target: other.inner.name.clone(),
                },
            ));
        }

        me.attached.lock().push(target);
        tracing::debug!(signal = %me.name, target = %other.inner.name, "signal attached");
        Ok(())
    }

    /// Removes `other` from the attached list. Returns false if it was not attached.
    pub fn detach(&self, other: &Signal<A>) -> bool {
        let target = Arc::downgrade(&other.inner);
        let mut attached = self.inner.attached.lock();
        let before = attached.len();
        attached.retain(|w| !Weak::ptr_eq(w, &target));
        before != attached.len()
    }

    /// Kills every connection and source binding; the signal stays usable.
    ///
    /// Returns the number of killed links (0 on a destroyed signal).
    pub fn cleanup(&self) -> usize {
        self.inner.cleanup()
    }

    /// Destroys the signal: kills every link, drops attachments, installs an
    /// always-false middleware and unregisters. Idempotent and terminal.
    pub fn destroy(&self) {
        SignalControl::destroy(&*self.inner);
    }
}

impl<A> PartialEq for Signal<A> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<A> Eq for Signal<A> {}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("alive", &self.inner.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::signal::connection::ConnectionState;

    fn recorder<A: Clone + Send + 'static>() -> (Arc<Mutex<Vec<A>>>, impl Fn(&A) + Send + Sync) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |args: &A| sink.lock().push(args.clone()))
    }

    #[test]
    fn connect_receives_every_emit() {
        let reg = Registry::new();
        let sig: Signal<i32> = reg.new_signal(Some("numbers"));
        let (log, cb) = recorder();
        sig.connect(cb).expect("connect");

        for _ in 0..3 {
            let report = sig.emit(42).expect("emit");
            assert_eq!(report.delivered, 1);
        }
        assert_eq!(*log.lock(), vec![42, 42, 42]);
    }

    #[test]
    fn once_fires_a_single_time() {
        let reg = Registry::new();
        let sig: Signal<i32> = reg.new_signal(None);
        let (log, cb) = recorder();
        let conn = sig.once(move |a| cb(a)).expect("once");

        sig.emit(1).expect("emit");
        sig.emit(2).expect("emit");
        assert_eq!(*log.lock(), vec![1]);
        assert_eq!(conn.state(), ConnectionState::Dead);
        assert_eq!(sig.connection_count(), 0);
        assert!(!reg.contains_connection(conn.id()));
    }

    #[test]
    fn once_survives_recursive_emit() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let hits = Arc::new(AtomicUsize::new(0));

        let again = sig.clone();
        let h = hits.clone();
        sig.once(move |n| {
            h.fetch_add(1, Ordering::SeqCst);
            if *n < 3 {
                again.emit(n + 1).expect("nested emit");
            }
        })
        .expect("once");

        sig.emit(0).expect("emit");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connections_fire_in_subscription_order() {
        let reg = Registry::new();
        let sig: Signal<()> = reg.new_signal(None);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let o = order.clone();
            sig.connect(move |_| o.lock().push(i)).expect("connect");
        }
        sig.emit(()).expect("emit");
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn asleep_connections_are_skipped_not_removed() {
        let reg = Registry::new();
        let sig: Signal<u8> = reg.new_signal(None);
        let (log, cb) = recorder();
        let conn = sig.connect(cb).expect("connect");

        conn.sleep();
        let report = sig.emit(1).expect("emit");
        assert_eq!((report.delivered, report.skipped), (0, 1));
        assert_eq!(sig.connection_count(), 1);

        conn.wake();
        sig.emit(2).expect("emit");
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn destroyed_connection_is_evicted_lazily() {
        let reg = Registry::new();
        let sig: Signal<u8> = reg.new_signal(None);
        let conn = sig.connect(|_| {}).expect("connect");

        conn.destroy();
        assert_eq!(sig.connection_count(), 1);
        let report = sig.emit(0).expect("emit");
        assert_eq!(report.evicted, 1);
        assert_eq!(sig.connection_count(), 0);
        assert!(!reg.contains_connection(conn.id()));
    }

    #[test]
    fn eviction_during_emit_keeps_snapshot_delivery() {
        let reg = Registry::new();
        let sig: Signal<u8> = reg.new_signal(None);
        let hits = Arc::new(AtomicUsize::new(0));

        let victim_slot: Arc<Mutex<Option<Connection<u8>>>> = Arc::new(Mutex::new(None));
        let slot = victim_slot.clone();
        let inner = sig.clone();
        sig.connect(move |_| {
            if let Some(v) = slot.lock().take() {
                v.destroy();
            }
            inner.connect(|_| {}).expect("subscribe during emit");
        })
        .expect("connect");

        let h = hits.clone();
        let victim = sig
            .connect(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .expect("connect");
        *victim_slot.lock() = Some(victim);

        let h = hits.clone();
        sig.connect(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .expect("connect");

        let report = sig.emit(0).expect("emit");
        // The destroyed victim is evicted, the third connection still runs,
        // the connection added mid-emit waits for the next emit.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.evicted, 1);
        assert_eq!(sig.connection_count(), 3);
    }

    #[test]
    fn panicking_callback_does_not_stop_fan_out() {
        let reg = Registry::new();
        let mut rx = reg.subscribe();
        let sig: Signal<u8> = reg.new_signal(None);
        let (log, cb) = recorder();
        sig.connect_named("bad", |_| panic!("boom")).expect("connect");
        sig.connect(cb).expect("connect");

        let report = sig.emit(9).expect("emit");
        assert_eq!((report.delivered, report.failed), (1, 1));
        assert_eq!(*log.lock(), vec![9]);

        let panicked = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|ev| ev.kind == EventKind::CallbackPanicked)
            .expect("panic reported");
        assert_eq!(panicked.connection.as_deref(), Some("bad"));
        assert_eq!(panicked.reason.as_deref(), Some("boom"));
    }

    #[test]
    fn middleware_veto_is_per_emit() {
        let reg = Registry::new();
        let sig: Signal<i32> = reg.new_signal(None);
        let downstream: Signal<i32> = reg.new_signal(None);
        sig.attach(&downstream).expect("attach");

        let (log, cb) = recorder();
        let (down_log, down_cb) = recorder();
        sig.connect(cb).expect("connect");
        downstream.connect(down_cb).expect("connect");
        sig.add_middleware(|n| *n >= 0).expect("middleware");

        let vetoed = sig.emit(-1).expect("emit");
        assert!(vetoed.vetoed);
        assert_eq!((vetoed.delivered, vetoed.propagated), (0, 0));

        let passed = sig.emit(5).expect("emit");
        assert!(!passed.vetoed);
        assert_eq!(*log.lock(), vec![5]);
        assert_eq!(*down_log.lock(), vec![5]);
    }

    #[test]
    fn middlewares_short_circuit_in_order() {
        let reg = Registry::new();
        let sig: Signal<()> = reg.new_signal(None);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        sig.add_middleware(|_| false).expect("middleware");
        sig.add_middleware(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            true
        })
        .expect("middleware");

        assert!(sig.emit(()).expect("emit").vetoed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_middleware_aborts_only_that_emit() {
        let reg = Registry::new();
        let sig: Signal<i32> = reg.new_signal(Some("guarded"));
        let (log, cb) = recorder();
        sig.connect(cb).expect("connect");
        sig.add_middleware(|n| {
            assert!(*n != 13, "unlucky");
            true
        })
        .expect("middleware");

        let err = sig.emit(13).expect_err("middleware panic");
        assert_eq!(err.as_label(), "middleware_panicked");
        assert!(sig.is_alive());

        sig.emit(1).expect("emit");
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn attached_signals_fire_before_local_connections() {
        let reg = Registry::new();
        let a: Signal<u8> = reg.new_signal(Some("a"));
        let b: Signal<u8> = reg.new_signal(Some("b"));
        let c: Signal<u8> = reg.new_signal(Some("c"));
        let order = Arc::new(Mutex::new(Vec::new()));

        for (sig, tag) in [(&a, "a"), (&b, "b"), (&c, "c")] {
            let o = order.clone();
            sig.connect(move |_| o.lock().push(tag)).expect("connect");
        }
        a.attach(&b).expect("attach b");
        a.attach(&c).expect("attach c");

        let report = a.emit(1).expect("emit");
        assert_eq!(report.propagated, 2);
        assert_eq!(*order.lock(), vec!["b", "c", "a"]);
    }

    #[test]
    fn attachment_propagates_transitively() {
        let reg = Registry::new();
        let a: Signal<u8> = reg.new_signal(None);
        let b: Signal<u8> = reg.new_signal(None);
        let c: Signal<u8> = reg.new_signal(None);
        let (log, cb) = recorder();
        c.connect(cb).expect("connect");

        a.attach(&b).expect("attach");
        b.attach(&c).expect("attach");
        a.emit(7).expect("emit");
        assert_eq!(*log.lock(), vec![7]);
    }

    #[test]
    fn invalid_attachments_are_rejected_without_mutation() {
        let reg = Registry::new();
        let a: Signal<u8> = reg.new_signal(None);
        let b: Signal<u8> = reg.new_signal(None);
        let c: Signal<u8> = reg.new_signal(None);

        assert!(matches!(a.attach(&a), Err(SignalError::SelfAttach { .. })));
        assert_eq!(a.attached_count(), 0);

        a.attach(&b).expect("attach");
        assert!(matches!(
            a.attach(&b),
            Err(SignalError::AlreadyAttached { .. })
        ));
        assert_eq!(a.attached_count(), 1);

        assert!(matches!(b.attach(&a), Err(SignalError::AttachCycle { .. })));
        b.attach(&c).expect("attach");
        assert!(matches!(c.attach(&a), Err(SignalError::AttachCycle { .. })));
        assert_eq!(b.attached_count(), 1);
        assert_eq!(c.attached_count(), 0);
    }

    #[test]
    fn detach_removes_by_identity() {
        let reg = Registry::new();
        let a: Signal<u8> = reg.new_signal(None);
        let b: Signal<u8> = reg.new_signal(None);
        let c: Signal<u8> = reg.new_signal(None);
        a.attach(&b).expect("attach");
        a.attach(&c).expect("attach");

        assert!(a.detach(&b));
        assert!(!a.detach(&b));
        assert_eq!(a.attached_count(), 1);
        assert_eq!(a.emit(0).expect("emit").propagated, 1);
    }

    #[test]
    fn stale_attachments_are_skipped() {
        let reg = Registry::new();
        let a: Signal<u8> = reg.new_signal(None);
        let destroyed: Signal<u8> = reg.new_signal(None);
        a.attach(&destroyed).expect("attach");
        {
            let dropped: Signal<u8> = reg.new_signal(None);
            a.attach(&dropped).expect("attach");
        }
        destroyed.destroy();

        let report = a.emit(1).expect("emit");
        assert_eq!(report.propagated, 0);
        assert_eq!(a.attached_count(), 0);
    }

    #[test]
    fn cleanup_keeps_signal_usable() {
        let reg = Registry::new();
        let sig: Signal<u8> = reg.new_signal(None);
        let first = sig.connect(|_| {}).expect("connect");
        sig.once(|_| {}).expect("once");

        assert_eq!(sig.cleanup(), 2);
        assert!(!first.is_alive());
        assert_eq!(sig.connection_count(), 0);
        assert_eq!(reg.connection_count(), 0);

        let (log, cb) = recorder();
        sig.connect(cb).expect("connect after cleanup");
        sig.emit(3).expect("emit after cleanup");
        assert_eq!(*log.lock(), vec![3]);
    }

    #[test]
    fn destroyed_signal_rejects_everything() {
        let reg = Registry::new();
        let sig: Signal<u8> = reg.new_signal(Some("dead"));
        let other: Signal<u8> = reg.new_signal(None);
        let (log, cb) = recorder();
        let conn = sig.connect(cb).expect("connect");
        sig.attach(&other).expect("attach");

        sig.destroy();
        sig.destroy();
        assert!(!sig.is_alive());
        assert!(!conn.is_alive());
        assert_eq!(sig.attached_count(), 0);
        assert_eq!(sig.middleware_count(), 1);

        let dead = SignalError::SignalDestroyed {
            signal: "dead".into(),
        };
        assert_eq!(sig.emit(1), Err(dead.clone()));
        assert_eq!(sig.connect(|_| {}).map(|_| ()), Err(dead.clone()));
        assert_eq!(sig.once(|_| {}).map(|_| ()), Err(dead.clone()));
        assert_eq!(sig.attach(&other), Err(dead.clone()));
        assert_eq!(sig.add_middleware(|_| true), Err(dead));
        assert_eq!(sig.cleanup(), 0);
        assert!(log.lock().is_empty());
        assert_eq!(reg.signal_ids(), vec![other.id()]);
    }

    #[test]
    fn callbacks_may_destroy_their_own_signal() {
        let reg = Registry::new();
        let sig: Signal<u8> = reg.new_signal(None);
        let me = sig.clone();
        sig.connect(move |_| me.destroy()).expect("connect");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        sig.connect(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .expect("connect");

        let report = sig.emit(0).expect("emit");
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!sig.is_alive());
    }

    #[test]
    fn concurrent_emits_fire_once_exactly_once() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        sig.once(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .expect("once");

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let s = sig.clone();
                std::thread::spawn(move || {
                    s.emit(i).expect("emit");
                })
            })
            .collect();
        for t in threads {
            t.join().expect("join");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
