//! # Expiring subscriptions: an event racing a deadline.
//!
//! [`Signal::expire`] installs a single-use connection whose resolution is a
//! compare-and-swap on a three-state marker:
//!
//! ```text
//!            event before deadline ──► Delivered ─► on_success(args)
//!   Pending ─┤
//!            deadline (timer / caller) or late event ──► Expired ─► on_expire()
//! ```
//!
//! Exactly one transition out of `Pending` wins; the loser does nothing.
//!
//! The deadline is enforced by:
//! - a tokio task (current runtime) or a sleeper thread (no runtime) for
//!   [`Signal::expire`], only when `on_expire` is supplied;
//! - the calling thread for [`Signal::expire_blocking`];
//! - the calling task for [`Signal::expire_wait`].
//!
//! Timers scheduled on a runtime are cancelled by [`Registry::shutdown`](crate::Registry::shutdown);
//! the race then resolves neither way.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::Registry;
use crate::error::SignalError;
use crate::events::{Event, EventKind};
use crate::signal::connection::{Connection, ConnectionKind, Handler};
use crate::signal::signal::{Signal, SignalInner};

const PENDING: u8 = 0;
const DELIVERED: u8 = 1;
const EXPIRED: u8 = 2;

type OnSuccess<A> = Box<dyn FnOnce(&A) + Send>;
type OnExpire = Box<dyn FnOnce() + Send>;

/// How an expiring subscription was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpireOutcome {
    /// An event arrived before the deadline; `on_success` ran.
    Delivered,
    /// The deadline passed first; `on_expire` ran if supplied.
    Expired,
}

/// Parameters of an expiring subscription.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use rolert::{ExpireSpec, Registry, Signal};
///
/// let reg = Registry::new();
/// let sig: Signal<u32> = reg.new_signal(Some("reply"));
///
/// let spec = ExpireSpec::new(Duration::from_secs(5), |n: &u32| println!("got {n}"))
///     .named("reply-timeout");
/// sig.expire(spec).unwrap();
/// sig.emit(7).unwrap();
/// ```
pub struct ExpireSpec<A> {
    duration: Duration,
    on_success: OnSuccess<A>,
    on_expire: Option<OnExpire>,
    name: Option<Arc<str>>,
}

impl<A> ExpireSpec<A> {
    /// Races `on_success` against a deadline `duration` from subscription.
    pub fn new<F>(duration: Duration, on_success: F) -> Self
    where
        F: FnOnce(&A) + Send + 'static,
    {
        Self {
            duration,
            on_success: Box::new(on_success),
            on_expire: None,
            name: None,
        }
    }

    /// Runs `f` if the deadline wins. Enables the background timer of [`Signal::expire`].
    pub fn on_expire<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_expire = Some(Box::new(f));
        self
    }

    /// Names the backing connection.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Time allowed for the event.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True if an `on_expire` callback was supplied.
    pub fn has_on_expire(&self) -> bool {
        self.on_expire.is_some()
    }
}

impl<A> fmt::Debug for ExpireSpec<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpireSpec")
            .field("duration", &self.duration)
            .field("on_expire", &self.on_expire.is_some())
            .field("name", &self.name)
            .finish()
    }
}

struct Race<A> {
    state: AtomicU8,
    duration: Duration,
    deadline: Instant,
    on_success: Mutex<Option<OnSuccess<A>>>,
    on_expire: Mutex<Option<OnExpire>>,
    registry: Arc<Registry>,
    signal_id: u64,
    signal: Arc<str>,
    connection: OnceLock<(u64, Arc<str>)>,
    resolved: CancellationToken,
    done: Mutex<bool>,
    done_cv: Condvar,
}

impl<A> Race<A> {
    fn outcome(&self) -> Option<ExpireOutcome> {
        match self.state.load(Ordering::Acquire) {
            DELIVERED => Some(ExpireOutcome::Delivered),
            EXPIRED => Some(ExpireOutcome::Expired),
            _ => None,
        }
    }

    /// Event trigger. A late event resolves the race as expired.
    fn deliver(&self, args: &A) {
        let target = if Instant::now() >= self.deadline {
            EXPIRED
        } else {
            DELIVERED
        };
        if self
            .state
            .compare_exchange(PENDING, target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if target == DELIVERED {
            let f = self.on_success.lock().take();
            if let Some(f) = f {
                self.guarded("on_success", move || f(args));
            }
        } else {
            self.run_on_expire();
        }
        self.finish(target);
    }

    /// Deadline trigger. Returns true if it won the race.
    fn elapse(&self) -> bool {
        if self
            .state
            .compare_exchange(PENDING, EXPIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.run_on_expire();
        self.finish(EXPIRED);
        true
    }

    fn run_on_expire(&self) {
        let f = self.on_expire.lock().take();
        if let Some(f) = f {
            self.guarded("on_expire", f);
        }
    }

    fn guarded(&self, which: &'static str, f: impl FnOnce()) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
            let reason = format!("{which}: {}", crate::panic_message(panic.as_ref()));
            tracing::warn!(signal = %self.signal, %reason, "expiry callback panicked");
            self.registry
                .publish(self.event(EventKind::CallbackPanicked).with_reason(reason));
        }
    }

    fn event(&self, kind: EventKind) -> Event {
        let ev = Event::new(kind).with_signal(self.signal_id, self.signal.clone());
        match self.connection.get() {
            Some((id, name)) => ev.with_connection(*id, name.clone()),
            None => ev,
        }
    }

    fn finish(&self, outcome: u8) {
        let kind = if outcome == DELIVERED {
            EventKind::ExpireDelivered
        } else {
            EventKind::ExpireElapsed
        };
        tracing::debug!(signal = %self.signal, outcome = kind.as_label(), "expiry resolved");
        self.registry
            .publish(self.event(kind).with_timeout(self.duration));

        *self.done.lock() = true;
        self.done_cv.notify_all();
        self.resolved.cancel();
    }

    /// Parks the calling thread until the race resolves or the deadline passes.
    fn block_until_deadline(&self) {
        let mut done = self.done.lock();
        while !*done {
            let left = self.deadline.saturating_duration_since(Instant::now());
            if left.is_zero() || self.done_cv.wait_for(&mut done, left).timed_out() {
                break;
            }
        }
    }
}

impl<A> Race<A>
where
    A: Send + Sync + 'static,
{
    /// Timer path: resolve as expired, then unlink the connection regardless of the winner.
    fn fire(&self, signal: &Weak<SignalInner<A>>, connection_id: u64) {
        self.elapse();
        if let Some(signal) = signal.upgrade() {
            signal.unlink(connection_id);
        }
    }
}

impl<A> Signal<A>
where
    A: Send + Sync + 'static,
{
    fn start_race(
        &self,
        spec: ExpireSpec<A>,
    ) -> Result<(Connection<A>, Arc<Race<A>>), SignalError> {
        let inner = &self.inner;
        let race = Arc::new(Race {
            state: AtomicU8::new(PENDING),
            duration: spec.duration,
            deadline: Instant::now() + spec.duration,
            on_success: Mutex::new(Some(spec.on_success)),
            on_expire: Mutex::new(spec.on_expire),
            registry: Arc::clone(&inner.registry),
            signal_id: inner.id,
            signal: inner.name.clone(),
            connection: OnceLock::new(),
            resolved: CancellationToken::new(),
            done: Mutex::new(false),
            done_cv: Condvar::new(),
        });

        let trigger = Arc::clone(&race);
        let conn = inner.register(
            ConnectionKind::Expiring,
            spec.name,
            Handler::Once(Box::new(move |args: &A| trigger.deliver(args))),
        )?;
        let _ = race
            .connection
            .set((conn.id(), Arc::from(conn.name())));
        Ok((conn, race))
    }

    /// Subscribes a callback that must fire within `spec.duration()`.
    ///
    /// If an `on_expire` callback is supplied, a timer resolves the race at the
    /// deadline and unlinks the connection. Without one, a late event invokes
    /// nothing and the connection is simply consumed.
    ///
    /// ### Errors
    /// [`SignalError::SignalDestroyed`] if the signal is destroyed.
    pub fn expire(&self, spec: ExpireSpec<A>) -> Result<Connection<A>, SignalError> {
        let armed = spec.has_on_expire();
        let (conn, race) = self.start_race(spec)?;
        if armed {
            self.arm_timer(race, conn.id());
        }
        Ok(conn)
    }

    fn arm_timer(&self, race: Arc<Race<A>>, connection_id: u64) {
        let signal = Arc::downgrade(&self.inner);
        let token = self.inner.registry.runtime_token().clone();
        let deadline = race.deadline;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep_until(deadline) => race.fire(&signal, connection_id),
                    }
                });
            }
            Err(_) => {
                let name = self.inner.name.clone();
                let spawned = std::thread::Builder::new()
                    .name("rolert-expire".into())
                    .spawn(move || {
                        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                        if !token.is_cancelled() {
                            race.fire(&signal, connection_id);
                        }
                    });
                if let Err(e) = spawned {
                    tracing::warn!(signal = %name, error = %e, "failed to spawn expiry timer");
                }
            }
        }
    }

    /// Like [`expire`](Self::expire), parking the calling thread until the race resolves.
    ///
    /// Must not be called from inside an async task.
    ///
    /// ### Errors
    /// [`SignalError::SignalDestroyed`] if the signal is destroyed up front, or
    /// if the registry shut down before the race resolved.
    pub fn expire_blocking(&self, spec: ExpireSpec<A>) -> Result<ExpireOutcome, SignalError> {
        let (conn, race) = self.start_race(spec)?;
        race.block_until_deadline();
        if race.outcome().is_none() && !self.inner.registry.is_shut_down() {
            race.elapse();
        }
        self.inner.unlink(conn.id());
        race.outcome().ok_or_else(|| self.inner.reject_dead())
    }

    /// Like [`expire`](Self::expire), suspending the calling task until the race resolves.
    ///
    /// ### Errors
    /// [`SignalError::SignalDestroyed`] if the signal is destroyed up front, or
    /// if the registry shut down before the race resolved.
    pub async fn expire_wait(&self, spec: ExpireSpec<A>) -> Result<ExpireOutcome, SignalError> {
        let (conn, race) = self.start_race(spec)?;
        let token = self.inner.registry.runtime_token().clone();

        tokio::select! {
            biased;
            _ = race.resolved.cancelled() => {}
            _ = token.cancelled() => {}
            _ = tokio::time::sleep_until(race.deadline) => {
                race.elapse();
            }
        }
        self.inner.unlink(conn.id());
        race.outcome().ok_or_else(|| self.inner.reject_dead())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    use super::*;
    use crate::signal::connection::ConnectionState;

    struct Outcomes {
        success: Arc<Mutex<Vec<u32>>>,
        expired: Arc<AtomicUsize>,
    }

    impl Outcomes {
        fn new() -> Self {
            Self {
                success: Arc::new(Mutex::new(Vec::new())),
                expired: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn spec(&self, ms: u64) -> ExpireSpec<u32> {
            let success = self.success.clone();
            let expired = self.expired.clone();
            ExpireSpec::new(Duration::from_millis(ms), move |n: &u32| {
                success.lock().push(*n)
            })
            .on_expire(move || {
                expired.fetch_add(1, Ordering::SeqCst);
            })
        }

        fn silent_spec(&self, ms: u64) -> ExpireSpec<u32> {
            let success = self.success.clone();
            ExpireSpec::new(Duration::from_millis(ms), move |n: &u32| {
                success.lock().push(*n)
            })
        }

        fn expired(&self) -> usize {
            self.expired.load(Ordering::SeqCst)
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn event_before_deadline_wins() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();
        let conn = sig.expire(outcomes.spec(100)).expect("expire");
        assert_eq!(conn.kind(), ConnectionKind::Expiring);

        sleep_ms(50).await;
        sig.emit(5).expect("emit");
        sleep_ms(100).await;

        assert_eq!(*outcomes.success.lock(), vec![5]);
        assert_eq!(outcomes.expired(), 0);
        assert_eq!(conn.state(), ConnectionState::Dead);
        assert_eq!(sig.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_on_expire_and_unlinks() {
        let reg = Registry::new();
        let mut rx = reg.subscribe();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();
        let conn = sig.expire(outcomes.spec(100)).expect("expire");

        sleep_ms(150).await;
        assert_eq!(outcomes.expired(), 1);
        assert!(!reg.contains_connection(conn.id()));
        assert_eq!(sig.connection_count(), 0);

        sig.emit(9).expect("emit");
        assert!(outcomes.success.lock().is_empty());
        assert_eq!(outcomes.expired(), 1);

        let elapsed = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|ev| ev.kind == EventKind::ExpireElapsed)
            .expect("elapsed reported");
        assert_eq!(elapsed.timeout_ms, Some(100));
        assert_eq!(elapsed.connection_id, Some(conn.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn late_event_without_on_expire_invokes_nothing() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();
        sig.expire(outcomes.silent_spec(100)).expect("expire");

        sleep_ms(150).await;
        assert_eq!(sig.connection_count(), 1);

        let report = sig.emit(1).expect("emit");
        assert!(outcomes.success.lock().is_empty());
        assert_eq!(report.delivered, 1);
        assert_eq!(sig.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn destroying_the_connection_keeps_the_timer() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();
        let conn = sig.expire(outcomes.spec(100)).expect("expire");

        conn.destroy();
        sig.emit(1).expect("emit");
        sleep_ms(150).await;
        assert!(outcomes.success.lock().is_empty());
        assert_eq!(outcomes.expired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();
        sig.expire(outcomes.spec(100)).expect("expire");

        reg.shutdown();
        sleep_ms(150).await;
        assert_eq!(outcomes.expired(), 0);
        assert!(outcomes.success.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn signals_created_after_shutdown_reject_expiry() {
        let reg = Registry::new();
        reg.shutdown();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();

        let err = sig.expire(outcomes.spec(100)).expect_err("destroyed");
        assert_eq!(err.as_label(), "signal_destroyed");
        let err = sig.expire_wait(outcomes.spec(100)).await.expect_err("destroyed");
        assert_eq!(err.as_label(), "signal_destroyed");
        assert_eq!(sig.connection_count(), 0);
    }

    #[test]
    fn late_event_before_timer_runs_resolves_as_expired() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        let reg = Registry::new();
        let mut rx = reg.subscribe();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();

        rt.block_on(async {
            let conn = sig.expire(outcomes.spec(50)).expect("expire");
            // Blocks the only runtime thread, so the timer task cannot run yet.
            std::thread::sleep(Duration::from_millis(120));
            sig.emit(9).expect("emit");
            assert_eq!(outcomes.expired(), 1);
            assert_eq!(conn.state(), ConnectionState::Dead);

            sleep_ms(50).await;
            assert!(!reg.contains_connection(conn.id()));
        });

        assert!(outcomes.success.lock().is_empty());
        assert_eq!(outcomes.expired(), 1);
        let mut resolved = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev.kind, EventKind::ExpireDelivered | EventKind::ExpireElapsed) {
                resolved.push(ev.kind);
            }
        }
        assert_eq!(resolved, vec![EventKind::ExpireElapsed]);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_wait_reports_both_outcomes() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);

        let emitter = sig.clone();
        tokio::spawn(async move {
            sleep_ms(50).await;
            emitter.emit(3).expect("emit");
        });
        let outcomes = Outcomes::new();
        let outcome = sig.expire_wait(outcomes.spec(100)).await.expect("wait");
        assert_eq!(outcome, ExpireOutcome::Delivered);
        assert_eq!(*outcomes.success.lock(), vec![3]);

        let outcomes = Outcomes::new();
        let outcome = sig.expire_wait(outcomes.spec(100)).await.expect("wait");
        assert_eq!(outcome, ExpireOutcome::Expired);
        assert_eq!(outcomes.expired(), 1);
        assert_eq!(sig.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_wait_on_destroyed_signal_is_rejected() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        sig.destroy();
        let outcomes = Outcomes::new();
        let err = sig.expire_wait(outcomes.spec(10)).await.expect_err("dead");
        assert_eq!(err.as_label(), "signal_destroyed");
    }

    #[test]
    fn expire_blocking_delivered_from_another_thread() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let emitter = sig.clone();
        let handle = std::thread::spawn(move || {
            while emitter.connection_count() == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
            emitter.emit(11).expect("emit");
        });

        let outcomes = Outcomes::new();
        let outcome = sig.expire_blocking(outcomes.spec(5_000)).expect("blocking");
        handle.join().expect("join");
        assert_eq!(outcome, ExpireOutcome::Delivered);
        assert_eq!(*outcomes.success.lock(), vec![11]);
        assert_eq!(outcomes.expired(), 0);
    }

    #[test]
    fn expire_blocking_times_out() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let outcomes = Outcomes::new();
        let outcome = sig.expire_blocking(outcomes.spec(20)).expect("blocking");
        assert_eq!(outcome, ExpireOutcome::Expired);
        assert_eq!(outcomes.expired(), 1);
        assert_eq!(sig.connection_count(), 0);
        assert_eq!(reg.connection_count(), 0);
    }

    #[test]
    fn timer_runs_on_a_thread_without_runtime() {
        let reg = Registry::new();
        let sig: Signal<u32> = reg.new_signal(None);
        let (tx, rx) = mpsc::channel();
        let spec = ExpireSpec::new(Duration::from_millis(20), |_: &u32| {}).on_expire(move || {
            let _ = tx.send(());
        });
        let conn = sig.expire(spec).expect("expire");

        rx.recv_timeout(Duration::from_secs(5)).expect("on_expire fired");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while reg.contains_connection(conn.id()) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!reg.contains_connection(conn.id()));
    }
}
