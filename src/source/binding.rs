//! # Binding: an external event source forwarded into a signal.
//!
//! ```text
//! EventSource ──fire(raw)──► handler (weak) ──► BindingInner::fire
//!                                                 ├─ unbound / asleep ─► ignore
//!                                                 ├─ !persist ─► unbind first
//!                                                 ├─ on_source_event(raw)
//!                                                 └─ signal.emit(forward)
//! ```
//!
//! A binding is registered as an external link in the registry and in the
//! owning signal, so `Registry::disconnect`, `Signal::cleanup` and
//! `Signal::destroy` all unbind it from the source.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::{Link, LinkControl, Registry};
use crate::error::SignalError;
use crate::events::{Event, EventKind};
use crate::signal::{Signal, SignalInner};

use super::{EventSource, SourceHandler};

struct BindingInner<S: EventSource, A> {
    id: u64,
    name: Arc<str>,
    source: Arc<S>,
    token: Mutex<Option<S::Token>>,
    bound: AtomicBool,
    awake: AtomicBool,
    persist: bool,
    forward: A,
    on_source_event: Option<SourceHandler<S::Args>>,
    signal: Weak<SignalInner<A>>,
    signal_id: u64,
    signal_name: Arc<str>,
    registry: Arc<Registry>,
}

impl<S, A> BindingInner<S, A>
where
    S: EventSource,
    A: Send + Sync + 'static,
{
    fn fire(&self, raw: &S::Args) {
        if !self.bound.load(Ordering::Acquire) || !self.awake.load(Ordering::Acquire) {
            return;
        }
        if !self.persist && !self.unbind() {
            return;
        }

        if let Some(f) = &self.on_source_event {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(raw))) {
                let reason = crate::panic_message(panic.as_ref());
                tracing::warn!(signal = %self.signal_name, binding = %self.name, %reason, "source callback panicked");
                self.registry.publish(
                    self.event(EventKind::CallbackPanicked).with_reason(reason),
                );
            }
        }

        if let Some(signal) = self.signal.upgrade() {
            let _ = signal.dispatch(&self.forward);
        }
    }

    /// Returns false if already unbound.
    fn unbind(&self) -> bool {
        if !self.bound.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.release();
        true
    }

    fn release(&self) {
        let token = self.token.lock().take();
        if let Some(token) = token {
            self.source.unsubscribe(token);
        }
        self.registry.unlink(self.id);
        if let Some(signal) = self.signal.upgrade() {
            signal.bindings.lock().remove(&self.id);
        }

        tracing::debug!(signal = %self.signal_name, binding = %self.name, "source unbound");
        self.registry.publish(self.event(EventKind::SourceUnbound));
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_signal(self.signal_id, self.signal_name.clone())
            .with_connection(self.id, self.name.clone())
    }
}

impl<S, A> LinkControl for BindingInner<S, A>
where
    S: EventSource,
    A: Send + Sync + 'static,
{
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn disable(&self) {
        self.awake.store(false, Ordering::Release);
    }

    fn enable(&self) {
        self.awake.store(true, Ordering::Release);
    }

    fn terminate(&self) {
        self.unbind();
    }

    fn is_live(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }
}

/// Handle to a source bound into a signal.
#[derive(Clone)]
pub struct Binding {
    inner: Arc<dyn LinkControl>,
}

impl Binding {
    /// Registry id (shared id space with connections).
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Unsubscribes from the source. Idempotent.
    pub fn unbind(&self) {
        self.inner.terminate();
    }

    /// Ignores source firings until [`wake`](Self::wake).
    pub fn sleep(&self) {
        self.inner.disable();
    }

    /// Resumes forwarding.
    pub fn wake(&self) {
        self.inner.enable();
    }

    /// True until unbound.
    pub fn is_bound(&self) -> bool {
        self.inner.is_live()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.inner.id())
            .field("name", &self.inner.name())
            .field("bound", &self.inner.is_live())
            .finish()
    }
}

impl<A> Signal<A>
where
    A: Send + Sync + 'static,
{
    /// Forwards every firing of `source` as an emit of `forward`.
    ///
    /// With `persist = false` the binding unbinds itself on the first firing.
    ///
    /// ### Errors
    /// [`SignalError::SignalDestroyed`] if the signal is destroyed.
    pub fn bind_source<S>(
        &self,
        source: Arc<S>,
        persist: bool,
        forward: A,
    ) -> Result<Binding, SignalError>
    where
        S: EventSource,
    {
        self.bind(source, persist, forward, None)
    }

    /// Like [`bind_source`](Self::bind_source), also running `on_source_event`
    /// with the raw source payload before each forwarded emit.
    pub fn bind_source_with<S, F>(
        &self,
        source: Arc<S>,
        persist: bool,
        forward: A,
        on_source_event: F,
    ) -> Result<Binding, SignalError>
    where
        S: EventSource,
        F: Fn(&S::Args) + Send + Sync + 'static,
    {
        self.bind(source, persist, forward, Some(Arc::new(on_source_event)))
    }

    fn bind<S>(
        &self,
        source: Arc<S>,
        persist: bool,
        forward: A,
        on_source_event: Option<SourceHandler<S::Args>>,
    ) -> Result<Binding, SignalError>
    where
        S: EventSource,
    {
        let sig = &self.inner;
        if !sig.is_alive() {
            return Err(sig.reject_dead());
        }

        let id = Registry::next_connection_id();
        let binding = Arc::new(BindingInner {
            id,
            name: sig.registry.unnamed_connection_name(),
            source,
            token: Mutex::new(None),
            bound: AtomicBool::new(true),
            awake: AtomicBool::new(true),
            persist,
            forward,
            on_source_event,
            signal: Arc::downgrade(sig),
            signal_id: sig.id,
            signal_name: sig.name.clone(),
            registry: Arc::clone(&sig.registry),
        });
        let control: Arc<dyn LinkControl> = binding.clone();

        {
            let mut bindings = sig.bindings.lock();
            if !sig.is_alive() {
                drop(bindings);
                return Err(sig.reject_dead());
            }
            bindings.insert(id, Arc::clone(&control));
            sig.registry.link(id, Link::External(Arc::clone(&control)));
        }

        let weak: Weak<BindingInner<S, A>> = Arc::downgrade(&binding);
        let handler: SourceHandler<S::Args> = Arc::new(move |raw: &S::Args| {
            if let Some(b) = weak.upgrade() {
                b.fire(raw);
            }
        });
        let token = binding.source.subscribe(handler);
        *binding.token.lock() = Some(token);

        // Unbound while subscribing: give the token back.
        if !binding.bound.load(Ordering::Acquire) {
            let token = binding.token.lock().take();
            if let Some(token) = token {
                binding.source.unsubscribe(token);
            }
        }

        tracing::debug!(signal = %sig.name, binding = %binding.name, persist, "source bound");
        sig.registry.publish(binding.event(EventKind::SourceBound));
        Ok(Binding { inner: control })
    }
}
