//! # Registry - context object for signals and their links.
//!
//! The registry replaces process-wide tables: every [`Signal`] is created through
//! one, and every connection or source binding registers itself here so that
//! any component holding the registry can resolve an id to its live object and
//! tear it down centrally.
//!
//! ## Architecture
//! ```text
//! Registry
//!   ├─ links:   HashMap<conn id, Link>        Link = Internal(connection) | External(binding)
//!   ├─ signals: HashMap<signal id, Weak<..>>  weak: the registry never keeps a signal alive
//!   ├─ bus:     Bus (report events)  ──► subscriber_listener ──► SubscriberSet
//!   └─ runtime_token: cancels pending expiry timers and the listener on shutdown
//! ```
//!
//! ## Rules
//! - Ids come from process-wide counters: unique across registries, never reused.
//! - Entries are removed when the owning signal unlinks a connection, or on
//!   [`Registry::disconnect`] / [`Registry::destroy_signal`] / [`Registry::shutdown`].
//! - No user code runs while a registry lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::builder::RegistryBuilder;
use crate::core::config::Config;
use crate::error::SignalError;
use crate::events::{Bus, Event, EventKind};
use crate::signal::Signal;
use crate::subscribers::SubscriberSet;

/// Process-wide connection (and binding) id counter.
static CONNECTION_SEQ: AtomicU64 = AtomicU64::new(0);
/// Process-wide signal id counter.
static SIGNAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Uniform capability of anything stored as a [`Link`].
pub(crate) trait LinkControl: Send + Sync {
    fn id(&self) -> u64;
    fn name(&self) -> &str;
    /// Gate delivery without unlinking.
    fn disable(&self);
    fn enable(&self);
    /// Permanently stop delivery.
    fn terminate(&self);
    fn is_live(&self) -> bool;
}

/// Teardown capability of a signal, independent of its payload type.
pub(crate) trait SignalControl: Send + Sync {
    fn destroy(&self);
    fn cleanup(&self) -> usize;
    fn is_alive(&self) -> bool;
}

/// Registry entry for one id, resolved once at registration.
#[derive(Clone)]
pub(crate) enum Link {
    /// A connection created by `connect`/`once`/`expire`/`wait`.
    Internal(Arc<dyn LinkControl>),
    /// An external event source bound with `bind_source`.
    External(Arc<dyn LinkControl>),
}

impl Link {
    pub(crate) fn control(&self) -> &Arc<dyn LinkControl> {
        match self {
            Link::Internal(c) | Link::External(c) => c,
        }
    }

    fn kind(&self) -> LinkKind {
        match self {
            Link::Internal(_) => LinkKind::Internal,
            Link::External(_) => LinkKind::External,
        }
    }
}

/// Public classification of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A [`Connection`](crate::Connection).
    Internal,
    /// A [`Binding`](crate::Binding) to an external source.
    External,
}

struct SignalSlot {
    name: Arc<str>,
    control: Weak<dyn SignalControl>,
}

/// Context object owning the connection and signal tables of an application or session.
pub struct Registry {
    cfg: Config,
    bus: Bus,
    links: Mutex<HashMap<u64, Link>>,
    signals: Mutex<HashMap<u64, SignalSlot>>,
    unnamed_connections: AtomicU64,
    unnamed_signals: AtomicU64,
    runtime_token: CancellationToken,
    subs: Option<Arc<SubscriberSet>>,
}

impl Registry {
    /// Creates a registry with the default [`Config`] and no subscribers.
    pub fn new() -> Arc<Self> {
        RegistryBuilder::new(Config::default()).build()
    }

    /// Creates a builder for a registry with the given configuration.
    pub fn builder(cfg: Config) -> RegistryBuilder {
        RegistryBuilder::new(cfg)
    }

    pub(crate) fn new_internal(cfg: Config, bus: Bus, subs: Option<Arc<SubscriberSet>>) -> Self {
        Self {
            cfg,
            bus,
            links: Mutex::new(HashMap::new()),
            signals: Mutex::new(HashMap::new()),
            unnamed_connections: AtomicU64::new(0),
            unnamed_signals: AtomicU64::new(0),
            runtime_token: CancellationToken::new(),
            subs,
        }
    }

    /// Creates a new signal registered in this registry.
    ///
    /// Without a name, the signal is called `"unnamed signal N"`. After
    /// [`shutdown`](Self::shutdown) the returned signal is already destroyed.
    pub fn new_signal<A>(self: &Arc<Self>, name: Option<&str>) -> Signal<A>
    where
        A: Send + Sync + 'static,
    {
        Signal::new(self, name)
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Report bus shared by every signal of this registry.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Creates a receiver of subsequent report events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Number of registered links (connections and source bindings).
    pub fn connection_count(&self) -> usize {
        self.links.lock().len()
    }

    /// Number of registered, not yet destroyed signals.
    pub fn signal_count(&self) -> usize {
        self.signals.lock().len()
    }

    /// True if `id` resolves to a registered link.
    pub fn contains_connection(&self, id: u64) -> bool {
        self.links.lock().contains_key(&id)
    }

    /// Classification of the link registered under `id`.
    pub fn link_kind(&self, id: u64) -> Option<LinkKind> {
        self.links.lock().get(&id).map(Link::kind)
    }

    /// Name of the link registered under `id`.
    pub fn connection_name(&self, id: u64) -> Option<String> {
        self.links
            .lock()
            .get(&id)
            .map(|l| l.control().name().to_string())
    }

    /// Sorted ids of registered signals.
    pub fn signal_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.signals.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Name of the signal registered under `id`.
    pub fn signal_name(&self, id: u64) -> Option<String> {
        self.signals.lock().get(&id).map(|s| s.name.to_string())
    }

    /// Gates delivery of a link without unlinking it. Returns false if unknown.
    pub fn set_enabled(&self, id: u64, enabled: bool) -> bool {
        let Some(link) = self.links.lock().get(&id).cloned() else {
            return false;
        };
        if enabled {
            link.control().enable();
        } else {
            link.control().disable();
        }
        true
    }

    /// Terminates the link registered under `id` and forgets it.
    ///
    /// Connections are marked dead; their signal evicts them on the next dispatch.
    /// Bindings are unbound from their source. Returns false if unknown.
    pub fn disconnect(&self, id: u64) -> bool {
        let Some(link) = self.links.lock().remove(&id) else {
            return false;
        };
        link.control().terminate();
        true
    }

    /// Destroys the signal registered under `id`. Returns false if unknown.
    pub fn destroy_signal(&self, id: u64) -> bool {
        let control = self.signals.lock().get(&id).and_then(|s| s.control.upgrade());
        match control {
            Some(control) => {
                control.destroy();
                true
            }
            None => {
                self.signals.lock().remove(&id);
                false
            }
        }
    }

    /// Kills every connection of the signal registered under `id`, keeping the signal.
    ///
    /// Returns the number of killed links, or `None` if unknown.
    pub fn cleanup_signal(&self, id: u64) -> Option<usize> {
        let control = self.signals.lock().get(&id).and_then(|s| s.control.upgrade())?;
        Some(control.cleanup())
    }

    /// Destroys every signal and terminates every remaining link. Pending
    /// expiry timers and the subscriber listener are cancelled, and the
    /// subscriber workers stop once their queues drain.
    ///
    /// Expiring subscriptions still pending at shutdown resolve neither way.
    /// Signals created afterwards are born destroyed.
    pub fn shutdown(&self) {
        self.runtime_token.cancel();

        let controls: Vec<Arc<dyn SignalControl>> = {
            let mut signals = self.signals.lock();
            signals
                .drain()
                .filter_map(|(_, slot)| slot.control.upgrade())
                .collect()
        };
        for control in controls {
            control.destroy();
        }

        let leftovers: Vec<Link> = self.links.lock().drain().map(|(_, l)| l).collect();
        for link in leftovers {
            link.control().terminate();
        }
        if let Some(subs) = &self.subs {
            subs.close();
        }
        tracing::debug!("registry shut down");
    }

    /// True once [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.runtime_token.is_cancelled()
    }

    /// Number of report subscribers still receiving events; zero after shutdown.
    pub fn subscriber_count(&self) -> usize {
        self.subs.as_ref().map_or(0, |s| s.len())
    }

    // ---------------------------
    // Crate-internal bookkeeping
    // ---------------------------

    pub(crate) fn next_connection_id() -> u64 {
        CONNECTION_SEQ.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_signal_id() -> u64 {
        SIGNAL_SEQ.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn unnamed_connection_name(&self) -> Arc<str> {
        let n = self.unnamed_connections.fetch_add(1, Ordering::Relaxed);
        self.cfg.connection_name(n).into()
    }

    pub(crate) fn unnamed_signal_name(&self) -> Arc<str> {
        let n = self.unnamed_signals.fetch_add(1, Ordering::Relaxed);
        self.cfg.signal_name(n).into()
    }

    pub(crate) fn link(&self, id: u64, link: Link) {
        self.links.lock().insert(id, link);
    }

    pub(crate) fn unlink(&self, id: u64) -> Option<Link> {
        self.links.lock().remove(&id)
    }

    pub(crate) fn track_signal(&self, id: u64, name: Arc<str>, control: Weak<dyn SignalControl>) {
        self.signals.lock().insert(id, SignalSlot { name, control });
    }

    pub(crate) fn forget_signal(&self, id: u64) {
        self.signals.lock().remove(&id);
    }

    pub(crate) fn runtime_token(&self) -> &CancellationToken {
        &self.runtime_token
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    /// Reports a rejected operation or a middleware failure and hands the error back.
    pub(crate) fn report(&self, signal_id: u64, err: SignalError) -> SignalError {
        tracing::warn!(
            signal = err.signal(),
            signal_id,
            label = err.as_label(),
            "{}",
            err.as_message()
        );
        let kind = match err {
            SignalError::MiddlewarePanicked { .. } => EventKind::MiddlewarePanicked,
            _ => EventKind::UsageRejected,
        };
        self.bus.publish(
            Event::new(kind)
                .with_signal(signal_id, err.signal())
                .with_reason(err.as_message()),
        );
        err
    }
}
