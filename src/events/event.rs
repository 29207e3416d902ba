//! # Report events published by the registry, signals and bindings.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: signals and connections created, killed, destroyed
//! - **Dispatch events**: vetoed emits and isolated callback failures
//! - **Expiry events**: how an expiring subscription's race was resolved
//! - **Subscriber events**: problems inside the async subscriber fan-out
//!
//! The [`Event`] struct carries additional metadata such as timestamps, signal
//! and connection names, and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use rolert::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CallbackPanicked)
//!     .with_signal(3, "clicks")
//!     .with_connection(7, "logger")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::CallbackPanicked);
//! assert_eq!(ev.signal.as_deref(), Some("clicks"));
//! assert_eq!(ev.connection_id, Some(7));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of report events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Signal lifecycle ===
    /// A signal was created and registered.
    ///
    /// Sets: `signal`, `signal_id`.
    SignalCreated,

    /// A signal was destroyed (explicitly, by registry teardown, or on drop).
    ///
    /// Sets: `signal`, `signal_id`.
    SignalDestroyed,

    /// All connections of a signal were killed by `cleanup`.
    ///
    /// Sets: `signal`, `signal_id`, `reason` (number of killed links).
    SignalCleaned,

    // === Connection lifecycle ===
    /// A connection was created and registered.
    ///
    /// Sets: `signal`, `signal_id`, `connection`, `connection_id`, `reason` (kind label).
    ConnectionCreated,

    /// A connection or binding was unlinked from its signal and the registry.
    ///
    /// Sets: `signal`, `signal_id`, `connection`, `connection_id`.
    ConnectionKilled,

    // === Dispatch ===
    /// An operation was rejected as a usage error (dead signal, bad attach).
    ///
    /// Sets: `signal`, `signal_id`, `reason` (error message).
    UsageRejected,

    /// A middleware predicate returned `false`; the emit was aborted.
    ///
    /// Sets: `signal`, `signal_id`, `reason` (predicate index).
    EmitVetoed,

    /// A middleware predicate panicked; the emit was aborted.
    ///
    /// Sets: `signal`, `signal_id`, `reason` (panic message).
    MiddlewarePanicked,

    /// A connection callback panicked; delivery continued with the next one.
    ///
    /// Sets: `signal`, `signal_id`, `connection`, `connection_id`, `reason`.
    CallbackPanicked,

    // === Expiring subscriptions ===
    /// The event arrived before the deadline; `on_success` ran.
    ///
    /// Sets: `signal`, `connection`, `connection_id`, `timeout_ms`.
    ExpireDelivered,

    /// The deadline won the race; `on_expire` ran (if supplied).
    ///
    /// Sets: `signal`, `connection`, `connection_id`, `timeout_ms`.
    ExpireElapsed,

    // === External sources ===
    /// An external source was bound to a signal.
    ///
    /// Sets: `signal`, `signal_id`, `connection`, `connection_id`.
    SourceBound,

    /// An external source binding was released.
    ///
    /// Sets: `signal`, `connection`, `connection_id`.
    SourceUnbound,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `connection` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `connection` (subscriber name), `reason`.
    SubscriberOverflow,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SignalCreated => "signal_created",
            EventKind::SignalDestroyed => "signal_destroyed",
            EventKind::SignalCleaned => "signal_cleaned",
            EventKind::ConnectionCreated => "connection_created",
            EventKind::ConnectionKilled => "connection_killed",
            EventKind::UsageRejected => "usage_rejected",
            EventKind::EmitVetoed => "emit_vetoed",
            EventKind::MiddlewarePanicked => "middleware_panicked",
            EventKind::CallbackPanicked => "callback_panicked",
            EventKind::ExpireDelivered => "expire_delivered",
            EventKind::ExpireElapsed => "expire_elapsed",
            EventKind::SourceBound => "source_bound",
            EventKind::SourceUnbound => "source_unbound",
            EventKind::SubscriberPanicked => "subscriber_panicked",
            EventKind::SubscriberOverflow => "subscriber_overflow",
        }
    }

    /// True for kinds that describe a failure rather than a lifecycle step.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventKind::UsageRejected
                | EventKind::MiddlewarePanicked
                | EventKind::CallbackPanicked
                | EventKind::SubscriberPanicked
                | EventKind::SubscriberOverflow
        )
    }
}

/// Report event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Signal id, if applicable.
    pub signal_id: Option<u64>,
    /// Signal name, if applicable.
    pub signal: Option<Arc<str>>,
    /// Connection (or binding, or subscriber) id, if applicable.
    pub connection_id: Option<u64>,
    /// Connection (or binding, or subscriber) name, if applicable.
    pub connection: Option<Arc<str>>,
    /// Human-readable reason (errors, panic payloads, counts).
    pub reason: Option<Arc<str>>,
    /// Expiry duration in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            signal_id: None,
            signal: None,
            connection_id: None,
            connection: None,
            reason: None,
            timeout_ms: None,
        }
    }

    /// Attaches the originating signal.
    #[inline]
    pub fn with_signal(mut self, id: u64, name: impl Into<Arc<str>>) -> Self {
        self.signal_id = Some(id);
        self.signal = Some(name.into());
        self
    }

    /// Attaches the connection the event is about.
    #[inline]
    pub fn with_connection(mut self, id: u64, name: impl Into<Arc<str>>) -> Self {
        self.connection_id = Some(id);
        self.connection = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an expiry duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.connection = Some(subscriber.into());
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.connection = Some(subscriber.into());
        ev
    }

    /// True for overflow reports; the subscriber set never re-reports these.
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}
