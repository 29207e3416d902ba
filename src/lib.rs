//! # rolert
//!
//! **Rolert** is an in-process signal library for Rust.
//!
//! A [`Signal`] is a named broadcast channel: callers [`emit`](Signal::emit) a
//! payload and every live subscription receives it synchronously, in
//! subscription order. Subscriptions are [`Connection`]s with an explicit
//! lifecycle (awake, asleep, dead). Signals can be chained, filtered by
//! middleware, awaited, raced against deadlines and fed by external sources.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                      ┌────────────────────────────────────────────┐
//!                      │  Registry (context object)                 │
//!                      │  - links:   id ─► Internal | External      │
//!                      │  - signals: id ─► weak signal control      │
//!                      │  - Bus (report events)                     │
//!                      └──────┬───────────────────────────┬─────────┘
//!                             │ new_signal                │ publish
//!                             ▼                           ▼
//!   emit(args) ──► ┌──────────────────────┐     ┌──────────────────────┐
//!                  │ Signal               │     │ Bus (broadcast)      │
//!                  │  1. middlewares      │     └──────────┬───────────┘
//!                  │  2. attached signals │                ▼
//!                  │  3. connections      │       subscriber_listener
//!                  └──┬───────┬───────┬───┘                ▼
//!                     ▼       ▼       ▼              SubscriberSet
//!                 connect   once   expire/wait      (per-sub queues)
//!                                                          ▼
//!   EventSource ──fire──► Binding ──emit──► Signal    sub.on_event()
//! ```
//!
//! ### Connection lifecycle
//! ```text
//! connect/once/expire/waiter ──► Awake ◄──wake/sleep──► Asleep
//!                                  │                       │
//!                                  └──► Dead ◄─────────────┘
//!            (destroy, registry disconnect, signal cleanup/destroy,
//!             first delivery of a one-shot or expiring connection)
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                          |
//! |-------------------|----------------------------------------------------------------|---------------------------------------------|
//! | **Signals**       | Emit, subscribe, chain, filter, clean up, destroy.             | [`Signal`], [`DispatchReport`]              |
//! | **Connections**   | Handles with sleep/wake/destroy and a kind.                    | [`Connection`], [`ConnectionKind`]          |
//! | **Deadlines**     | Subscriptions racing a timeout, blocking or async.             | [`ExpireSpec`], [`ExpireOutcome`]           |
//! | **Waiting**       | Await the next emit.                                           | [`Waiter`], [`WaitError`]                   |
//! | **Sources**       | Bind external event streams into a signal.                     | [`EventSource`], [`Binding`], [`ManualSource`] |
//! | **Registry**      | Id lookup and centralized teardown.                            | [`Registry`], [`RegistryBuilder`]           |
//! | **Reports**       | Lifecycle and failure events with async subscribers.           | [`Event`], [`Bus`], [`Subscribe`]           |
//! | **Configuration** | Bus capacity and default naming.                               | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use rolert::{Registry, Signal};
//!
//! let reg = Registry::new();
//! let clicks: Signal<u32> = reg.new_signal(Some("clicks"));
//! let total = Arc::new(AtomicU32::new(0));
//!
//! let t = total.clone();
//! let conn = clicks
//!     .connect(move |n| {
//!         t.fetch_add(*n, Ordering::SeqCst);
//!     })
//!     .unwrap();
//! clicks.once(|n| println!("first click: {n}")).unwrap();
//!
//! clicks.emit(2).unwrap();
//! conn.sleep();
//! clicks.emit(5).unwrap();
//! assert_eq!(total.load(Ordering::SeqCst), 2);
//!
//! clicks.destroy();
//! assert!(clicks.emit(1).is_err());
//! ```
mod core;
mod error;
mod events;
mod signal;
mod source;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{Config, LinkKind, Registry, RegistryBuilder};
pub use error::{SignalError, WaitError};
pub use events::{Bus, Event, EventKind};
pub use signal::{
    Connection, ConnectionKind, ConnectionState, DispatchReport, ExpireOutcome, ExpireSpec,
    Signal, Waiter,
};
pub use source::{Binding, EventSource, ManualSource, SourceHandler};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
