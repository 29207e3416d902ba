//! Report events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to reports emitted by the registry, signals, expiring
//! subscriptions, source bindings and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry`, `Signal` (lifecycle, dispatch failures),
//!   the expiry race, `Binding`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Registry::subscribe()` receivers and the registry's
//!   subscriber listener (fans out to `SubscriberSet`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
