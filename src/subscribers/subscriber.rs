//! # Listening to registry reports.
//!
//! Signals and the registry describe what happens to them (a callback that
//! panicked, an expiry that elapsed) as [`Event`]s on the
//! registry [`Bus`](crate::Bus). [`Subscribe`] is the hook for code that wants
//! those reports without polling a broadcast receiver itself.
//!
//! Subscribers are handed to [`RegistryBuilder::with_subscribers`](crate::RegistryBuilder::with_subscribers).
//! The registry then forwards every report to each of them off the emitting
//! thread, so a slow listener never delays [`Signal::emit`](crate::Signal::emit).
//! A listener whose queue is full loses that report and a
//! `subscriber_overflow` report is raised instead.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use async_trait::async_trait;
//! use rolert::{Event, EventKind, Subscribe};
//!
//! /// Counts expiring subscriptions that lost to their deadline.
//! #[derive(Default)]
//! struct MissedDeadlines(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for MissedDeadlines {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ExpireElapsed {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "missed-deadlines" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receiver of registry reports.
///
/// Each implementation gets its own queue and worker task. Reports arrive in
/// publication order; a panic inside [`on_event`](Self::on_event) is caught
/// and reported as `subscriber_panicked`, and the worker keeps going.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one report.
    async fn on_event(&self, event: &Event);

    /// Label used when this subscriber overflows or panics.
    ///
    /// Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// How many reports may wait in this subscriber's queue. Values below 1 count as 1.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
