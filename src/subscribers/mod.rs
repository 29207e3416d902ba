//! # Report subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! used by a [`Registry`](crate::Registry) built with
//! [`RegistryBuilder::with_subscribers`](crate::RegistryBuilder::with_subscribers).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Signal ── publish(Event) ──► Bus ──► subscriber_listener ──► SubscriberSet
//!                                                                   │
//!                                                         ┌─────────┼─────────┐
//!                                                         ▼         ▼         ▼
//!                                                     LogWriter  Metrics   Custom
//! ```
//!
//! Subscribers never run inside `emit`: signal dispatch is synchronous, report
//! handling is asynchronous and best-effort.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
