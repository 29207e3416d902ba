//! Signals and their subscriptions.
//!
//! - [`signal`]: the [`Signal`] handle, dispatch, attachments, middleware, teardown;
//! - [`connection`]: the [`Connection`] handle and its lifecycle;
//! - [`expire`]: subscriptions racing a deadline;
//! - [`wait`]: awaiting the next emit.

mod connection;
mod expire;
#[allow(clippy::module_inception)]
mod signal;
mod wait;

pub use connection::{Connection, ConnectionKind, ConnectionState};
pub use expire::{ExpireOutcome, ExpireSpec};
pub use signal::{DispatchReport, Signal};
pub use wait::Waiter;

pub(crate) use signal::SignalInner;
