//! External event sources bound into signals.
//!
//! An [`EventSource`] is anything that can register a callback and later
//! remove it by token. [`Signal::bind_source`](crate::Signal::bind_source)
//! subscribes to one and forwards every firing as an emit with fixed arguments.
//! [`ManualSource`] is an in-process source fired by hand.

mod binding;
mod manual;

use std::sync::Arc;

pub use binding::Binding;
pub use manual::ManualSource;

/// Callback handed to an [`EventSource`].
pub type SourceHandler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Capability to subscribe to and unsubscribe from an external event stream.
///
/// Implementations must tolerate `unsubscribe` being called from inside a
/// handler invocation.
pub trait EventSource: Send + Sync + 'static {
    /// Payload the source fires with.
    type Args: 'static;
    /// Opaque subscription handle.
    type Token: Send + 'static;

    /// Registers `handler`; it runs on every firing until unsubscribed.
    fn subscribe(&self, handler: SourceHandler<Self::Args>) -> Self::Token;

    /// Removes the handler registered under `token`.
    fn unsubscribe(&self, token: Self::Token);
}
