//! Error types used by signals and waiters.
//!
//! This module defines two error enums:
//!
//! - [`SignalError`]: usage errors rejected by a [`Signal`](crate::Signal)
//!   (operating on a destroyed signal, bad attachments) and middleware failures.
//! - [`WaitError`]: outcomes of a suspended [`wait`](crate::Signal::wait) that did
//!   not receive a payload.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! Every `SignalError` returned by the crate has already been reported through
//! `tracing` and the registry [`Bus`](crate::Bus) at the point of occurrence.

use std::sync::Arc;

use thiserror::Error;

/// # Errors produced by signal operations.
///
/// These are non-fatal: the rejected operation is a no-op and the signal
/// stays consistent.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The signal was destroyed; it no longer dispatches or accepts subscriptions.
    #[error("signal '{signal}' is destroyed")]
    SignalDestroyed {
        /// Name of the destroyed signal.
        signal: Arc<str>,
    },

    /// A signal cannot be attached to itself.
    #[error("signal '{signal}' cannot attach to itself")]
    SelfAttach {
        /// Name of the signal.
        signal: Arc<str>,
    },

    /// The target is already in this signal's attached list.
    #[error("signal '{target}' is already attached to '{signal}'")]
    AlreadyAttached {
        /// Name of the upstream signal.
        signal: Arc<str>,
        /// Name of the attached signal.
        target: Arc<str>,
    },

    /// Attaching would make propagation loop back into this signal.
    #[error("attaching '{target}' to '{signal}' would form a cycle")]
    AttachCycle {
        /// Name of the upstream signal.
        signal: Arc<str>,
        /// Name of the rejected target.
        target: Arc<str>,
    },

    /// A middleware predicate panicked; the emit was aborted.
    #[error("middleware #{index} of signal '{signal}' panicked: {reason}")]
    MiddlewarePanicked {
        /// Name of the signal.
        signal: Arc<str>,
        /// Position of the predicate in the chain.
        index: usize,
        /// Panic payload rendered as text.
        reason: String,
    },
}

impl SignalError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use rolert::SignalError;
    ///
    /// let err = SignalError::SelfAttach { signal: "clicks".into() };
    /// assert_eq!(err.as_label(), "signal_self_attach");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SignalError::SignalDestroyed { .. } => "signal_destroyed",
            SignalError::SelfAttach { .. } => "signal_self_attach",
            SignalError::AlreadyAttached { .. } => "signal_already_attached",
            SignalError::AttachCycle { .. } => "signal_attach_cycle",
            SignalError::MiddlewarePanicked { .. } => "middleware_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SignalError::SignalDestroyed { signal } => {
                format!("operation on destroyed signal={signal}")
            }
            SignalError::SelfAttach { signal } => format!("self attach: signal={signal}"),
            SignalError::AlreadyAttached { signal, target } => {
                format!("duplicate attach: signal={signal} target={target}")
            }
            SignalError::AttachCycle { signal, target } => {
                format!("attach cycle: signal={signal} target={target}")
            }
            SignalError::MiddlewarePanicked {
                signal,
                index,
                reason,
            } => format!("middleware panic: signal={signal} index={index} reason={reason}"),
        }
    }

    /// Name of the signal the error was raised on.
    pub fn signal(&self) -> &str {
        match self {
            SignalError::SignalDestroyed { signal }
            | SignalError::SelfAttach { signal }
            | SignalError::AlreadyAttached { signal, .. }
            | SignalError::AttachCycle { signal, .. }
            | SignalError::MiddlewarePanicked { signal, .. } => signal,
        }
    }
}

/// # Errors produced while waiting for the next emit.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// The signal was destroyed before the wait could be registered.
    #[error(transparent)]
    Rejected(#[from] SignalError),

    /// The backing connection was destroyed before any emit reached it.
    #[error("wait cancelled")]
    Cancelled,

    /// No emit arrived within the requested duration.
    #[error("wait timed out")]
    TimedOut,
}

impl WaitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use rolert::WaitError;
    ///
    /// assert_eq!(WaitError::Cancelled.as_label(), "wait_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WaitError::Rejected(inner) => inner.as_label(),
            WaitError::Cancelled => "wait_cancelled",
            WaitError::TimedOut => "wait_timed_out",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            WaitError::Rejected(inner) => inner.as_message(),
            WaitError::Cancelled => "backing connection destroyed".to_string(),
            WaitError::TimedOut => "no emit before deadline".to_string(),
        }
    }

    /// True when the wait ended because its connection was destroyed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WaitError::Cancelled)
    }
}
