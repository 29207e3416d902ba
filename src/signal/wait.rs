//! # Waiting for the next emit.
//!
//! A [`Waiter`] is a one-shot connection whose callback feeds a oneshot channel.
//! Destroying the connection drops the sender, so the waiting task resumes with
//! [`WaitError::Cancelled`] instead of hanging.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::WaitError;
use crate::signal::connection::{Connection, ConnectionKind, Handler};
use crate::signal::signal::Signal;

/// Pending wait for the next emit of a signal.
///
/// The backing connection is exposed so it can be slept, woken or destroyed
/// like any other subscription.
#[must_use = "a waiter does nothing unless awaited"]
pub struct Waiter<A> {
    connection: Connection<A>,
    rx: oneshot::Receiver<A>,
}

impl<A> Waiter<A> {
    /// Connection that will receive the next emit.
    pub fn connection(&self) -> &Connection<A> {
        &self.connection
    }

    /// Resolves with the next delivered payload.
    ///
    /// ### Errors
    /// [`WaitError::Cancelled`] if the connection died before delivery.
    pub async fn wait(self) -> Result<A, WaitError> {
        self.rx.await.map_err(|_| WaitError::Cancelled)
    }
}

impl<A> Signal<A>
where
    A: Clone + Send + Sync + 'static,
{
    /// Subscribes a one-shot connection and returns a handle to await it.
    ///
    /// ### Errors
    /// [`WaitError::Rejected`] if the signal is destroyed.
    pub fn waiter(&self) -> Result<Waiter<A>, WaitError> {
        let (tx, rx) = oneshot::channel();
        let connection = self.inner.register(
            ConnectionKind::OneShot,
            None,
            Handler::Once(Box::new(move |args: &A| {
                let _ = tx.send(args.clone());
            })),
        )?;
        Ok(Waiter { connection, rx })
    }

    /// Suspends the calling task until the next emit and returns its payload.
    ///
    /// ### Errors
    /// - [`WaitError::Rejected`] if the signal is destroyed
    /// - [`WaitError::Cancelled`] if the signal is cleaned up or destroyed while waiting
    pub async fn wait(&self) -> Result<A, WaitError> {
        self.waiter()?.wait().await
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// On timeout the backing connection is killed.
    ///
    /// ### Errors
    /// [`WaitError::TimedOut`] in addition to the errors of [`wait`](Self::wait).
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<A, WaitError> {
        let waiter = self.waiter()?;
        let id = waiter.connection.id();
        match tokio::time::timeout(timeout, waiter.wait()).await {
            Ok(res) => res,
            Err(_) => {
                self.inner.unlink(id);
                Err(WaitError::TimedOut)
            }
        }
    }
}
