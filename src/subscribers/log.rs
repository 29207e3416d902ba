//! # LogWriter - report events as tracing records
//!
//! A minimal subscriber that renders every incoming [`Event`] through `tracing`.
//! Failures are logged at `warn`, lifecycle steps at `info`.
//!
//! ## Example output (with a fmt subscriber installed)
//! ```text
//! INFO rolert: [signal_created] signal="clicks" id=0
//! INFO rolert: [connection_created] signal="clicks" connection="unnamed connection 0" kind=persistent
//! WARN rolert: [callback_panicked] signal="clicks" connection="logger" reason="boom"
//! INFO rolert: [expire_elapsed] connection="unnamed connection 1" timeout_ms=100
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let signal = e.signal.as_deref().unwrap_or("-");
        let connection = e.connection.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::SignalCreated | EventKind::SignalDestroyed | EventKind::SignalCleaned => {
                tracing::info!(
                    target: "rolert",
                    seq = e.seq,
                    signal,
                    id = e.signal_id,
                    "[{}]",
                    e.kind.as_label()
                );
            }
            EventKind::ConnectionCreated
            | EventKind::ConnectionKilled
            | EventKind::SourceBound
            | EventKind::SourceUnbound => {
                tracing::info!(
                    target: "rolert",
                    seq = e.seq,
                    signal,
                    connection,
                    id = e.connection_id,
                    kind = reason,
                    "[{}]",
                    e.kind.as_label()
                );
            }
            EventKind::EmitVetoed => {
                tracing::info!(
                    target: "rolert",
                    seq = e.seq,
                    signal,
                    middleware = reason,
                    "[{}]",
                    e.kind.as_label()
                );
            }
            EventKind::ExpireDelivered | EventKind::ExpireElapsed => {
                tracing::info!(
                    target: "rolert",
                    seq = e.seq,
                    signal,
                    connection,
                    timeout_ms = e.timeout_ms,
                    "[{}]",
                    e.kind.as_label()
                );
            }
            EventKind::UsageRejected
            | EventKind::MiddlewarePanicked
            | EventKind::CallbackPanicked
            | EventKind::SubscriberPanicked
            | EventKind::SubscriberOverflow => {
                tracing::warn!(
                    target: "rolert",
                    seq = e.seq,
                    signal,
                    connection,
                    reason,
                    "[{}]",
                    e.kind.as_label()
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [EventKind; 15] = [
        EventKind::SignalCreated,
        EventKind::SignalDestroyed,
        EventKind::SignalCleaned,
        EventKind::ConnectionCreated,
        EventKind::ConnectionKilled,
        EventKind::UsageRejected,
        EventKind::EmitVetoed,
        EventKind::MiddlewarePanicked,
        EventKind::CallbackPanicked,
        EventKind::ExpireDelivered,
        EventKind::ExpireElapsed,
        EventKind::SourceBound,
        EventKind::SourceUnbound,
        EventKind::SubscriberPanicked,
        EventKind::SubscriberOverflow,
    ];

    #[tokio::test]
    async fn writes_every_kind_with_and_without_metadata() {
        let writer = LogWriter::new();
        assert_eq!(writer.name(), "LogWriter");

        for kind in KINDS {
            writer.on_event(&Event::new(kind)).await;
            let full = Event::new(kind)
                .with_signal(1, "clicks")
                .with_connection(2, "logger")
                .with_reason("boom")
                .with_timeout(std::time::Duration::from_millis(100));
            writer.on_event(&full).await;
        }
    }

    #[tokio::test]
    async fn runs_as_a_registry_subscriber() {
        let reg = crate::Registry::builder(crate::Config::default())
            .with_subscribers(vec![std::sync::Arc::new(LogWriter::new())])
            .build();
        assert_eq!(reg.subscriber_count(), 1);

        let sig: crate::Signal<u8> = reg.new_signal(Some("clicks"));
        sig.connect(|_| {}).expect("connect");
        sig.emit(1).expect("emit");
        reg.shutdown();
        assert_eq!(reg.subscriber_count(), 0);
    }
}
