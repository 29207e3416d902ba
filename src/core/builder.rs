use std::sync::Arc;

use crate::{
    core::Config,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

use super::registry::Registry;

/// Builder for constructing a [`Registry`] with optional report subscribers.
pub struct RegistryBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RegistryBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets report subscribers.
    ///
    /// Subscribers receive report events (lifecycle, rejections, callback panics)
    /// through dedicated workers with bounded queues. When at least one subscriber
    /// is set, [`build`](Self::build) must run inside a tokio runtime.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the registry.
    ///
    /// This consumes the builder and initializes:
    /// - Report bus
    /// - Subscriber workers and the bus listener (only if subscribers were set)
    pub fn build(self) -> Arc<Registry> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        let subs = if self.subscribers.is_empty() {
            None
        } else {
            Some(Arc::new(SubscriberSet::new(self.subscribers, bus.clone())))
        };

        let registry = Arc::new(Registry::new_internal(self.cfg, bus, subs.clone()));
        if let Some(set) = subs {
            subscriber_listener(&registry, set);
        }
        registry
    }
}

/// Subscribes to the bus and forwards events to the subscriber set until shutdown.
fn subscriber_listener(registry: &Registry, set: Arc<SubscriberSet>) {
    let mut rx = registry.bus().subscribe();
    let token = registry.runtime_token().clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit_arc(Arc::new(ev)),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "report listener lagged");
                        continue;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::events::{Event, EventKind};
    use crate::signal::Signal;

    struct Recorder(mpsc::UnboundedSender<EventKind>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            let _ = self.0.send(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn subscribers_receive_reports() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reg = Registry::builder(Config::default())
            .with_subscribers(vec![Arc::new(Recorder(tx))])
            .build();
        assert_eq!(reg.subscriber_count(), 1);

        let sig: Signal<u8> = reg.new_signal(Some("recorder"));
        sig.connect(|_| panic!("boom")).expect("connect");
        sig.emit(1).expect("emit");

        let mut kinds = Vec::new();
        while kinds.len() < 3 {
            let kind = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("report in time")
                .expect("open channel");
            kinds.push(kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::SignalCreated,
                EventKind::ConnectionCreated,
                EventKind::CallbackPanicked
            ]
        );
        reg.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_subscriber_workers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reg = Registry::builder(Config::default())
            .with_subscribers(vec![Arc::new(Recorder(tx))])
            .build();
        let _sig: Signal<u8> = reg.new_signal(None);

        reg.shutdown();
        assert_eq!(reg.subscriber_count(), 0);

        // The worker drops the recorder, and with it the only sender, once it exits.
        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "subscriber worker still running after shutdown");
    }
}
