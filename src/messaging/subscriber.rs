//! Background worker consuming one message source.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::backoff::{BackoffConfig, ExponentialBackoff};
use super::dispatcher::MessageDispatcher;
use super::source::{Disposition, MessageSource};

/// Counters returned when a subscriber stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub handled: u64,
    pub not_handled: u64,
}

/// Consumes a [`MessageSource`] strictly one message at a time.
///
/// The next message is not received until the current one has been
/// dispatched and settled. Stops on the shutdown signal or when the source
/// is exhausted.
pub struct EventSubscriber {
    dispatcher: Arc<MessageDispatcher>,
    shutdown: broadcast::Sender<()>,
    backoff: BackoffConfig,
}

impl EventSubscriber {
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            dispatcher,
            shutdown,
            backoff: BackoffConfig::default(),
        }
    }

    /// Override the delays used after transport errors and unhandled messages
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Get a shutdown signal sender
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Run on a background task. The shutdown receiver is registered before
    /// the task starts, so a signal sent right after `spawn` is not missed.
    pub fn spawn<S>(self: &Arc<Self>, source: S) -> JoinHandle<SubscriberStats>
    where
        S: MessageSource + 'static,
    {
        let shutdown_rx = self.shutdown.subscribe();
        let subscriber = Arc::clone(self);
        tokio::spawn(async move { subscriber.consume(source, shutdown_rx).await })
    }

    /// Run on the current task until shutdown or until the source is exhausted
    pub async fn run<S: MessageSource>(&self, source: S) -> SubscriberStats {
        let shutdown_rx = self.shutdown.subscribe();
        self.consume(source, shutdown_rx).await
    }

    async fn consume<S: MessageSource>(
        &self,
        mut source: S,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SubscriberStats {
        let mut backoff = ExponentialBackoff::new(self.backoff.clone());
        let mut stats = SubscriberStats::default();

        tracing::info!(source = %source.name(), "Starting event subscriber");

        loop {
            // Idle
            let received = tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
                received = source.receive() => received,
            };

            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tracing::info!("Message source closed");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Failed to receive message, retrying"
                    );
                    if wait_or_shutdown(delay, &mut shutdown_rx).await {
                        break;
                    }
                    continue;
                }
            };

            // Handling
            let disposition = self.dispatcher.handle(&delivery.envelope).await;
            match disposition {
                Disposition::Handled => stats.handled += 1,
                Disposition::NotHandled => stats.not_handled += 1,
            }

            if let Err(e) = source.settle(&delivery, disposition).await {
                tracing::warn!(error = %e, id = %delivery.id, "Failed to settle message");
            }

            if disposition.is_handled() {
                backoff.reset();
            } else if wait_or_shutdown(backoff.next_delay(), &mut shutdown_rx).await {
                break;
            }
        }

        tracing::info!(
            handled = stats.handled,
            not_handled = stats.not_handled,
            "Event subscriber stopped"
        );
        stats
    }
}

/// Sleep for `delay`; returns true if shutdown was signalled meanwhile
async fn wait_or_shutdown(delay: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventNormalizer;
    use crate::messaging::channel::channel_source;
    use crate::messaging::envelope::Envelope;
    use crate::storage::MemoryEventStore;
    use crate::template::TemplateStore;

    fn subscriber(store: Arc<MemoryEventStore>) -> Arc<EventSubscriber> {
        let normalizer = EventNormalizer::new(Arc::new(TemplateStore::default()));
        let dispatcher = Arc::new(MessageDispatcher::new(normalizer, store));
        Arc::new(EventSubscriber::new(dispatcher).with_backoff(BackoffConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }))
    }

    fn inline_event(title: &str) -> Envelope {
        let entity = format!(
            r#"{{"Username":"ann","Title":"{}","Message":"m","Level":"WARN"}}"#,
            title
        );
        Envelope::new("event", "create", entity)
    }

    #[tokio::test]
    async fn test_handles_messages_in_order_until_source_closes() {
        let store = Arc::new(MemoryEventStore::new());
        let subscriber = subscriber(store.clone());
        let (mut publisher, source) = channel_source(8);

        for title in ["one", "two", "three"] {
            publisher.publish(inline_event(title)).await.unwrap();
        }
        publisher.publish(Envelope::new("event", "create", "garbage")).await.unwrap();
        publisher.close();

        let stats = subscriber.spawn(source).await.unwrap();

        assert_eq!(stats, SubscriberStats { handled: 4, not_handled: 0 });
        let titles: Vec<String> = store.events().await.into_iter().map(|e| e.event.title).collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_storage_outage_reported_as_not_handled() {
        let store = Arc::new(MemoryEventStore::new());
        store.set_available(false);
        let subscriber = subscriber(store.clone());
        let (mut publisher, source) = channel_source(2);

        publisher.publish(inline_event("lost")).await.unwrap();
        publisher.close();

        let stats = subscriber.spawn(source).await.unwrap();

        assert_eq!(stats, SubscriberStats { handled: 0, not_handled: 1 });
        let settlement = publisher.next_settlement().await.unwrap();
        assert_eq!(settlement.disposition, Disposition::NotHandled);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_subscriber() {
        let store = Arc::new(MemoryEventStore::new());
        let subscriber = subscriber(store);
        let (mut publisher, source) = channel_source(2);

        let handle = subscriber.spawn(source);

        publisher.publish(inline_event("one")).await.unwrap();
        let settlement = publisher.next_settlement().await.unwrap();
        assert_eq!(settlement.disposition, Disposition::Handled);

        subscriber.shutdown_signal().send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.handled, 1);
    }
}
