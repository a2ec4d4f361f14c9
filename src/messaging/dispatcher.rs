//! Handles one bus message: filter, normalize, persist.

use std::sync::Arc;

use crate::event::{EventNormalizer, IncomingEvent};
use crate::metrics::{
    EVENTS_FAILED_TOTAL, EVENTS_STORED_TOTAL, MESSAGES_DROPPED_TOTAL, MESSAGES_RECEIVED_TOTAL,
};
use crate::storage::EventStore;

use super::envelope::{Envelope, SOURCE_EVENT, TYPE_CREATE};
use super::source::Disposition;

/// Routes event messages through the normalizer into the event store.
pub struct MessageDispatcher {
    normalizer: EventNormalizer,
    store: Arc<dyn EventStore>,
}

impl MessageDispatcher {
    pub fn new(normalizer: EventNormalizer, store: Arc<dyn EventStore>) -> Self {
        Self { normalizer, store }
    }

    /// Handle one message and tell the transport whether it may be redelivered.
    ///
    /// Malformed payloads and unknown discriminators are dropped as handled,
    /// since redelivering them cannot succeed.
    #[tracing::instrument(
        name = "handle_event_message",
        skip(self, envelope),
        fields(source = %envelope.source, message_type = %envelope.message_type)
    )]
    pub async fn handle(&self, envelope: &Envelope) -> Disposition {
        MESSAGES_RECEIVED_TOTAL.inc();
        tracing::info!("New event message received");

        if envelope.source == SOURCE_EVENT {
            let event: IncomingEvent = match serde_json::from_slice(&envelope.entity) {
                Ok(event) => event,
                Err(e) => {
                    MESSAGES_DROPPED_TOTAL.with_label_values(&["malformed"]).inc();
                    tracing::error!(
                        error = %e,
                        entity = %String::from_utf8_lossy(&envelope.entity),
                        "Dropping badly formatted message for event"
                    );
                    return Disposition::Handled;
                }
            };

            if envelope.message_type == TYPE_CREATE {
                return self.handle_new_event(event).await;
            }
        }

        MESSAGES_DROPPED_TOTAL.with_label_values(&["unknown_type"]).inc();
        tracing::error!("Dropping message with unknown source/type");
        Disposition::Handled
    }

    async fn handle_new_event(&self, event: IncomingEvent) -> Disposition {
        let normalized = match self.normalizer.normalize(event) {
            Ok(normalized) => normalized,
            Err(e) => {
                EVENTS_FAILED_TOTAL.with_label_values(&["marshal"]).inc();
                tracing::error!(error = %e, "Error marshalling event parameters");
                return Disposition::NotHandled;
            }
        };

        match self.store.add_event(&normalized).await {
            Ok(id) => {
                EVENTS_STORED_TOTAL.inc();
                tracing::info!(
                    event_id = id,
                    username = %normalized.username,
                    level = %normalized.level,
                    title = %normalized.title,
                    "Event stored"
                );
                Disposition::Handled
            }
            Err(e) => {
                EVENTS_FAILED_TOTAL.with_label_values(&["storage"]).inc();
                tracing::error!(error = %e, "Error adding event to the store");
                Disposition::NotHandled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventLevel, MISSING_CODE_MESSAGE};
    use crate::storage::MemoryEventStore;
    use crate::template::TemplateStore;

    fn dispatcher() -> (MessageDispatcher, Arc<MemoryEventStore>) {
        let store = Arc::new(MemoryEventStore::new());
        let normalizer = EventNormalizer::new(Arc::new(TemplateStore::default()));
        (MessageDispatcher::new(normalizer, store.clone()), store)
    }

    #[tokio::test]
    async fn test_malformed_payload_dropped() {
        let (dispatcher, store) = dispatcher();

        let disposition = dispatcher
            .handle(&Envelope::new("event", "create", "not json"))
            .await;

        assert_eq!(disposition, Disposition::Handled);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_source_or_type_dropped() {
        let (dispatcher, store) = dispatcher();
        let entity = r#"{"Title":"Hi","Message":"There","Level":"INFO"}"#;

        for envelope in [
            Envelope::new("event", "update", entity),
            Envelope::new("portfolio", "create", entity),
            Envelope::new("", "", ""),
        ] {
            assert_eq!(dispatcher.handle(&envelope).await, Disposition::Handled);
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_inline_event_stored() {
        let (dispatcher, store) = dispatcher();
        let entity = r#"{
            "Username": "ann",
            "Title": "Hi",
            "Message": "There",
            "Level": "INFO",
            "EventDate": "2025-03-01T10:00:00Z"
        }"#;

        let disposition = dispatcher
            .handle(&Envelope::new("event", "create", entity))
            .await;

        assert_eq!(disposition, Disposition::Handled);
        let events = store.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.title, "Hi");
        assert_eq!(events[0].event.message, "There");
        assert_eq!(events[0].event.level, EventLevel::Info);
    }

    #[tokio::test]
    async fn test_unknown_code_stored_with_placeholder() {
        let (dispatcher, store) = dispatcher();
        let entity = r#"{"Username":"ann","Code":"no.such","Level":"INFO"}"#;

        dispatcher
            .handle(&Envelope::new("event", "create", entity))
            .await;

        let events = store.events().await;
        assert_eq!(events[0].event.title, "?no.such?");
        assert_eq!(events[0].event.message, MISSING_CODE_MESSAGE);
        assert_eq!(events[0].event.level, EventLevel::Error);
    }

    #[tokio::test]
    async fn test_storage_failure_not_handled() {
        let (dispatcher, store) = dispatcher();
        store.set_available(false);

        let disposition = dispatcher
            .handle(&Envelope::new("event", "create", r#"{"Title":"Hi"}"#))
            .await;

        assert_eq!(disposition, Disposition::NotHandled);
        assert!(store.is_empty().await);
    }
}
