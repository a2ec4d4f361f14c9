//! Bus message envelope

use crate::event::IncomingEvent;

/// Source discriminator of event messages
pub const SOURCE_EVENT: &str = "event";

/// Type discriminator of event creation messages
pub const TYPE_CREATE: &str = "create";

/// Message as delivered by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Producing subsystem (e.g. "event")
    pub source: String,
    /// Operation (e.g. "create")
    pub message_type: String,
    /// JSON-encoded payload
    pub entity: Vec<u8>,
}

impl Envelope {
    pub fn new(
        source: impl Into<String>,
        message_type: impl Into<String>,
        entity: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source: source.into(),
            message_type: message_type.into(),
            entity: entity.into(),
        }
    }

    /// Build an `event/create` envelope carrying `event`
    pub fn create_event(event: &IncomingEvent) -> Result<Self, serde_json::Error> {
        Ok(Self::new(SOURCE_EVENT, TYPE_CREATE, serde_json::to_vec(event)?))
    }

    pub fn is_event_create(&self) -> bool {
        self.source == SOURCE_EVENT && self.message_type == TYPE_CREATE
    }
}
