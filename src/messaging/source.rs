//! Transport abstraction for inbound messages.

use async_trait::async_trait;
use thiserror::Error;

use super::envelope::Envelope;

/// Errors raised by a message source.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The source can no longer deliver or settle messages
    #[error("Message source closed")]
    Closed,
}

/// Outcome of handling one message, reported back to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fully handled or deliberately dropped; must not be redelivered
    Handled,
    /// Not handled; the transport may redeliver
    NotHandled,
}

impl Disposition {
    pub fn is_handled(self) -> bool {
        self == Disposition::Handled
    }
}

/// A message received from a source, with the transport's identifier
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub envelope: Envelope,
}

/// Source of bus messages for one subscription.
///
/// Every delivery returned by `receive` is settled exactly once before the
/// next call to `receive`.
#[async_trait]
pub trait MessageSource: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Wait for the next message; `None` means the source is exhausted.
    async fn receive(&mut self) -> Result<Option<Delivery>, TransportError>;

    /// Report the outcome for a delivery.
    async fn settle(
        &mut self,
        delivery: &Delivery,
        disposition: Disposition,
    ) -> Result<(), TransportError>;
}
