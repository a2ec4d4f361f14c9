//! In-process message source backed by tokio channels.
//!
//! The publisher side feeds envelopes in and observes every settlement, which
//! lets callers wait deterministically for a known number of messages.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::envelope::Envelope;
use super::source::{Delivery, Disposition, MessageSource, TransportError};

/// Settlement reported for one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub delivery_id: String,
    pub disposition: Disposition,
}

/// Receiving half, handed to an `EventSubscriber`
pub struct ChannelSource {
    receiver: mpsc::Receiver<Envelope>,
    settlements: mpsc::UnboundedSender<Settlement>,
    next_id: u64,
}

/// Sending half, kept by the producer
pub struct ChannelPublisher {
    sender: Option<mpsc::Sender<Envelope>>,
    settlements: mpsc::UnboundedReceiver<Settlement>,
}

/// Create a connected publisher/source pair buffering up to `capacity` messages
pub fn channel_source(capacity: usize) -> (ChannelPublisher, ChannelSource) {
    let (sender, receiver) = mpsc::channel(capacity);
    let (settled_tx, settled_rx) = mpsc::unbounded_channel();

    (
        ChannelPublisher {
            sender: Some(sender),
            settlements: settled_rx,
        },
        ChannelSource {
            receiver,
            settlements: settled_tx,
            next_id: 0,
        },
    )
}

impl ChannelPublisher {
    /// Queue an envelope for the source
    pub async fn publish(&self, envelope: Envelope) -> Result<(), TransportError> {
        let sender = self.sender.as_ref().ok_or(TransportError::Closed)?;
        sender
            .send(envelope)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Stop publishing; the source ends once the buffer is drained
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// Wait for the next settlement
    pub async fn next_settlement(&mut self) -> Option<Settlement> {
        self.settlements.recv().await
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    async fn receive(&mut self) -> Result<Option<Delivery>, TransportError> {
        Ok(self.receiver.recv().await.map(|envelope| {
            self.next_id += 1;
            Delivery {
                id: self.next_id.to_string(),
                envelope,
            }
        }))
    }

    async fn settle(
        &mut self,
        delivery: &Delivery,
        disposition: Disposition,
    ) -> Result<(), TransportError> {
        // The publisher may have gone away; settlements are informational here
        let _ = self.settlements.send(Settlement {
            delivery_id: delivery.id.clone(),
            disposition,
        });
        Ok(())
    }
}
