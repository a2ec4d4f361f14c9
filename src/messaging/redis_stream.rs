//! Redis Streams message source.
//!
//! Reads one stream through a consumer group. Each entry carries the envelope
//! as the fields `source`, `type` and `entity`. Handled entries are `XACK`ed;
//! unhandled entries stay pending and are retried in passes over this
//! consumer's pending list, interleaved with reads of new entries (`>`).
//!
//! Entries stuck in another consumer's pending list (a crashed or restarted
//! instance) are taken over with `XAUTOCLAIM` once idle for `claim_idle_ms`.
//! An entry still unhandled after `max_deliveries` deliveries is copied to the
//! dead-letter stream and acknowledged, so it cannot stall the group.

use std::collections::VecDeque;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, RedisError, RedisResult};
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::metrics::MESSAGES_DROPPED_TOTAL;

use super::envelope::Envelope;
use super::source::{Delivery, Disposition, MessageSource, TransportError};

const FIELD_SOURCE: &str = "source";
const FIELD_TYPE: &str = "type";
const FIELD_ENTITY: &str = "entity";

/// Start of a pending-list or `XAUTOCLAIM` scan; also the end-of-scan cursor
const SCAN_START: &str = "0-0";

/// Next read the source performs
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadStep {
    /// Take over idle entries from any consumer, continuing from this cursor
    Reclaim(String),
    /// Re-read this consumer's pending entries with ids after this one
    Pending(String),
    /// Block for entries never delivered to the group
    New,
}

/// Decides which read comes next.
///
/// A fresh connection first sweeps idle entries, then this consumer's own
/// backlog, then switches to new entries. A failed delivery schedules another
/// pending pass; a pass never restarts itself, so new entries are read between
/// two retries of the same entry.
#[derive(Debug)]
struct ReadCursor {
    claim_from: Option<String>,
    pending_from: Option<String>,
    retry_pending: bool,
}

impl ReadCursor {
    fn new() -> Self {
        let mut cursor = Self {
            claim_from: None,
            pending_from: None,
            retry_pending: false,
        };
        cursor.restart();
        cursor
    }

    fn restart(&mut self) {
        self.claim_from = Some(SCAN_START.to_string());
        self.pending_from = Some(SCAN_START.to_string());
        self.retry_pending = false;
    }

    fn next_step(&self) -> ReadStep {
        if let Some(from) = &self.claim_from {
            ReadStep::Reclaim(from.clone())
        } else if let Some(from) = &self.pending_from {
            ReadStep::Pending(from.clone())
        } else {
            ReadStep::New
        }
    }

    fn reclaimed(&mut self, next_cursor: &str) {
        self.claim_from = (next_cursor != SCAN_START).then(|| next_cursor.to_string());
    }

    /// `last_id` is the last entry of the batch, `None` once the pass is done
    fn pending_read(&mut self, last_id: Option<&str>) {
        self.pending_from = last_id.map(str::to_string);
    }

    fn new_read(&mut self, count: usize) {
        if self.retry_pending {
            self.pending_from = Some(SCAN_START.to_string());
            self.retry_pending = false;
        }
        // Idle stream: look for entries abandoned by other consumers
        if count == 0 {
            self.claim_from = Some(SCAN_START.to_string());
        }
    }

    fn retry_later(&mut self) {
        if self.pending_from.is_none() {
            self.pending_from = Some(SCAN_START.to_string());
        } else {
            self.retry_pending = true;
        }
    }
}

/// Whether an entry delivered `deliveries` times has used up its attempts
fn deliveries_exhausted(deliveries: usize, max_deliveries: usize) -> bool {
    max_deliveries > 0 && deliveries >= max_deliveries
}

/// Redis Streams consumer-group source
pub struct RedisStreamSource {
    config: RedisConfig,
    consumer: String,
    dead_letter_stream: String,
    connection: Option<MultiplexedConnection>,
    buffer: VecDeque<Delivery>,
    cursor: ReadCursor,
}

impl RedisStreamSource {
    pub fn new(config: RedisConfig) -> Self {
        let consumer = config
            .consumer
            .clone()
            .unwrap_or_else(|| format!("event-store-{}", Uuid::new_v4()));
        let dead_letter_stream = config.dead_letter_stream();

        Self {
            config,
            consumer,
            dead_letter_stream,
            connection: None,
            buffer: VecDeque::new(),
            cursor: ReadCursor::new(),
        }
    }

    /// Consumer name used inside the group
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Get the live connection, connecting and creating the group if needed
    async fn connection(&mut self) -> Result<MultiplexedConnection, TransportError> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }

        let client = redis::Client::open(self.config.url.as_str())?;
        let mut connection = client.get_multiplexed_async_connection().await?;

        let created: RedisResult<()> = connection
            .xgroup_create_mkstream(&self.config.stream, &self.config.group, "$")
            .await;
        match created {
            Ok(()) => tracing::info!(
                stream = %self.config.stream,
                group = %self.config.group,
                "Created consumer group"
            ),
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            stream = %self.config.stream,
            group = %self.config.group,
            consumer = %self.consumer,
            "Redis stream subscription established"
        );

        // Entries delivered before the connection dropped are still pending
        self.cursor.restart();
        self.connection = Some(connection.clone());
        Ok(connection)
    }

    /// Forget the connection so the next call reconnects
    fn disconnect(&mut self, error: RedisError) -> TransportError {
        self.connection = None;
        error.into()
    }

    async fn read(
        &mut self,
        connection: &mut MultiplexedConnection,
        start_id: &str,
        block: bool,
    ) -> Result<Vec<StreamId>, TransportError> {
        let mut options = StreamReadOptions::default()
            .group(&self.config.group, &self.consumer)
            .count(self.config.batch_size);
        if block {
            options = options.block(self.config.block_ms);
        }

        let reply: RedisResult<Option<StreamReadReply>> = connection
            .xread_options(&[&self.config.stream], &[start_id], &options)
            .await;

        match reply {
            Ok(reply) => Ok(reply
                .map(|r| r.keys.into_iter().flat_map(|key| key.ids).collect())
                .unwrap_or_default()),
            Err(e) => Err(self.disconnect(e)),
        }
    }

    async fn reclaim(
        &mut self,
        connection: &mut MultiplexedConnection,
        from: &str,
    ) -> Result<(String, Vec<StreamId>), TransportError> {
        let options = StreamAutoClaimOptions::default().count(self.config.batch_size);
        let reply: RedisResult<StreamAutoClaimReply> = connection
            .xautoclaim_options(
                &self.config.stream,
                &self.config.group,
                &self.consumer,
                self.config.claim_idle_ms,
                from,
                options,
            )
            .await;

        match reply {
            Ok(reply) => {
                if !reply.claimed.is_empty() {
                    tracing::warn!(
                        count = reply.claimed.len(),
                        "Reclaimed idle entries from other consumers"
                    );
                }
                Ok((reply.next_stream_id, reply.claimed))
            }
            Err(e) => Err(self.disconnect(e)),
        }
    }

    /// How many times the group has delivered `id`
    async fn delivery_count(
        &mut self,
        connection: &mut MultiplexedConnection,
        id: &str,
    ) -> Result<usize, TransportError> {
        let reply: RedisResult<StreamPendingCountReply> = connection
            .xpending_count(&self.config.stream, &self.config.group, id, id, 1)
            .await;

        match reply {
            Ok(reply) => Ok(reply
                .ids
                .first()
                .map(|pending| pending.times_delivered)
                .unwrap_or_default()),
            Err(e) => Err(self.disconnect(e)),
        }
    }

    /// Copy the entry to the dead-letter stream and acknowledge it in one transaction
    async fn dead_letter(
        &mut self,
        connection: &mut MultiplexedConnection,
        delivery: &Delivery,
        deliveries: usize,
    ) -> Result<(), TransportError> {
        let deliveries_text = deliveries.to_string();
        let envelope = &delivery.envelope;
        let fields: [(&str, &[u8]); 5] = [
            (FIELD_SOURCE, envelope.source.as_bytes()),
            (FIELD_TYPE, envelope.message_type.as_bytes()),
            (FIELD_ENTITY, envelope.entity.as_slice()),
            ("original_id", delivery.id.as_bytes()),
            ("deliveries", deliveries_text.as_bytes()),
        ];

        let moved: RedisResult<()> = redis::pipe()
            .atomic()
            .xadd(&self.dead_letter_stream, "*", &fields)
            .ignore()
            .xack(&self.config.stream, &self.config.group, &[&delivery.id])
            .ignore()
            .query_async(connection)
            .await;

        match moved {
            Ok(()) => {
                MESSAGES_DROPPED_TOTAL.with_label_values(&["dead_letter"]).inc();
                tracing::error!(
                    id = %delivery.id,
                    deliveries,
                    dead_letter_stream = %self.dead_letter_stream,
                    "Giving up on stream entry, moved to dead-letter stream"
                );
                Ok(())
            }
            Err(e) => Err(self.disconnect(e)),
        }
    }
}

/// Missing fields become empty values; the dispatcher drops such messages.
fn to_delivery(entry: StreamId) -> Delivery {
    let text = |field: &str| entry.get::<String>(field).unwrap_or_default();

    Delivery {
        envelope: Envelope {
            source: text(FIELD_SOURCE),
            message_type: text(FIELD_TYPE),
            entity: entry.get::<Vec<u8>>(FIELD_ENTITY).unwrap_or_default(),
        },
        id: entry.id,
    }
}

#[async_trait]
impl MessageSource for RedisStreamSource {
    fn name(&self) -> &str {
        &self.config.stream
    }

    async fn receive(&mut self) -> Result<Option<Delivery>, TransportError> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(Some(delivery));
            }

            let mut connection = self.connection().await?;
            let step = self.cursor.next_step();
            let entries = match &step {
                ReadStep::Reclaim(from) => {
                    let (next, entries) = self.reclaim(&mut connection, from).await?;
                    self.cursor.reclaimed(&next);
                    entries
                }
                ReadStep::Pending(from) => {
                    let entries = self.read(&mut connection, from, false).await?;
                    self.cursor.pending_read(entries.last().map(|e| e.id.as_str()));
                    entries
                }
                ReadStep::New => {
                    let entries = self.read(&mut connection, ">", true).await?;
                    self.cursor.new_read(entries.len());
                    entries
                }
            };

            if !entries.is_empty() {
                tracing::debug!(
                    count = entries.len(),
                    step = ?step,
                    "Read entries from Redis stream"
                );
                self.buffer.extend(entries.into_iter().map(to_delivery));
            }
        }
    }

    async fn settle(
        &mut self,
        delivery: &Delivery,
        disposition: Disposition,
    ) -> Result<(), TransportError> {
        let mut connection = self.connection().await?;

        match disposition {
            Disposition::Handled => {
                let acked: RedisResult<i64> = connection
                    .xack(&self.config.stream, &self.config.group, &[&delivery.id])
                    .await;
                if let Err(e) = acked {
                    return Err(self.disconnect(e));
                }
            }
            Disposition::NotHandled => {
                self.cursor.retry_later();

                let deliveries = self.delivery_count(&mut connection, &delivery.id).await?;
                if deliveries_exhausted(deliveries, self.config.max_deliveries) {
                    self.dead_letter(&mut connection, delivery, deliveries).await?;
                } else {
                    tracing::debug!(
                        id = %delivery.id,
                        deliveries,
                        "Leaving stream entry pending for redelivery"
                    );
                }
            }
        }
        Ok(())
    }
}
