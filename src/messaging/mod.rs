//! Inbound event messages.
//!
//! # Architecture
//!
//! - `MessageSource`: transport contract (receive, then settle each delivery)
//! - `RedisStreamSource`: Redis Streams consumer group with reclaim and dead-lettering
//! - `ChannelSource`: in-process source fed through tokio channels
//! - `MessageDispatcher`: filters, normalizes and persists one message
//! - `EventSubscriber`: cancellable worker driving a source through the dispatcher

mod backoff;
mod channel;
mod dispatcher;
mod envelope;
mod redis_stream;
mod source;
mod subscriber;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use channel::{channel_source, ChannelPublisher, ChannelSource, Settlement};
pub use dispatcher::MessageDispatcher;
pub use envelope::{Envelope, SOURCE_EVENT, TYPE_CREATE};
pub use redis_stream::RedisStreamSource;
pub use source::{Delivery, Disposition, MessageSource, TransportError};
pub use subscriber::{EventSubscriber, SubscriberStats};
