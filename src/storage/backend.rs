//! Backend trait for event storage.
//!
//! This module defines the abstraction layer for event stores, allowing the
//! PostgreSQL store and the in-memory store to be used interchangeably.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::NormalizedEvent;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Store is temporarily unavailable
    #[error("Event store unavailable: {0}")]
    Unavailable(String),
}

/// An event as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Storage-assigned identifier
    pub id: i64,

    /// When the row was written
    pub created_at: DateTime<Utc>,

    /// The stored record
    pub event: NormalizedEvent,
}

/// Backend trait for event storage.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// between the subscriber task and the HTTP handlers.
///
/// # Error Handling
///
/// Every failure of `add_event` is treated by the caller as transient: the
/// message is left unacknowledged so the bus can redeliver it.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> &'static str;

    /// Persist one event atomically and return its identifier.
    async fn add_event(&self, event: &NormalizedEvent) -> Result<i64, StoreError>;

    /// Read an event back by identifier.
    async fn get_event(&self, id: i64) -> Result<Option<StoredEvent>, StoreError>;

    /// Check whether the store can currently accept writes.
    async fn is_healthy(&self) -> bool;
}
