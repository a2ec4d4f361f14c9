//! In-memory event store.
//!
//! Events are kept in memory and lost on restart. Used for local runs and
//! tests; `set_available(false)` simulates a storage outage.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::event::NormalizedEvent;

use super::backend::{EventStore, StoreError, StoredEvent};

/// In-memory event store.
pub struct MemoryEventStore {
    events: RwLock<Vec<StoredEvent>>,
    available: AtomicBool,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of all stored events, oldest first
    pub async fn events(&self) -> Vec<StoredEvent> {
        self.events.read().await.clone()
    }

    /// Number of stored events
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn add_event(&self, event: &NormalizedEvent) -> Result<i64, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }

        let mut events = self.events.write().await;
        let id = events.len() as i64 + 1;
        events.push(StoredEvent {
            id,
            created_at: Utc::now(),
            event: event.clone(),
        });

        tracing::trace!(event_id = id, "Event stored in memory");

        Ok(id)
    }

    async fn get_event(&self, id: i64) -> Result<Option<StoredEvent>, StoreError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .find(|stored| stored.id == id)
            .cloned())
    }

    async fn is_healthy(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
