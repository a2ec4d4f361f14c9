//! Event storage.
//!
//! The storage layer uses a backend abstraction:
//!
//! - `PostgresEventStore`: persistent storage, one transaction per event (default)
//! - `MemoryEventStore`: in-memory storage for local runs and tests
//!
//! Use `create_event_store()` to create the appropriate backend from configuration.

pub mod backend;
mod factory;
pub mod memory_backend;
pub mod postgres_backend;

pub use backend::{EventStore, StoreError, StoredEvent};
pub use factory::create_event_store;
pub use memory_backend::MemoryEventStore;
pub use postgres_backend::PostgresEventStore;
