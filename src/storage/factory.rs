//! Event store factory

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::postgres::PostgresPool;

use super::backend::EventStore;
use super::memory_backend::MemoryEventStore;
use super::postgres_backend::PostgresEventStore;

/// Create an event store based on configuration.
///
/// - `"postgres"` (default): `PostgresEventStore` if a pool is provided
/// - `"memory"`: `MemoryEventStore`
///
/// # Example
///
/// ```rust,ignore
/// let store = create_event_store(&settings.storage, Some(&pg_pool));
/// ```
pub fn create_event_store(
    settings: &StorageConfig,
    postgres_pool: Option<&PostgresPool>,
) -> Arc<dyn EventStore> {
    match settings.backend.as_str() {
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory event store");
            Arc::new(MemoryEventStore::new())
        }
        backend => {
            if backend != "postgres" {
                tracing::warn!(backend = %backend, "Unknown storage backend, using PostgreSQL");
            }

            if let Some(pool) = postgres_pool {
                tracing::info!(
                    backend = "postgres",
                    database = %pool.database_url_masked(),
                    "Creating PostgreSQL event store"
                );
                Arc::new(PostgresEventStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryEventStore::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_selected() {
        let settings = StorageConfig {
            backend: "memory".to_string(),
        };

        assert_eq!(create_event_store(&settings, None).backend_type(), "memory");
    }

    #[test]
    fn test_postgres_without_pool_falls_back() {
        let settings = StorageConfig::default();

        assert_eq!(create_event_store(&settings, None).backend_type(), "memory");
    }
}
