//! PostgreSQL-based event store.
//!
//! Each event is written inside its own transaction. Parameters are kept as
//! the raw JSON bytes produced by the normalizer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::event::{EventLevel, NormalizedEvent};

use super::backend::{EventStore, StoreError, StoredEvent};

const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id          BIGSERIAL PRIMARY KEY,
    username    TEXT         NOT NULL,
    event_date  TIMESTAMPTZ  NOT NULL,
    level       SMALLINT     NOT NULL,
    title       VARCHAR(64)  NOT NULL,
    message     VARCHAR(512) NOT NULL,
    parameters  BYTEA        NOT NULL,
    created_at  TIMESTAMPTZ  NOT NULL DEFAULT NOW()
)
"#;

const CREATE_EVENTS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_events_username_date ON events (username, event_date DESC)";

type EventRow = (i64, String, DateTime<Utc>, i16, String, String, Vec<u8>, DateTime<Utc>);

/// PostgreSQL-based event store.
///
/// Table structure:
/// - `events` - one row per normalized event
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `events` table and its index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_EVENTS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_EVENTS_INDEX).execute(&self.pool).await?;

        tracing::debug!("Event store schema ready");
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn add_event(&self, event: &NormalizedEvent) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO events (username, event_date, level, title, message, parameters)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&event.username)
        .bind(event.event_date)
        .bind(event.level.as_i16())
        .bind(&event.title)
        .bind(&event.message)
        .bind(event.parameters.as_slice())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::trace!(event_id = id, "Event stored in PostgreSQL");

        Ok(id)
    }

    async fn get_event(&self, id: i64) -> Result<Option<StoredEvent>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"
            SELECT id, username, event_date, level, title, message, parameters, created_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(id, username, event_date, level, title, message, parameters, created_at)| {
                StoredEvent {
                    id,
                    created_at,
                    event: NormalizedEvent {
                        username,
                        event_date,
                        level: EventLevel::from_i64(level.into()),
                        title,
                        message,
                        parameters,
                    },
                }
            },
        ))
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
