//! PostgreSQL persistence module.
//!
//! Provides connection pooling for the PostgreSQL event store.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
