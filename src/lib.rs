// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod telemetry;

// Domain layer (business logic)
pub mod event;
pub mod storage;
pub mod template;

// Application layer
pub mod api;
pub mod messaging;
pub mod server;
