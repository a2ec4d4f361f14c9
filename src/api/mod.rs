mod health;
mod metrics;
mod routes;

pub use health::{health_check, HealthResponse, StorageHealthResponse, TemplateHealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
