use axum::{routing::get, Router};

use crate::server::AppState;

use super::{health, metrics};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
}
