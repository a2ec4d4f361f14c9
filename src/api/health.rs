//! Health check endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub templates: TemplateHealthResponse,
    pub storage: StorageHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct TemplateHealthResponse {
    pub loaded: usize,
}

#[derive(Debug, Serialize)]
pub struct StorageHealthResponse {
    pub backend: String,
    pub healthy: bool,
}

/// GET /health - 200 when storage accepts writes, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage_healthy = state.store.is_healthy().await;
    let (status, label) = if storage_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let response = HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        templates: TemplateHealthResponse {
            loaded: state.templates.len(),
        },
        storage: StorageHealthResponse {
            backend: state.store.backend_type().to_string(),
            healthy: storage_healthy,
        },
    };

    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Settings;
    use crate::storage::MemoryEventStore;
    use crate::template::{CatalogFormat, TemplateStore};

    fn state(store: Arc<MemoryEventStore>) -> AppState {
        let settings: Settings = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        let templates = TemplateStore::parse(
            r#"{"system": {"boot": {"title": "Boot", "message": "Up", "level": "INFO"}}}"#,
            CatalogFormat::Json,
        )
        .unwrap();
        AppState::new(settings, Arc::new(templates), store)
    }

    #[tokio::test]
    async fn test_health_reports_storage_and_templates() {
        let store = Arc::new(MemoryEventStore::new());

        let (status, Json(body)) = health_check(State(state(store))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.templates.loaded, 1);
        assert_eq!(body.storage.backend, "memory");
    }

    #[tokio::test]
    async fn test_health_degraded_when_storage_down() {
        let store = Arc::new(MemoryEventStore::new());
        store.set_available(false);

        let (status, Json(body)) = health_check(State(state(store))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert!(!body.storage.healthy);
    }
}
