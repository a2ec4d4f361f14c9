use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;

use event_store_service::config::Settings;
use event_store_service::event::EventNormalizer;
use event_store_service::messaging::{EventSubscriber, MessageDispatcher, RedisStreamSource};
use event_store_service::metrics::TEMPLATES_LOADED;
use event_store_service::postgres::PostgresPool;
use event_store_service::server::{create_app, AppState};
use event_store_service::storage::{create_event_store, PostgresEventStore};
use event_store_service::telemetry::init_telemetry;
use event_store_service::template::TemplateStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing
    init_telemetry(&settings.logging)?;
    tracing::info!("Configuration loaded");

    // Templates are essential: refuse to start without them
    let templates = Arc::new(
        TemplateStore::load(&settings.templates.path)
            .with_context(|| format!("Failed to load templates from {}", settings.templates.path))?,
    );
    TEMPLATES_LOADED.set(templates.len() as i64);

    // Connect storage
    let postgres_pool = if settings.storage.backend == "memory" {
        None
    } else {
        let pool = PostgresPool::new(&settings.database).await?;
        PostgresEventStore::new(pool.pool().clone())
            .ensure_schema()
            .await?;
        Some(pool)
    };
    let store = create_event_store(&settings.storage, postgres_pool.as_ref());

    // The catalog is fully loaded before the subscriber can see a message
    let normalizer = EventNormalizer::new(templates.clone());
    let dispatcher = Arc::new(MessageDispatcher::new(normalizer, store.clone()));
    let subscriber = Arc::new(EventSubscriber::new(dispatcher));
    let shutdown_signal = subscriber.shutdown_signal();

    // Start the stream subscriber in background
    tracing::info!("Starting message listeners...");
    let source = RedisStreamSource::new(settings.redis.clone());
    let subscriber_handle = subscriber.spawn(source);

    // Create Axum app
    let state = AppState::new(settings.clone(), templates, store);
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_signal))
        .await?;

    // Wait for the subscriber to finish its current message
    tracing::info!("Waiting for event subscriber to finish...");
    match subscriber_handle.await {
        Ok(stats) => tracing::info!(
            handled = stats.handled,
            not_handled = stats.not_handled,
            "Event subscriber finished"
        ),
        Err(e) => tracing::error!(error = %e, "Event subscriber task failed"),
    }

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Send shutdown signal to the event subscriber
    let _ = shutdown_tx.send(());
}
