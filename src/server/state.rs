use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::storage::EventStore;
use crate::template::TemplateStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub templates: Arc<TemplateStore>,
    pub store: Arc<dyn EventStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        templates: Arc<TemplateStore>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            templates,
            store,
            started_at: Instant::now(),
        }
    }
}
