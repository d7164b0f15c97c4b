use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{DiskTools, EventSink};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub tools: Arc<dyn DiskTools>,
    pub events: Arc<dyn EventSink>,
}

impl AppContext {
    pub fn new(config: AppConfig, tools: Arc<dyn DiskTools>, events: Arc<dyn EventSink>) -> Self {
        Self {
            config: Arc::new(config),
            tools,
            events,
        }
    }
}
