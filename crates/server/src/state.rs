use qbdeck_core::{Config, SanitizedConfig, SyncEngine};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<SyncEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<SyncEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }
}
