use std::sync::Arc;

use ptpilot_core::{Config, DirectoryStore, Engine, LifecycleStore, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<Engine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        Self { config, engine }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &Engine {
        self.engine.as_ref()
    }

    pub fn directory(&self) -> &dyn DirectoryStore {
        self.engine.context().directory.as_ref()
    }

    pub fn lifecycle(&self) -> &dyn LifecycleStore {
        self.engine.context().lifecycle.as_ref()
    }
}
