use std::sync::Arc;

use argos_modkit::ConfigProvider;

use crate::config::AppConfig;

/// [`ConfigProvider`] backed by the loaded [`AppConfig`].
#[derive(Debug, Clone)]
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.modules.get(module_name).map(|m| &m.config)
    }

    fn module_enabled(&self, module_name: &str) -> Option<bool> {
        self.0.modules.get(module_name).and_then(|m| m.enabled)
    }
}
