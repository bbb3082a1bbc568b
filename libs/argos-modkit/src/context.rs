use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::hooks::HookBus;
use crate::services::ServiceRegistry;

/// Free-form per-module configuration.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Source of per-module configuration supplied by the embedding process.
pub trait ConfigProvider: Send + Sync {
    /// Raw config section for a module, if any.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;

    /// Enabled override for a module; `None` keeps the metadata default.
    fn module_enabled(&self, _module_name: &str) -> Option<bool> {
        None
    }
}

/// Context handed to [`crate::Module::initialize`].
///
/// Carries the module's own config plus the shared registry and hook bus, so modules
/// wire services and hooks without reaching for globals.
#[derive(Clone)]
pub struct ModuleCtx {
    module_name: String,
    config: ConfigMap,
    services: Arc<ServiceRegistry>,
    hooks: Arc<HookBus>,
}

impl std::fmt::Debug for ModuleCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCtx")
            .field("module_name", &self.module_name)
            .field("config_keys", &self.config.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleCtx {
    pub fn new(
        module_name: impl Into<String>,
        config: ConfigMap,
        services: Arc<ServiceRegistry>,
        hooks: Arc<HookBus>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            config,
            services,
            hooks,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn config(&self) -> &ConfigMap {
        &self.config
    }

    /// Deserialize the module config into a typed struct.
    pub fn config_as<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let value = serde_json::Value::Object(self.config.clone());
        serde_json::from_value(value).map_err(|e| {
            anyhow::anyhow!("invalid config for module '{}': {}", self.module_name, e)
        })
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn hooks(&self) -> &Arc<HookBus> {
        &self.hooks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct CacheCfg {
        ttl_secs: u64,
        #[serde(default)]
        max_entries: Option<usize>,
    }

    fn ctx_with(config: serde_json::Value) -> ModuleCtx {
        let config = config.as_object().cloned().unwrap_or_default();
        ModuleCtx::new(
            "cache",
            config,
            Arc::new(ServiceRegistry::new()),
            Arc::new(HookBus::new()),
        )
    }

    #[test]
    fn typed_config_roundtrip() {
        let ctx = ctx_with(serde_json::json!({ "ttl_secs": 30 }));
        let cfg: CacheCfg = ctx.config_as().unwrap();
        assert_eq!(
            cfg,
            CacheCfg {
                ttl_secs: 30,
                max_entries: None
            }
        );
    }

    #[test]
    fn typed_config_error_names_module() {
        let ctx = ctx_with(serde_json::json!({ "ttl_secs": "soon" }));
        let err = ctx.config_as::<CacheCfg>().unwrap_err();
        assert!(err.to_string().contains("'cache'"));
    }
}
