//! Building blocks for module authors.
//!
//! [`ModuleBase`] holds the state most modules need (metadata, merged config, a
//! module-local service map). [`FnModule`] assembles a module from closures.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::context::{ConfigMap, ModuleCtx};
use crate::contracts::Module;
use crate::metadata::ModuleMetadata;

pub struct ModuleBase {
    metadata: ModuleMetadata,
    config: RwLock<ConfigMap>,
    services: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for ModuleBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBase")
            .field("name", &self.metadata.name)
            .field("version", &self.metadata.version)
            .field("services", &self.service_names())
            .finish()
    }
}

impl ModuleBase {
    pub fn new(metadata: ModuleMetadata) -> Self {
        Self {
            metadata,
            config: RwLock::new(ConfigMap::new()),
            services: DashMap::new(),
        }
    }

    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }

    /// Shallow-merge `config` into the stored config.
    pub fn set_config(&self, config: &ConfigMap) {
        let mut current = self.config.write();
        for (k, v) in config {
            current.insert(k.clone(), v.clone());
        }
    }

    pub fn config(&self) -> ConfigMap {
        self.config.read().clone()
    }

    /// Keep a module-local service handle (not visible through the shared registry).
    pub fn register_service<T>(&self, name: impl Into<String>, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        self.services.insert(name.into(), service);
    }

    pub fn get_service<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let entry = self.services.get(name)?;
        entry.value().clone().downcast::<T>().ok()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

type InitFn = Box<dyn Fn(ModuleCtx) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type PhaseFn = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Module assembled from optional per-phase closures. Missing phases succeed.
pub struct FnModule {
    base: ModuleBase,
    on_initialize: Option<InitFn>,
    on_start: Option<PhaseFn>,
    on_stop: Option<PhaseFn>,
    on_destroy: Option<PhaseFn>,
}

impl FnModule {
    pub fn base(&self) -> &ModuleBase {
        &self.base
    }
}

/// Start building a closure-backed module.
pub fn module_fn(metadata: ModuleMetadata) -> FnModuleBuilder {
    FnModuleBuilder {
        module: FnModule {
            base: ModuleBase::new(metadata),
            on_initialize: None,
            on_start: None,
            on_stop: None,
            on_destroy: None,
        },
    }
}

pub struct FnModuleBuilder {
    module: FnModule,
}

fn phase<F, Fut>(f: F) -> PhaseFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move || -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f()) })
}

impl FnModuleBuilder {
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ModuleCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.module.on_initialize = Some(Box::new(
            move |ctx: ModuleCtx| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(f(ctx)) },
        ));
        self
    }

    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.module.on_start = Some(phase(f));
        self
    }

    pub fn on_stop<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.module.on_stop = Some(phase(f));
        self
    }

    pub fn on_destroy<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.module.on_destroy = Some(phase(f));
        self
    }

    pub fn build(self) -> FnModule {
        self.module
    }
}

async fn run_phase(f: &Option<PhaseFn>) -> anyhow::Result<()> {
    match f {
        Some(f) => f().await,
        None => Ok(()),
    }
}

#[async_trait]
impl Module for FnModule {
    fn metadata(&self) -> &ModuleMetadata {
        self.base.metadata()
    }

    async fn initialize(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        match &self.on_initialize {
            Some(f) => f(ctx.clone()).await,
            None => Ok(()),
        }
    }

    async fn start(&self) -> anyhow::Result<()> {
        run_phase(&self.on_start).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        run_phase(&self.on_stop).await
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        run_phase(&self.on_destroy).await
    }

    fn set_config(&self, config: &ConfigMap) {
        self.base.set_config(config);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
