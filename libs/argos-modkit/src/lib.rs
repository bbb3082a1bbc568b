//! # Argos ModKit - module orchestration core
//!
//! Embeddable plugin runtime for server processes.
//!
//! ## Features
//!
//! - **Service registry**: named factories with singleton/transient/scoped lifecycles,
//!   recursive dependency resolution and cycle detection
//! - **Hook bus**: priority-ordered, fault-isolated async event handlers
//! - **Module runtime**: dependency-ordered initialize → start ⇄ stop → destroy,
//!   per-module hot reload, pre/post lifecycle hooks
//!
//! ## Basic Module Example
//!
//! ```rust,ignore
//! use argos_modkit::{module_fn, ModuleKind, ModuleMetadata, ModuleRuntime};
//! use std::sync::Arc;
//!
//! let runtime = ModuleRuntime::new();
//! let meta = ModuleMetadata::new("cache", "1.0.0", ModuleKind::Plugin)
//!     .with_provides(["cache"]);
//! let module = module_fn(meta)
//!     .on_initialize(|ctx| async move {
//!         tracing::info!(module = ctx.module_name(), "wiring cache");
//!         Ok(())
//!     })
//!     .build();
//!
//! runtime.register_module(Arc::new(module)).await?;
//! runtime.initialize_all().await?;
//! runtime.start_all().await?;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod base;
pub mod context;
pub mod contracts;
pub mod errors;
pub mod hooks;
pub mod metadata;
pub mod registry;
pub mod runtime;
pub mod services;

pub use base::{module_fn, FnModule, FnModuleBuilder, ModuleBase};
pub use context::{ConfigMap, ConfigProvider, ModuleCtx};
pub use contracts::Module;
pub use errors::{Phase, RuntimeError, ServiceError};
pub use hooks::{events, FnHook, HookBus, HookHandler, HookInfo, HookPayload, SystemPhase};
pub use metadata::{MetadataError, ModuleKind, ModuleMetadata};
pub use registry::{ModuleConfig, ModuleState};
pub use runtime::{
    run, wait_for_shutdown, ModuleInfo, ModuleRuntime, RunOptions, RuntimeStats, ShutdownOptions,
};
pub use services::{
    ServiceDescriptor, ServiceFactory, ServiceInfo, ServiceInstance, ServiceLifecycle,
    ServiceRegistry,
};
