//! Argos runtime runner.
//!
//! Phase order: **config → init → start → system:startup → wait → system:shutdown → stop → destroy**.
//!
//! Shutdown can be driven by OS signals, an external `CancellationToken`,
//! or an arbitrary future.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::context::ConfigProvider;
use crate::hooks::{events, HookPayload, SystemPhase};
use crate::runtime::shutdown;
use crate::runtime::ModuleRuntime;

/// What ends a [`run`].
pub enum ShutdownOptions {
    /// Ctrl+C or SIGTERM.
    Signals,
    /// Cancelled by the caller.
    Token(CancellationToken),
    /// Completes when the runtime should shut down.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl ShutdownOptions {
    /// Token cancelled once the chosen trigger fires. Signal and future triggers
    /// are awaited on a background task.
    fn into_token(self) -> CancellationToken {
        let trigger: Pin<Box<dyn Future<Output = ()> + Send>> = match self {
            ShutdownOptions::Token(token) => {
                tracing::info!("Shutdown driven by caller token");
                return token;
            }
            ShutdownOptions::Signals => Box::pin(async {
                if let Err(e) = shutdown::wait_for_shutdown().await {
                    tracing::warn!(error = %e, "Signal listener failed; waiting on ctrl_c only");
                    let _ = tokio::signal::ctrl_c().await;
                }
                tracing::info!("Shutdown signal received");
            }),
            ShutdownOptions::Future(fut) => fut,
        };

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            trigger.await;
            cancel.cancel();
        });
        token
    }
}

pub struct RunOptions {
    /// Runtime with every module already registered.
    pub runtime: Arc<ModuleRuntime>,
    /// Applied to the registered modules before initialization.
    pub modules_cfg: Option<Arc<dyn ConfigProvider>>,
    pub shutdown: ShutdownOptions,
}

/// Drive the full lifecycle of every registered module until shutdown is requested.
///
/// Failures during init/start abort the run. Failures while stopping or
/// destroying are logged and teardown continues.
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let cancel = opts.shutdown.into_token();

    let runtime = opts.runtime;
    if let Some(cfg) = &opts.modules_cfg {
        runtime.apply_config(cfg.as_ref())?;
    }

    runtime.initialize_all().await?;
    runtime.start_all().await?;

    runtime
        .hooks()
        .execute(
            events::SYSTEM_STARTUP,
            HookPayload::System {
                phase: SystemPhase::Startup,
            },
        )
        .await;
    tracing::info!(modules = runtime.load_order().len(), "Runtime started");

    cancel.cancelled().await;
    tracing::info!("Phase: shutdown");

    runtime
        .hooks()
        .execute(
            events::SYSTEM_SHUTDOWN,
            HookPayload::System {
                phase: SystemPhase::Shutdown,
            },
        )
        .await;

    if let Err(e) = runtime.stop_all().await {
        tracing::warn!(error = %e, "stop phase failed; continuing teardown");
    }
    if let Err(e) = runtime.destroy_all().await {
        tracing::warn!(error = %e, "destroy phase failed");
    }

    tracing::info!("Runtime stopped");
    Ok(())
}
