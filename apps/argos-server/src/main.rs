use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use argos_bootstrap::{AppConfig, AppConfigProvider, CliArgs};
use argos_modkit::{run, ModuleRuntime, RunOptions, ShutdownOptions};

use std::path::PathBuf;
use std::sync::Arc;

mod core_module;
mod registered_modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Argos Server - host process for Argos modules
#[derive(Parser)]
#[command(name = "argos-server")]
#[command(about = "Argos Server - host process for Argos modules")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration, print the module load order and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    // Also normalizes + creates server.home_dir.
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    argos_bootstrap::logging::init_logging_unified(&logging_config, &config.home_dir());

    if args.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    tracing::info!(home_dir = %config.server.home_dir, "Argos Server starting");

    let provider = Arc::new(AppConfigProvider::new(config));
    let runtime = build_runtime().await?;

    // Dispatch subcommands (default: run)
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            run(RunOptions {
                runtime,
                modules_cfg: Some(provider),
                shutdown: ShutdownOptions::Signals,
            })
            .await
        }
        Commands::Check => {
            let report = check_config(&runtime, &provider)?;
            println!("{report}");
            Ok(())
        }
    }
}

/// Register every built-in module with a fresh runtime.
async fn build_runtime() -> Result<Arc<ModuleRuntime>> {
    let runtime = Arc::new(ModuleRuntime::new());
    for module in registered_modules::builtin_modules() {
        let name = module.name().to_string();
        runtime
            .register_module(module)
            .await
            .with_context(|| format!("failed to register module '{name}'"))?;
    }
    Ok(runtime)
}

/// Apply config and compute the load order without running any lifecycle.
fn check_config(runtime: &ModuleRuntime, provider: &AppConfigProvider) -> Result<String> {
    tracing::info!("Checking configuration…");

    let unknown: Vec<&String> = provider
        .inner()
        .modules
        .keys()
        .filter(|name| runtime.get_module(name).is_none())
        .collect();
    if !unknown.is_empty() {
        tracing::warn!(modules = ?unknown, "config mentions modules that are not registered");
    }

    runtime.apply_config(provider)?;
    let order = runtime.resolve_load_order()?;

    let mut report = String::from("Configuration is valid\nLoad order:\n");
    for (i, name) in order.iter().enumerate() {
        let enabled = runtime.module_config(name).is_some_and(|c| c.enabled);
        let state = if enabled { "enabled" } else { "disabled" };
        report.push_str(&format!("  {}. {name} ({state})\n", i + 1));
    }
    Ok(report)
}
