use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths::home_dir::resolve_home_dir;

/// Directory created under the user home when `server.home_dir` is not set.
pub const DEFAULT_HOME_SUBDIR: &str = ".argos";

/// Main application configuration: typed process sections plus a
/// per-module settings bag.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Directory containing per-module YAML files (optional).
    #[serde(default)]
    pub modules_dir: Option<String>,
    /// module_name → settings
    #[serde(default)]
    pub modules: HashMap<String, ModuleSettings>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Normalized to an absolute path on load. Empty means the platform default.
    #[serde(default)]
    pub home_dir: String,
}

/// Settings for one module.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSettings {
    /// Overrides the module's own `enabled` metadata when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Free-form config section handed to the module.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/argos.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

/// Default logging configuration: info to console, debug to a rotating file.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/argos.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    /// Also normalizes `server.home_dir` into an absolute path and creates the directory.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let path = config_path.as_ref();
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            // Example: APP__SERVER__HOME_DIR=/srv/argos maps to server.home_dir
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to extract config from {}", path.display()))?;

        normalize_home_dir_inplace(&mut config.server)
            .context("Failed to resolve server.home_dir")?;

        if let Some(dir) = config.modules_dir.clone() {
            let dir = resolve_relative_to(path, &dir);
            merge_module_files(&mut config.modules, &dir)
                .with_context(|| format!("Failed to merge module files from {}", dir.display()))?;
        }

        Ok(config)
    }

    /// Load configuration from file or create with default values.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self {
                    logging: Some(default_logging_config()),
                    ..Self::default()
                };
                normalize_home_dir_inplace(&mut c.server)
                    .context("Failed to resolve server.home_dir (defaults)")?;
                Ok(c)
            }
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        // Set console level based on verbose flags for "default" section.
        if args.verbose == 0 {
            return;
        }
        let level = if args.verbose == 1 { "debug" } else { "trace" };
        let logging = self.logging.get_or_insert_with(default_logging_config);
        match logging.get_mut("default") {
            Some(section) => section.console_level = level.to_string(),
            None => {
                logging.insert(
                    "default".to_string(),
                    Section {
                        console_level: level.to_string(),
                        file: String::new(),
                        file_level: String::new(),
                        max_age_days: None,
                        max_backups: None,
                        max_size_mb: None,
                    },
                );
            }
        }
    }

    /// Absolute home directory (valid after loading).
    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from(&self.server.home_dir)
    }
}

/// Command line arguments relevant to configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

fn normalize_home_dir_inplace(server: &mut ServerConfig) -> Result<()> {
    // Treat empty string as "not provided" => None.
    let opt = if server.home_dir.trim().is_empty() {
        None
    } else {
        Some(server.home_dir.clone())
    };

    let resolved: PathBuf = resolve_home_dir(opt, DEFAULT_HOME_SUBDIR, /*create*/ true)
        .context("home_dir normalization failed")?;

    server.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

/// Relative `modules_dir` values are taken relative to the config file.
fn resolve_relative_to(config_path: &Path, dir: &str) -> PathBuf {
    let p = Path::new(dir);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) => parent.join(p),
        None => p.to_path_buf(),
    }
}

/// Merge every `<name>.yaml`/`<name>.yml` in `dir` into `bag` under `<name>`.
///
/// A file replaces any inline settings for the same module. A missing directory is not an error.
pub fn merge_module_files(bag: &mut HashMap<String, ModuleSettings>, dir: &Path) -> Result<()> {
    use std::fs;
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "modules_dir does not exist; skipping");
        return Ok(());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext != "yml" && ext != "yaml" {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = fs::read_to_string(&path)?;
        let settings: ModuleSettings = serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid module file {}", path.display()))?;
        bag.insert(name.to_string(), settings);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
