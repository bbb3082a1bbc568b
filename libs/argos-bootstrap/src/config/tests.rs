use super::*;
use crate::AppConfigProvider;
use argos_modkit::ConfigProvider;
use std::fs;
use tempfile::tempdir;

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("argos.yaml");
    let home = dir.join("home");
    let yaml = format!("server:\n  home_dir: \"{}\"\n{}", home.display(), body);
    fs::write(&path, yaml).expect("Failed to write config file");
    path
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.server.home_dir, "");
    assert!(config.logging.is_none());
    assert!(config.modules_dir.is_none());
    assert!(config.modules.is_empty());

    let logging = default_logging_config();
    let default = logging.get("default").unwrap();
    assert_eq!(default.console_level, "info");
    assert_eq!(default.file, "logs/argos.log");
}

#[test]
fn test_yaml_serialization() {
    let mut config = AppConfig::default();
    config.modules.insert(
        "cache".into(),
        ModuleSettings {
            enabled: Some(false),
            config: serde_json::json!({ "ttl": 60 }),
        },
    );
    let yaml = config.to_yaml().expect("Failed to serialize to YAML");

    assert!(yaml.contains("server:"));
    assert!(yaml.contains("modules:"));
    assert!(yaml.contains("cache:"));
    assert!(yaml.contains("ttl: 60"));
}

#[test]
fn test_layered_loading_yaml_only() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let config_path = write_config(
        temp_dir.path(),
        r#"
logging:
  default:
    console_level: warn
    file: ""
modules:
  argos-core:
    config:
      cache_ttl: 300
  metrics:
    enabled: false
"#,
    );

    let config = AppConfig::load_layered(&config_path).expect("Failed to load config");

    assert_eq!(config.home_dir(), temp_dir.path().join("home"));
    assert!(config.home_dir().exists(), "home_dir must be created");

    let logging = config.logging.as_ref().unwrap();
    assert_eq!(logging["default"].console_level, "warn");
    assert_eq!(logging["default"].file, "");

    let core = &config.modules["argos-core"];
    assert_eq!(core.enabled, None);
    assert_eq!(core.config["cache_ttl"], 300);
    assert_eq!(config.modules["metrics"].enabled, Some(false));
}

#[test]
fn test_missing_file_is_an_error() {
    let temp_dir = tempdir().unwrap();
    let err = AppConfig::load_layered(temp_dir.path().join("nope.yaml")).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_unknown_section_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let config_path = write_config(temp_dir.path(), "database:\n  url: sqlite://x\n");
    assert!(AppConfig::load_layered(&config_path).is_err());
}

#[test]
fn test_env_overrides_yaml() {
    let temp_dir = tempdir().unwrap();
    let config_path = write_config(
        temp_dir.path(),
        "modules:\n  envcheck:\n    enabled: true\n",
    );

    // unique module key so parallel tests are unaffected
    std::env::set_var("APP__MODULES__ENVCHECK__ENABLED", "false");
    let result = AppConfig::load_layered(&config_path);
    std::env::remove_var("APP__MODULES__ENVCHECK__ENABLED");

    let config = result.unwrap();
    assert_eq!(config.modules["envcheck"].enabled, Some(false));
}

#[test]
fn test_modules_dir_files_are_merged() {
    let temp_dir = tempdir().unwrap();
    let modules_dir = temp_dir.path().join("modules.d");
    fs::create_dir_all(&modules_dir).unwrap();
    fs::write(
        modules_dir.join("search.yaml"),
        "enabled: true\nconfig:\n  index: products\n",
    )
    .unwrap();
    fs::write(modules_dir.join("inline.yml"), "config:\n  from_file: true\n").unwrap();
    fs::write(modules_dir.join("README.md"), "ignored").unwrap();

    let config_path = write_config(
        temp_dir.path(),
        r#"
modules_dir: "modules.d"
modules:
  inline:
    config:
      from_file: false
"#,
    );

    let config = AppConfig::load_layered(&config_path).unwrap();

    assert_eq!(config.modules["search"].enabled, Some(true));
    assert_eq!(config.modules["search"].config["index"], "products");
    assert_eq!(config.modules["inline"].config["from_file"], true);
    assert!(!config.modules.contains_key("README"));
}

#[test]
fn test_invalid_module_file_reports_path() {
    let temp_dir = tempdir().unwrap();
    let dir = temp_dir.path().join("mods");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("broken.yaml"), "enabled: [not, a, bool]\n").unwrap();

    let mut bag = HashMap::new();
    let err = merge_module_files(&mut bag, &dir).unwrap_err();
    assert!(format!("{err:#}").contains("broken.yaml"));
}

#[test]
fn test_cli_overrides() {
    let mut config = AppConfig::default();

    let args = CliArgs {
        config: None,
        print_config: false,
        verbose: 2, // Should set logging to trace
    };
    config.apply_cli_overrides(&args);

    let logging = config.logging.as_ref().unwrap();
    assert_eq!(logging["default"].console_level, "trace");

    let args = CliArgs {
        verbose: 1,
        ..CliArgs::default()
    };
    config.apply_cli_overrides(&args);
    assert_eq!(
        config.logging.as_ref().unwrap()["default"].console_level,
        "debug"
    );
}

#[test]
fn test_cli_overrides_without_verbose_keep_levels() {
    let mut config = AppConfig::default();
    config.apply_cli_overrides(&CliArgs::default());
    assert!(config.logging.is_none());
}

#[test]
fn test_config_provider_exposes_module_sections() {
    let mut config = AppConfig::default();
    config.modules.insert(
        "cache".into(),
        ModuleSettings {
            enabled: Some(false),
            config: serde_json::json!({ "ttl": 60 }),
        },
    );
    let provider = AppConfigProvider::new(config);

    assert_eq!(
        provider.get_module_config("cache"),
        Some(&serde_json::json!({ "ttl": 60 }))
    );
    assert_eq!(provider.module_enabled("cache"), Some(false));
    assert!(provider.get_module_config("missing").is_none());
    assert_eq!(provider.module_enabled("missing"), None);
}
