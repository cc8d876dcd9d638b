//! Configuration tests
//!
//! These tests guard the file format: every field written by `to_toml` must
//! parse back, and layering must respect env > file > defaults.

use super::*;
use std::collections::HashMap;

fn no_env(_: &str) -> Option<String> {
    None
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

/// Verify that serialized config can be parsed back.
#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );
}

/// Every field survives serialization with non-default values
#[test]
fn test_config_roundtrip_custom_values() {
    let mut config = Config::default();
    config.cache_path = PathBuf::from("/tmp/tt/cache.json");
    config.log_dir = PathBuf::from("/tmp/tt/logs");
    config.trim.default_tail = 42;
    config.trim.min_tail = 5;
    config.trim.max_tail = 100;
    config.trim.optimizer_enabled = false;
    config.trim.mapping_min_bytes = 64;
    config.trim.noise_keys = vec!["open".to_string(), "find".to_string()];
    config.trim.tool_part_types = vec![];
    config.features.event_log = false;
    config.logging.level = "debug".to_string();
    config.logging.file_enabled = true;
    config.logging.file_rotation = LogRotation::Hourly;
    config.logging.file_prefix = "tt".to_string();

    let file: FileConfig = toml::from_str(&config.to_toml()).unwrap();
    let reloaded = Config::layered(file, no_env).unwrap();

    assert_eq!(reloaded.cache_path, config.cache_path);
    assert_eq!(reloaded.log_dir, config.log_dir);
    assert_eq!(reloaded.trim, config.trim);
    assert!(!reloaded.features.event_log);
    assert_eq!(reloaded.logging.level, "debug");
    assert!(reloaded.logging.file_enabled);
    assert_eq!(reloaded.logging.file_rotation, LogRotation::Hourly);
    assert_eq!(reloaded.logging.file_prefix, "tt");
}

#[test]
fn test_default_template_documents_trim_section() {
    let toml_str = Config::default().to_toml();
    for key in [
        "[trim]",
        "default_tail = 10",
        "min_tail = 10",
        "max_tail = 800",
        "optimizer_enabled = true",
        "mapping_min_bytes = 1000",
        "\"search_query\"",
        "[features]",
        "event_log = true",
        "[logging]",
    ] {
        assert!(toml_str.contains(key), "template is missing {key}:\n{toml_str}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layering
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_uses_defaults() {
    let config = Config::layered(FileConfig::default(), no_env).unwrap();
    assert_eq!(config.trim, TrimSettings::default());
    assert_eq!(config.log_dir, PathBuf::from("./logs"));
    assert!(config.features.event_log);
}

#[test]
fn test_env_overrides_file() {
    let file: FileConfig = toml::from_str(
        r#"
cache_path = "/from/file.json"
[trim]
default_tail = 20
"#,
    )
    .unwrap();
    let env = env_from(&[
        (ENV_CACHE, "/from/env.json"),
        (ENV_DEFAULT_TAIL, "30"),
        (ENV_DISABLED, "1"),
    ]);

    let config = Config::layered(file, env).unwrap();
    assert_eq!(config.cache_path, PathBuf::from("/from/env.json"));
    assert_eq!(config.trim.default_tail, 30);
    assert!(!config.trim.optimizer_enabled);
}

#[test]
fn test_default_tail_is_clamped() {
    let config = Config::layered(FileConfig::default(), env_from(&[(ENV_DEFAULT_TAIL, "3")])).unwrap();
    assert_eq!(config.trim.default_tail, 10);

    let config =
        Config::layered(FileConfig::default(), env_from(&[(ENV_DEFAULT_TAIL, "5000")])).unwrap();
    assert_eq!(config.trim.default_tail, 800);
}

#[test]
fn test_bad_env_tail_is_an_error() {
    let result = Config::layered(FileConfig::default(), env_from(&[(ENV_DEFAULT_TAIL, "lots")]));
    assert!(result.is_err());
}

#[test]
fn test_zero_min_tail_is_rejected() {
    let file: FileConfig = toml::from_str("[trim]\nmin_tail = 0\n").unwrap();
    let err = Config::layered(file, no_env).unwrap_err();
    assert!(err.to_string().contains("min_tail"));

    let file: FileConfig = toml::from_str("[trim]\nmin_tail = 1\n").unwrap();
    assert_eq!(Config::layered(file, no_env).unwrap().trim.min_tail, 1);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[trim]\ndefault_tail = \"ten\"\n").unwrap();

    let err = Config::load_file_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("config.toml"));
}

#[test]
fn test_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let file = Config::load_file_config(&dir.path().join("absent.toml")).unwrap();
    assert!(file.trim.is_none());
}

#[test]
fn test_log_rotation_parse() {
    assert_eq!(LogRotation::parse("HOURLY"), LogRotation::Hourly);
    assert_eq!(LogRotation::parse("never"), LogRotation::Never);
    assert_eq!(LogRotation::parse("weekly"), LogRotation::Daily);
}

#[test]
fn test_effective_tail_uses_default_and_bounds() {
    let trim = TrimSettings::default();
    assert_eq!(trim.effective_tail(None), 10);
    assert_eq!(trim.effective_tail(Some(50)), 50);
    assert_eq!(trim.effective_tail(Some(1)), 10);
    assert_eq!(trim.effective_tail(Some(9000)), 800);
}
