//! Configuration for the trimmer
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/tailtrim/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod features;
mod logging;
mod serialization;
mod trim;

#[cfg(test)]
mod tests;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (maintain public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use features::{Features, FileFeatures};
pub use logging::{FileLogging, LogRotation, LoggingConfig};
pub use trim::{FileTrim, TrimSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable names
pub const ENV_DEFAULT_TAIL: &str = "TAILTRIM_DEFAULT_TAIL";
pub const ENV_DISABLED: &str = "TAILTRIM_DISABLED";
pub const ENV_CACHE: &str = "TAILTRIM_CACHE";
pub const ENV_LOG_DIR: &str = "TAILTRIM_LOG_DIR";

fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".config").join("tailtrim"))
}

fn default_cache_path() -> PathBuf {
    config_dir()
        .map(|d| d.join("cache.json"))
        .unwrap_or_else(|| PathBuf::from("./tailtrim-cache.json"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON file backing the per-conversation cache
    pub cache_path: PathBuf,

    /// Directory for the trim event log
    pub log_dir: PathBuf,

    /// Tail window and classification settings
    pub trim: TrimSettings,

    /// Feature flags for optional modules
    pub features: Features,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            log_dir: PathBuf::from("./logs"),
            trim: TrimSettings::default(),
            features: Features::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub cache_path: Option<String>,
    pub log_dir: Option<String>,

    /// Optional [trim] section
    pub trim: Option<FileTrim>,

    /// Optional [features] section
    pub features: Option<FileFeatures>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/tailtrim/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        // Config::default().to_toml() is the single source of truth
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Parse a config file; a missing file yields an empty file config.
    ///
    /// A file that exists but does not parse is an error: a broken config
    /// should fail fast, not silently fall back to defaults.
    pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).with_context(|| {
                format!(
                    "Failed to parse configuration file {}\n  \
                     Check for missing quotes, invalid booleans (use true/false), \
                     malformed arrays or typos in section names.\n  \
                     To reset, run `tailtrim config --reset`.",
                    path.display()
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Cannot read configuration file {}", path.display())),
        }
    }

    /// Load configuration: env vars > file > defaults
    pub fn from_env() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::load_file_config(&path)?,
            None => FileConfig::default(),
        };
        Self::layered(file, |key| std::env::var(key).ok())
    }

    /// Merge a file config with an environment lookup
    pub(crate) fn layered<E>(file: FileConfig, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        // Cache path: env > file > default
        let cache_path = env(ENV_CACHE)
            .or(file.cache_path)
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_path);

        // Log directory: env > file > default
        let log_dir = env(ENV_LOG_DIR)
            .or(file.log_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./logs"));

        let mut trim = TrimSettings::from_file(file.trim);

        if let Some(raw) = env(ENV_DEFAULT_TAIL) {
            let tail: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number, got {:?}", ENV_DEFAULT_TAIL, raw))?;
            trim.default_tail = tail;
        }

        // Kill switch: env only (runtime flag)
        if env(ENV_DISABLED).is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            trim.optimizer_enabled = false;
        }

        if trim.min_tail == 0 {
            bail!("[trim] min_tail must be at least 1 (a tail always keeps one message)");
        }

        // Keep the default inside its own bounds
        trim.default_tail = trim.clamp(trim.default_tail);

        Ok(Self {
            cache_path,
            log_dir,
            trim,
            features: Features::from_file(file.features),
            logging: LoggingConfig::from_file(file.logging),
        })
    }
}
