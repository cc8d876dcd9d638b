//! Feature flags configuration
//!
//! Feature flags for optional modules (opt-out: default enabled).

use serde::Deserialize;

/// Feature flags for optional modules (opt-out: default enabled)
#[derive(Debug, Clone)]
pub struct Features {
    /// Storage module: write trim events to JSONL files
    pub event_log: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self { event_log: true }
    }
}

/// Feature flags as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileFeatures {
    pub event_log: Option<bool>,
}

impl Features {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileFeatures>) -> Self {
        let file = file.unwrap_or_default();

        Self {
            event_log: file.event_log.unwrap_or(true),
        }
    }
}
