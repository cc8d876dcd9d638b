//! Tail window configuration
//!
//! Bounds and defaults for the tail window, the global optimizer switch,
//! and the vocabularies the classifier uses to spot tool artifacts.

use crate::engine::classify::{DEFAULT_NOISE_KEYS, DEFAULT_TOOL_PART_TYPES};
use crate::engine::{clamp_tail, Classifier, NoiseFilter};
use serde::Deserialize;

/// Trim settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrimSettings {
    /// Tail size for conversations without a stored tail
    pub default_tail: usize,
    /// Lower bound for any tail size
    pub min_tail: usize,
    /// Upper bound for any tail size
    pub max_tail: usize,
    /// Global optimizer switch (per-conversation overrides win)
    pub optimizer_enabled: bool,
    /// Bare `mapping` objects shorter than this are never trimmed
    pub mapping_min_bytes: usize,
    /// Top-level keys that mark JSON message text as a tool artifact
    pub noise_keys: Vec<String>,
    /// Part types dropped from message bodies
    pub tool_part_types: Vec<String>,
}

impl Default for TrimSettings {
    fn default() -> Self {
        Self {
            default_tail: 10,
            min_tail: 10,
            max_tail: 800,
            optimizer_enabled: true,
            mapping_min_bytes: 1000,
            noise_keys: DEFAULT_NOISE_KEYS.iter().map(|s| s.to_string()).collect(),
            tool_part_types: DEFAULT_TOOL_PART_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Trim settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileTrim {
    pub default_tail: Option<usize>,
    pub min_tail: Option<usize>,
    pub max_tail: Option<usize>,
    pub optimizer_enabled: Option<bool>,
    pub mapping_min_bytes: Option<usize>,
    pub noise_keys: Option<Vec<String>>,
    pub tool_part_types: Option<Vec<String>>,
}

impl TrimSettings {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileTrim>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            default_tail: file.default_tail.unwrap_or(defaults.default_tail),
            min_tail: file.min_tail.unwrap_or(defaults.min_tail),
            max_tail: file.max_tail.unwrap_or(defaults.max_tail),
            optimizer_enabled: file.optimizer_enabled.unwrap_or(defaults.optimizer_enabled),
            mapping_min_bytes: file.mapping_min_bytes.unwrap_or(defaults.mapping_min_bytes),
            noise_keys: file.noise_keys.unwrap_or(defaults.noise_keys),
            tool_part_types: file.tool_part_types.unwrap_or(defaults.tool_part_types),
        }
    }

    /// Clamp a tail size into `[min_tail, max_tail]`
    pub fn clamp(&self, tail: usize) -> usize {
        clamp_tail(tail, self.min_tail, self.max_tail)
    }

    /// Effective tail for a stored (possibly absent) value
    pub fn effective_tail(&self, stored: Option<usize>) -> usize {
        self.clamp(stored.unwrap_or(self.default_tail))
    }

    /// Build the classifier these settings describe
    pub fn classifier(&self) -> Classifier {
        Classifier::new(
            NoiseFilter::new(self.noise_keys.iter().cloned()),
            self.tool_part_types.iter().cloned(),
        )
    }
}
