//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

/// Render a string list as a TOML array, one entry per line
fn toml_list(items: &[String]) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let mut out = String::from("[\n");
    for item in items {
        out.push_str(&format!("    {:?},\n", item));
    }
    out.push(']');
    out
}

impl Config {
    /// Serialize config to TOML string (single source of truth for format)
    pub fn to_toml(&self) -> String {
        format!(
            r#"# tailtrim configuration

# Per-conversation cache (flat lists, metadata, tails, overrides)
cache_path = {cache_path:?}

# Directory for the trim event log
log_dir = {log_dir:?}

# Tail window
[trim]
default_tail = {default_tail}
min_tail = {min_tail}
max_tail = {max_tail}
# Global switch; per-conversation overrides (tailtrim override) win
optimizer_enabled = {optimizer_enabled}
# Bare "mapping" objects smaller than this are left alone
mapping_min_bytes = {mapping_min_bytes}
# Top-level JSON keys that mark message text as a tool artifact
noise_keys = {noise_keys}
# Part types dropped from message bodies
tool_part_types = {tool_part_types}

# Feature flags
[features]
event_log = {event_log}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# File logging (in addition to stderr)
file_enabled = {log_file_enabled}
file_dir = {log_file_dir:?}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = "{log_file_prefix}"
"#,
            cache_path = self.cache_path.display().to_string(),
            log_dir = self.log_dir.display().to_string(),
            default_tail = self.trim.default_tail,
            min_tail = self.trim.min_tail,
            max_tail = self.trim.max_tail,
            optimizer_enabled = self.trim.optimizer_enabled,
            mapping_min_bytes = self.trim.mapping_min_bytes,
            noise_keys = toml_list(&self.trim.noise_keys),
            tool_part_types = toml_list(&self.trim.tool_part_types),
            event_log = self.features.event_log,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = self.logging.file_dir.display().to_string(),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = self.logging.file_prefix,
        )
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = Self::config_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config path",
            ));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_toml())
    }
}
