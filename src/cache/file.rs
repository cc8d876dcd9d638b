//! File-backed cache: a [`MemoryCache`] persisted as one JSON document

use super::{CacheStore, FlatMessage, MemoryCache, TailMeta};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Cache persisted at `path`; call [`FileCache::save`] to write changes
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    state: MemoryCache,
    dirty: bool,
}

impl FileCache {
    /// Load the cache, starting empty when the file does not exist yet
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse cache file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryCache::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read cache file {}", path.display()))
            }
        };

        Ok(Self {
            path,
            state,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &MemoryCache {
        &self.state
    }

    /// Mutable access for tail and override management
    pub fn state_mut(&mut self) -> &mut MemoryCache {
        self.dirty = true;
        &mut self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the cache if anything changed since load or the last save.
    ///
    /// Writes a sibling temp file and renames it over the target so a crash
    /// never leaves a half-written cache.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }

        let json = serde_json::to_string(&self.state).context("Failed to serialize cache")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        self.dirty = false;
        tracing::debug!("Cache saved to {:?}", self.path);
        Ok(())
    }
}

impl CacheStore for FileCache {
    fn flat(&self, conv_id: &str) -> &[FlatMessage] {
        self.state.flat(conv_id)
    }

    fn set_flat(&mut self, conv_id: &str, flat: Vec<FlatMessage>) {
        self.dirty = true;
        self.state.set_flat(conv_id, flat);
    }

    fn meta(&self, conv_id: &str) -> Option<TailMeta> {
        self.state.meta(conv_id)
    }

    fn set_meta(&mut self, conv_id: &str, meta: TailMeta) {
        self.dirty = true;
        self.state.set_meta(conv_id, meta);
    }

    fn tail_size(&self, conv_id: &str) -> Option<usize> {
        self.state.tail_size(conv_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Override;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::load(dir.path().join("cache.json")).unwrap();
        assert!(cache.flat("c").is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = FileCache::load(&path).unwrap();
        cache.set_meta(
            "c",
            TailMeta {
                renderable_total: 12,
                kept_renderable_by_react: 10,
            },
        );
        cache.state_mut().set_tail_size("c", 30);
        cache.state_mut().set_override("c", Some(Override::Off));
        cache.save().unwrap();
        assert!(!cache.is_dirty());

        let reloaded = FileCache::load(&path).unwrap();
        assert_eq!(reloaded.meta("c").map(|m| m.renderable_total), Some(12));
        assert_eq!(reloaded.tail_size("c"), Some(30));
        assert_eq!(reloaded.state().override_for("c"), Some(Override::Off));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileCache::load(&path).is_err());
    }
}
