//! Per-conversation cache shared with the presentation layer
//!
//! The trimmer only needs get/set contracts ([`CacheStore`]); where the data
//! lives is up to the caller. Two stores ship with the crate:
//!
//! - [`MemoryCache`]: plain maps, for embedding and tests
//! - [`FileCache`]: the same maps persisted as one JSON document
//!
//! Nothing here enforces the monotonic merge rule; the trimmer does.

mod file;

pub use file::FileCache;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One renderable message as shown by the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatMessage {
    pub id: String,
    pub role: String,
    pub text: String,
    /// Message timestamp, 0 when unknown
    pub time: f64,
}

/// Renderable counts for a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailMeta {
    /// Largest renderable total observed for the conversation
    pub renderable_total: usize,
    /// Renderable messages left in the delivered payload
    pub kept_renderable_by_react: usize,
}

/// Per-conversation optimizer override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    On,
    Off,
}

impl Override {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Get/set contract of the presentation cache
pub trait CacheStore {
    /// Cached flat list, empty when none
    fn flat(&self, conv_id: &str) -> &[FlatMessage];
    fn set_flat(&mut self, conv_id: &str, flat: Vec<FlatMessage>);

    fn meta(&self, conv_id: &str) -> Option<TailMeta>;
    fn set_meta(&mut self, conv_id: &str, meta: TailMeta);

    /// Stored tail size, unclamped; `None` means "use the default"
    fn tail_size(&self, conv_id: &str) -> Option<usize>;
}

/// In-memory cache state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCache {
    flat: HashMap<String, Vec<FlatMessage>>,
    meta: HashMap<String, TailMeta>,
    tails: HashMap<String, usize>,
    overrides: HashMap<String, Override>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tail size, already clamped by the caller
    pub fn set_tail_size(&mut self, conv_id: &str, tail: usize) {
        self.tails.insert(conv_id.to_string(), tail);
    }

    /// Forget every per-conversation tail (global default changed)
    pub fn clear_tails(&mut self) -> usize {
        let cleared = self.tails.len();
        self.tails.clear();
        cleared
    }

    pub fn override_for(&self, conv_id: &str) -> Option<Override> {
        self.overrides.get(conv_id).copied()
    }

    /// Set or clear (`None`) the override for a conversation
    pub fn set_override(&mut self, conv_id: &str, value: Option<Override>) {
        match value {
            Some(v) => {
                self.overrides.insert(conv_id.to_string(), v);
            }
            None => {
                self.overrides.remove(conv_id);
            }
        }
    }

    pub fn overrides(&self) -> &HashMap<String, Override> {
        &self.overrides
    }
}

impl CacheStore for MemoryCache {
    fn flat(&self, conv_id: &str) -> &[FlatMessage] {
        self.flat.get(conv_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn set_flat(&mut self, conv_id: &str, flat: Vec<FlatMessage>) {
        self.flat.insert(conv_id.to_string(), flat);
    }

    fn meta(&self, conv_id: &str) -> Option<TailMeta> {
        self.meta.get(conv_id).copied()
    }

    fn set_meta(&mut self, conv_id: &str, meta: TailMeta) {
        self.meta.insert(conv_id.to_string(), meta);
    }

    fn tail_size(&self, conv_id: &str) -> Option<usize> {
        self.tails.get(conv_id).copied()
    }
}

impl<C: CacheStore + ?Sized> CacheStore for &mut C {
    fn flat(&self, conv_id: &str) -> &[FlatMessage] {
        (**self).flat(conv_id)
    }

    fn set_flat(&mut self, conv_id: &str, flat: Vec<FlatMessage>) {
        (**self).set_flat(conv_id, flat)
    }

    fn meta(&self, conv_id: &str) -> Option<TailMeta> {
        (**self).meta(conv_id)
    }

    fn set_meta(&mut self, conv_id: &str, meta: TailMeta) {
        (**self).set_meta(conv_id, meta)
    }

    fn tail_size(&self, conv_id: &str) -> Option<usize> {
        (**self).tail_size(conv_id)
    }
}
