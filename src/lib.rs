//! Conversation tail-trimming
//!
//! Long conversations arrive as node-trees (`mapping`) inside JSON
//! documents, stream fragments, inline scripts and event streams. This crate
//! rewrites those payloads so only the last N human-visible messages of the
//! active branch remain, repairing the tree links as it goes.
//!
//! ```no_run
//! use tailtrim::cache::MemoryCache;
//! use tailtrim::config::TrimSettings;
//! use tailtrim::events::NoopNotifier;
//! use tailtrim::policy::OptimizerSwitch;
//! use tailtrim::trim::{TrimContext, Trimmer};
//!
//! let mut cache = MemoryCache::new();
//! let mut trimmer = Trimmer::new(
//!     TrimSettings::default(),
//!     &mut cache,
//!     OptimizerSwitch::default(),
//!     NoopNotifier,
//! );
//! let body = std::fs::read_to_string("conversation.json").unwrap();
//! let trimmed = trimmer.trim_document(&body, TrimContext::default()).into_text(&body);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod events;
pub mod logging;
pub mod policy;
pub mod sse;
pub mod storage;
pub mod trim;
pub mod util;
