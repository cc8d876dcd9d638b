//! Conversation tail-trimming engine
//!
//! Pure functions over conversation node-trees and the raw text that
//! carries them. Nothing here performs IO or touches cached state; the
//! [`crate::trim`] orchestrator wires these pieces to the collaborators.
//!
//! # Architecture
//!
//! ```text
//! text ─► scoped (key scan) ─► extract (balanced object) ─► parse
//!                                                              │
//!    heuristic (bare mapping?) ◄───────────────────────────────┤
//!                                                              ▼
//!   tree (leaf, chain) ─► classify (renderable?) ─► select (suffix)
//!                                                              │
//!                                   rebuild (kept copy) ◄──────┘
//! ```
//!
//! Every step fails soft: malformed, truncated or ambiguous input yields
//! "no change", never an error surfaced to the caller.

pub mod classify;
pub mod extract;
pub mod heuristic;
pub mod rebuild;
pub mod scoped;
pub mod select;
pub mod tree;

pub use classify::{Body, Classifier, NoiseFilter, Part};
pub use extract::extract_object;
pub use heuristic::{
    conversation_id_from_url, find_conversation_id_in_text, find_current_node_near,
    is_likely_conversation_mapping,
};
pub use rebuild::{rebuild, Rebuilt};
pub use scoped::{replace_scoped_key, ScopedReplace};
pub use select::{clamp_tail, close_over_ancestors, select_tail, TailSelection};
pub use tree::{build_chain, find_leaf, resolve_leaf, Mapping, NodeRef};
