//! Tail selection: which suffix of the chain survives.

use super::tree::{Mapping, NodeRef};
use std::collections::HashSet;

/// Outcome of tail selection over one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailSelection {
    /// Renderable total already fits: leave the tree untouched
    Untouched { renderable_total: usize },
    /// Keep `chain[start..]`
    Suffix {
        start: usize,
        renderable_total: usize,
        kept_renderable: usize,
    },
}

/// Clamp a requested tail size into `[min, max]`
pub fn clamp_tail(requested: usize, min: usize, max: usize) -> usize {
    requested.clamp(min, max.max(min))
}

/// Select the shortest chain suffix holding `want` renderable nodes.
///
/// `renderable[i]` says whether `chain[i]` is renderable. Walks backward from
/// the leaf; trailing non-renderable nodes ride along with the suffix. When
/// the chain holds no more than `want` renderable nodes nothing is selected.
/// A `want` of zero still keeps the last renderable node; configured tails
/// start at one.
pub fn select_tail(renderable: &[bool], want: usize) -> TailSelection {
    let renderable_total = renderable.iter().filter(|r| **r).count();
    if renderable_total <= want {
        return TailSelection::Untouched { renderable_total };
    }

    let mut seen = 0;
    let mut start = renderable.len();
    for (i, is_renderable) in renderable.iter().enumerate().rev() {
        start = i;
        if *is_renderable {
            seen += 1;
            if seen >= want {
                break;
            }
        }
    }

    TailSelection::Suffix {
        start,
        renderable_total,
        kept_renderable: seen,
    }
}

/// Close a kept set over its ancestors.
///
/// For every kept node, parent links are followed and added until a kept
/// node, the root, a missing id, or a dropped renderable message is reached.
/// The dropped renderable message marks the cut, so structural nodes that
/// bridge kept messages survive while trimmed history stays trimmed.
pub fn close_over_ancestors<F>(mapping: &Mapping, kept: &[String], is_renderable: F) -> HashSet<String>
where
    F: Fn(NodeRef<'_>) -> bool,
{
    let mut keep: HashSet<String> = kept.iter().cloned().collect();

    for id in kept {
        let mut cursor = mapping.get(id).and_then(|v| NodeRef::new(v).parent());
        while let Some(parent_id) = cursor {
            if keep.contains(parent_id) {
                break;
            }
            let Some(parent) = mapping.get(parent_id).map(NodeRef::new) else {
                break;
            };
            if is_renderable(parent) {
                break;
            }
            keep.insert(parent_id.to_string());
            cursor = parent.parent();
        }
    }

    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn flags(pattern: &str) -> Vec<bool> {
        pattern.chars().map(|c| c == 'R').collect()
    }

    #[test]
    fn test_total_within_target_is_untouched() {
        assert_eq!(
            select_tail(&flags("sRRsR"), 3),
            TailSelection::Untouched { renderable_total: 3 }
        );
        assert_eq!(
            select_tail(&[], 10),
            TailSelection::Untouched { renderable_total: 0 }
        );
    }

    #[test]
    fn test_suffix_keeps_exactly_want_renderable() {
        // index:        0123456
        let chain = flags("sRRsRsR");
        match select_tail(&chain, 2) {
            TailSelection::Suffix {
                start,
                renderable_total,
                kept_renderable,
            } => {
                assert_eq!(start, 4);
                assert_eq!(renderable_total, 4);
                assert_eq!(kept_renderable, 2);
                assert_eq!(chain[start..].iter().filter(|r| **r).count(), 2);
            }
            other => panic!("Expected Suffix, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_structural_nodes_ride_along() {
        match select_tail(&flags("RRRss"), 1) {
            TailSelection::Suffix { start, .. } => assert_eq!(start, 2),
            other => panic!("Expected Suffix, got {:?}", other),
        }
    }

    #[test]
    fn test_clamp_tail() {
        assert_eq!(clamp_tail(3, 10, 800), 10);
        assert_eq!(clamp_tail(25, 10, 800), 25);
        assert_eq!(clamp_tail(5_000, 10, 800), 800);
        assert_eq!(clamp_tail(5, 10, 2), 10);
    }

    #[test]
    fn test_close_over_ancestors_stops_at_dropped_message() {
        let map = match json!({
            "root": {"parent": null, "children": ["m1"]},
            "m1": {"parent": "root", "children": ["tool"], "message": {"r": true}},
            "tool": {"parent": "m1", "children": ["m2"]},
            "m2": {"parent": "tool", "children": [], "message": {"r": true}}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let rendered = |n: NodeRef<'_>| n.message().is_some();
        let keep = close_over_ancestors(&map, &["m2".to_string()], rendered);
        let mut ids: Vec<_> = keep.into_iter().collect();
        ids.sort();
        assert_eq!(ids, vec!["m2", "tool"]);
    }

    #[test]
    fn test_close_over_ancestors_reaches_root_through_structure() {
        let map = match json!({
            "root": {"parent": null, "children": ["sys"]},
            "sys": {"parent": "root", "children": ["m"]},
            "m": {"parent": "sys", "children": [], "message": {}}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let keep = close_over_ancestors(&map, &["m".to_string()], |n| n.message().is_some());
        assert_eq!(keep.len(), 3);
    }
}
