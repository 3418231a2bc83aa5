//! Version vectors for causal versioning of values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// One node's contribution to a [`VersionVector`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockEntry {
    pub node_id: String,
    pub counter: u64,
    /// Time of the last increment. Never consulted when ordering vectors.
    pub updated_at: SystemTime,
}

/// A version vector: maps node identifiers to monotonic counters.
///
/// A node missing from the map has counter 0. Entries are kept sorted by
/// node id so rendering and serialization are reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<String, ClockEntry>,
}

/// Causal relationship of one vector to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    Equal,
    Newer,
    Older,
    Concurrent,
}

impl Causality {
    /// The same relationship seen from the other side.
    pub fn mirror(self) -> Self {
        match self {
            Causality::Newer => Causality::Older,
            Causality::Older => Causality::Newer,
            other => other,
        }
    }
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vector from `(node, counter)` pairs. Zero counters are dropped.
    pub fn from_counters<I, S>(counters: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let now = SystemTime::now();
        let entries = counters
            .into_iter()
            .filter(|(_, counter)| *counter > 0)
            .map(|(node, counter)| {
                let node_id = node.into();
                (
                    node_id.clone(),
                    ClockEntry {
                        node_id,
                        counter,
                        updated_at: now,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Get the counter for a node (0 if not present).
    pub fn get(&self, node: &str) -> u64 {
        self.entries.get(node).map(|e| e.counter).unwrap_or(0)
    }

    /// Record one more update observed from `node`.
    pub fn update(&mut self, node: &str) {
        let now = SystemTime::now();
        match self.entries.get_mut(node) {
            Some(entry) => {
                entry.counter += 1;
                entry.updated_at = now;
            }
            None => {
                self.entries.insert(
                    node.to_string(),
                    ClockEntry {
                        node_id: node.to_string(),
                        counter: 1,
                        updated_at: now,
                    },
                );
            }
        }
    }

    /// Merge `other` into `self` (element-wise max).
    pub fn merge(&mut self, other: &Self) {
        for (node, theirs) in &other.entries {
            match self.entries.get_mut(node) {
                Some(ours) if ours.counter >= theirs.counter => {}
                Some(ours) => {
                    ours.counter = theirs.counter;
                    ours.updated_at = theirs.updated_at;
                }
                None => {
                    self.entries.insert(node.clone(), theirs.clone());
                }
            }
        }
    }

    /// Compare two version vectors.
    ///
    /// Each key set is scanned once; nodes absent from one side count as 0.
    pub fn compare(&self, other: &Self) -> Causality {
        let mut self_ahead = false;
        let mut other_ahead = false;

        for (node, entry) in &self.entries {
            let theirs = other.get(node);
            if entry.counter > theirs {
                self_ahead = true;
            } else if entry.counter < theirs {
                other_ahead = true;
            }
        }
        for (node, entry) in &other.entries {
            if entry.counter > 0 && !self.entries.contains_key(node) {
                other_ahead = true;
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Newer,
            (false, true) => Causality::Older,
            (true, true) => Causality::Concurrent,
        }
    }

    /// Dominates: self >= other on all entries, > on at least one.
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Newer
    }

    /// Are these vectors concurrent (neither dominates)?
    pub fn is_concurrent(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Concurrent
    }

    /// Entries sorted by node id.
    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &ClockEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-readable `node:counter` listing, sorted by node id.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

/// Vectors are equal when every counter matches; timestamps are ignored.
impl PartialEq for VersionVector {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Equal
    }
}

impl Eq for VersionVector {}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in self.entries.values() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", entry.node_id, entry.counter)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vv(entries: &[(&str, u64)]) -> VersionVector {
        VersionVector::from_counters(entries.iter().copied())
    }

    #[test]
    fn test_update() {
        let mut clock = VersionVector::new();
        clock.update("a");
        assert_eq!(clock.get("a"), 1);
        clock.update("a");
        assert_eq!(clock.get("a"), 2);
        clock.update("b");
        assert_eq!(clock.get("a"), 2);
        assert_eq!(clock.get("b"), 1);
        assert_eq!(clock.get("missing"), 0);
    }

    #[test]
    fn test_update_twice_is_newer() {
        let original = vv(&[("n1", 3)]);
        let mut next = original.clone();
        next.update("n1");
        next.update("n1");
        assert_eq!(next.compare(&original), Causality::Newer);
        assert_eq!(original.compare(&next), Causality::Older);
    }

    #[test]
    fn test_update_refreshes_timestamp() {
        let mut clock = vv(&[("a", 1)]);
        let before = clock.entries().next().unwrap().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        clock.update("a");
        let after = clock.entries().next().unwrap().updated_at;
        assert!(after > before);
    }

    #[test]
    fn test_merge() {
        let mut a = vv(&[("n1", 3), ("n2", 1)]);
        let b = vv(&[("n1", 1), ("n2", 5), ("n3", 2)]);
        a.merge(&b);
        assert_eq!(a.get("n1"), 3);
        assert_eq!(a.get("n2"), 5);
        assert_eq!(a.get("n3"), 2);
    }

    #[test]
    fn test_compare_equal() {
        let a = vv(&[("n1", 1), ("n2", 2)]);
        let b = vv(&[("n2", 2), ("n1", 1)]);
        assert_eq!(a.compare(&b), Causality::Equal);
        assert_eq!(a, b);
    }

    #[test]
    fn test_compare_self_is_equal() {
        let a = vv(&[("n1", 4), ("n2", 7)]);
        assert_eq!(a.compare(&a), Causality::Equal);
        assert_eq!(VersionVector::new().compare(&VersionVector::new()), Causality::Equal);
    }

    #[test]
    fn test_compare_newer() {
        let a = vv(&[("n1", 2), ("n2", 2)]);
        let b = vv(&[("n1", 1), ("n2", 2)]);
        assert_eq!(a.compare(&b), Causality::Newer);
        assert!(a.dominates(&b));
    }

    #[test]
    fn test_compare_older() {
        let a = vv(&[("n1", 1)]);
        let b = vv(&[("n1", 2)]);
        assert_eq!(a.compare(&b), Causality::Older);
    }

    #[test]
    fn test_compare_concurrent() {
        let a = vv(&[("n1", 2), ("n2", 1)]);
        let b = vv(&[("n1", 1), ("n2", 2)]);
        assert_eq!(a.compare(&b), Causality::Concurrent);
    }

    #[test]
    fn test_disjoint_updates_from_common_ancestor_are_concurrent() {
        let ancestor = vv(&[("n1", 1)]);
        let mut left = ancestor.clone();
        left.update("n2");
        let mut right = ancestor.clone();
        right.update("n3");
        assert!(left.is_concurrent(&right));
        assert!(right.is_concurrent(&left));
    }

    #[test]
    fn test_superset_keys_is_newer() {
        let a = vv(&[("n1", 1), ("n2", 1)]);
        let b = vv(&[("n1", 1)]);
        assert!(a.dominates(&b));
        assert_eq!(b.compare(&a), Causality::Older);
    }

    #[test]
    fn test_empty_is_older_than_anything() {
        let empty = VersionVector::new();
        let a = vv(&[("n1", 1)]);
        assert_eq!(empty.compare(&a), Causality::Older);
        assert_eq!(a.compare(&empty), Causality::Newer);
    }

    #[test]
    fn test_zero_counters_are_absent() {
        let a = vv(&[("n1", 1), ("n2", 0)]);
        let b = vv(&[("n1", 1)]);
        assert_eq!(a.compare(&b), Causality::Equal);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_equality_ignores_timestamps() {
        let a = vv(&[("n1", 1)]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = vv(&[("n1", 1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_sorted() {
        let a = vv(&[("zeta", 1), ("alpha", 3), ("mid", 2)]);
        assert_eq!(a.render(), "alpha:3 mid:2 zeta:1");
        assert_eq!(VersionVector::new().render(), "");
    }

    #[test]
    fn test_mirror() {
        assert_eq!(Causality::Newer.mirror(), Causality::Older);
        assert_eq!(Causality::Older.mirror(), Causality::Newer);
        assert_eq!(Causality::Equal.mirror(), Causality::Equal);
        assert_eq!(Causality::Concurrent.mirror(), Causality::Concurrent);
    }

    #[test]
    fn test_serde_roundtrip_preserves_counters() {
        let a = vv(&[("n1", 3), ("n2", 9)]);
        let json = serde_json::to_string(&a).unwrap();
        let b: VersionVector = serde_json::from_str(&json).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.get("n2"), 9);
    }
}
