//! Uniform value snapshots
//!
//! The change set produced by capturing one instance against a hook group.
//! Entries are sorted by hook name and the hash is computed once; two
//! snapshots are equal only when their contents are equal, so a hash
//! collision never merges two groups.

use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::sync::Arc;

use super::value::UniformValue;

/// One uniform that changed
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniformChange {
    /// Hook name
    pub name: Arc<str>,
    /// Resource slot
    pub slot: u32,
    /// New value
    pub value: UniformValue,
}

/// Immutable, sorted uniform change set
#[derive(Clone, Debug)]
pub struct UniformValueSnapshot {
    changes: Arc<[UniformChange]>,
    hash: u64,
}

impl UniformValueSnapshot {
    /// Snapshot with no changes
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Build from unsorted changes
    pub fn new(mut changes: Vec<UniformChange>) -> Self {
        changes.sort_by(|a, b| a.name.cmp(&b.name));

        let mut hasher = DefaultHasher::new();
        changes.hash(&mut hasher);

        Self {
            changes: changes.into(),
            hash: hasher.finish(),
        }
    }

    /// Precomputed content hash
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Changes sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &UniformChange> {
        self.changes.iter()
    }

    /// Change recorded for a hook
    pub fn get(&self, name: &str) -> Option<&UniformChange> {
        self.changes
            .binary_search_by(|c| (*c.name).cmp(name))
            .ok()
            .map(|i| &self.changes[i])
    }

    /// Total bytes this snapshot uploads
    pub fn upload_size(&self) -> usize {
        self.changes.iter().map(|c| c.value.size()).sum()
    }
}

impl Default for UniformValueSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for UniformValueSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.changes == other.changes
    }
}

impl Eq for UniformValueSnapshot {}

impl Hash for UniformValueSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(name: &str, slot: u32, v: f32) -> UniformChange {
        UniformChange {
            name: name.into(),
            slot,
            value: UniformValue::Float(v),
        }
    }

    #[test]
    fn test_order_independent() {
        let a = UniformValueSnapshot::new(vec![change("time", 0, 1.0), change("alpha", 1, 0.5)]);
        let b = UniformValueSnapshot::new(vec![change("alpha", 1, 0.5), change("time", 0, 1.0)]);
        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_eq!(a.iter().next().unwrap().name.as_ref(), "alpha");
    }

    #[test]
    fn test_lookup() {
        let s = UniformValueSnapshot::new(vec![change("b", 0, 1.0), change("a", 1, 2.0)]);
        assert_eq!(s.get("a").unwrap().slot, 1);
        assert!(s.get("c").is_none());
        assert_eq!(s.upload_size(), 8);
    }

    #[test]
    fn test_different_values_differ() {
        let a = UniformValueSnapshot::new(vec![change("time", 0, 1.0)]);
        let b = UniformValueSnapshot::new(vec![change("time", 0, 2.0)]);
        assert_ne!(a, b);
        assert!(UniformValueSnapshot::empty().is_empty());
    }
}
