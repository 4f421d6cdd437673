use super::Label;
use crate::common::hash::DeterministicHasher;
use get_size::GetSize;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{BuildHasher, Hash, Hasher};

/// An ordered sequence of `(name, value)` pairs, sorted by name, names unique.
///
/// `LabelSet` is the identity of a series: two sets with the same pairs in
/// the same order compare equal and hash equal. `Ord` is the lexicographic
/// order on the pair sequence, used by the position mapper to produce a
/// sorted-by-label view of series independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, GetSize)]
pub struct LabelSet(Vec<Label>);

impl LabelSet {
    /// Builds a label set from arbitrary pairs, sorting by name and
    /// deduplicating on name (last write wins, matching a map-like insert).
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Self {
        let mut v: Vec<Label> = labels.into_iter().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        v.dedup_by(|a, b| {
            if a.name == b.name {
                std::mem::swap(a, b);
                true
            } else {
                false
            }
        });
        Self(v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    /// A stable 64-bit hash of the label set's contents, used to resolve an
    /// ingest sample's series via HeadBlock's `hashes` collision chain.
    /// Deterministic across process restarts so replayed state rebuilds the
    /// same chains as the original ingest.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DeterministicHasher::new().build_hasher();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for LabelSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in &self.0 {
            label.name.hash(state);
            label.value.hash(state);
        }
    }
}

impl PartialOrd for LabelSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LabelSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl From<Vec<Label>> for LabelSet {
    fn from(labels: Vec<Label>) -> Self {
        Self::new(labels)
    }
}
