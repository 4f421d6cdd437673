use ahash::{AHasher, RandomState};
use core::hash::BuildHasher;

/// A fixed-seed hasher so that label-set hashes are stable across process
/// restarts (needed for WAL replay to reproduce the same hash-collision
/// chains the original ingest built).
pub struct DeterministicHasher(RandomState);

impl Default for DeterministicHasher {
    fn default() -> Self {
        Self(RandomState::with_seeds(0, 0, 0, 0))
    }
}

impl BuildHasher for DeterministicHasher {
    type Hasher = AHasher;

    fn build_hasher(&self) -> Self::Hasher {
        self.0.build_hasher()
    }
}

impl DeterministicHasher {
    pub fn new() -> Self {
        Self::default()
    }
}
