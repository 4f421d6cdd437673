use crate::labels::LabelSet;
use crate::series::SeriesRef;

/// Bijection between insertion-order series IDs and label-set-sorted rank.
///
/// `iv[rank] = original_id` is the sort permutation; `fw[original_id] =
/// rank` is its inverse. Built lazily: `update` is a no-op once the series
/// count stops growing, so repeated queries against a quiescent block don't
/// re-sort. Locking is the caller's responsibility: this type holds no
/// lock of its own, so the surrounding `RwLock` can be distinct from the
/// HeadBlock's and released independently while ingest continues.
#[derive(Default)]
pub struct PositionMapper {
    iv: Vec<SeriesRef>,
    fw: Vec<u32>,
}

impl PositionMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the permutation from `labels`, indexed by series ref.
    /// Idempotent and O(1) when `labels.len()` matches the last build;
    /// O(n log n) otherwise.
    pub fn update(&mut self, labels: &[LabelSet]) {
        let n = labels.len();
        if n == self.iv.len() {
            return;
        }
        let mut iv: Vec<SeriesRef> = (0..n as u32).collect();
        iv.sort_by(|&a, &b| labels[a as usize].cmp(&labels[b as usize]));
        let mut fw = vec![0u32; n];
        for (rank, &original) in iv.iter().enumerate() {
            fw[original as usize] = rank as u32;
        }
        self.iv = iv;
        self.fw = fw;
    }

    /// The sorted-by-label-set rank of `series`, if it has been mapped.
    pub fn rank_of(&self, series: SeriesRef) -> Option<u32> {
        self.fw.get(series as usize).copied()
    }

    /// The original insertion-order ref at sorted rank `rank`.
    pub fn series_at(&self, rank: u32) -> Option<SeriesRef> {
        self.iv.get(rank as usize).copied()
    }

    /// Stable-sorts `refs` by ascending sorted-label rank. The output is in
    /// label-set order, not insertion order, so it is no longer monotonic in
    /// raw ref and must not be fed back into postings `intersect`/`merge`.
    pub fn sort(&self, mut refs: Vec<SeriesRef>) -> Vec<SeriesRef> {
        refs.sort_by_key(|&r| self.rank_of(r).unwrap_or(u32::MAX));
        refs
    }

    pub fn len(&self) -> usize {
        self.iv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iv.is_empty()
    }
}
