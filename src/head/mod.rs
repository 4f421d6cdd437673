mod reader;

pub use reader::{ChunkHandle, ChunkMeta, HeadReader, IndexReader, SeriesReader};

use crate::chunk::{Chunk, MAX_SERIES_PER_BLOCK};
use crate::common::Timestamp;
use crate::error::{HeadError, HeadResult};
use crate::index::{LabelValues, PositionMapper, Postings, PostingsIterator, ALL_POSTINGS_TERM};
use crate::labels::LabelSet;
use crate::series::{MemSeries, SeriesRef};
use crate::wal::{ReplayHandler, Wal, WalSample};
use ahash::AHashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Calibrates the fullness heuristic's denominator to roughly
/// `CHUNK_TARGET / 40` samples per series (see `fullness`).
pub const FULLNESS_DENOMINATOR: f64 = 250.0;

/// A packed chunk reference: `(series_id << 8) | chunk_index_within_series`.
/// At most 256 chunks per series and 2^24 series per block fit in 32 bits.
pub type ChunkRef = u32;

pub fn encode_chunk_ref(series: SeriesRef, chunk_index: usize) -> ChunkRef {
    debug_assert!(series < MAX_SERIES_PER_BLOCK, "series id exceeds packed ref width");
    debug_assert!(chunk_index < 256, "chunk index exceeds packed ref width");
    (series << 8) | (chunk_index as u32 & 0xFF)
}

pub fn decode_chunk_ref(r: ChunkRef) -> (SeriesRef, usize) {
    (r >> 8, (r & 0xFF) as usize)
}

/// An input sample annotated with its label set's hash, submitted as part
/// of an ingest batch. `series_ref` starts `None` and is filled in by
/// `HeadBlock::append_batch` with the series the sample resolved to, so
/// callers can recover per-sample series IDs after a successful call.
#[derive(Clone, Debug, PartialEq)]
pub struct HashedSample {
    pub hash: u64,
    pub labels: LabelSet,
    pub timestamp: Timestamp,
    pub value: f64,
    pub series_ref: Option<SeriesRef>,
}

impl HashedSample {
    /// Builds a sample, computing `hash` as `labels.fingerprint()`. WAL
    /// replay only has the label set to work from, not an externally
    /// supplied hash, so deriving the hash purely from the labels is what
    /// lets replay reconstruct the exact hash-collision chains live ingest
    /// built.
    pub fn new(labels: LabelSet, timestamp: Timestamp, value: f64) -> Self {
        let hash = labels.fingerprint();
        Self {
            hash,
            labels,
            timestamp,
            value,
            series_ref: None,
        }
    }
}

/// Block statistics. `min_time`/`max_time` start at sentinels wide enough
/// that the first accepted sample always narrows them in the correct
/// direction (the min shrinks downward, the max grows upward).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stats {
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub series_count: u64,
    pub chunk_count: u64,
    pub sample_count: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            min_time: Timestamp::MAX,
            max_time: Timestamp::MIN,
            series_count: 0,
            chunk_count: 0,
            sample_count: 0,
        }
    }
}

impl Stats {
    fn widen(&mut self, t: Timestamp) {
        self.min_time = self.min_time.min(t);
        self.max_time = self.max_time.max(t);
    }
}

/// Everything guarded by the HeadBlock's single outer lock: the dense
/// series array, the hash-collision chains used to resolve a label set to
/// its series, the label-value dictionary, and the postings index. All
/// four are mutated together under series creation and must be observed
/// consistently by readers, hence one shared lock rather than four.
struct Inner<C: Chunk> {
    series: Vec<RwLock<MemSeries<C>>>,
    hashes: AHashMap<u64, Vec<SeriesRef>>,
    values: LabelValues,
    postings: Postings,
}

impl<C: Chunk> Default for Inner<C> {
    fn default() -> Self {
        Self {
            series: Vec::new(),
            hashes: AHashMap::new(),
            values: LabelValues::new(),
            postings: Postings::new(),
        }
    }
}

impl<C: Chunk> Inner<C> {
    fn find_series(&self, hash: u64, labels: &LabelSet) -> Option<SeriesRef> {
        self.hashes.get(&hash)?.iter().copied().find(|&r| {
            self.series[r as usize]
                .read()
                .expect("series lock poisoned")
                .labels
                == *labels
        })
    }

    /// Creates a new series under the caller's exclusive lock on `Inner`:
    /// assigns the next dense ref, registers the hash chain, adds every
    /// label to the value dictionary and postings index, and adds the ref
    /// to the reserved "match all" posting.
    fn create_series(&mut self, hash: u64, labels: LabelSet) -> HeadResult<SeriesRef> {
        if self.series.len() as u32 >= MAX_SERIES_PER_BLOCK {
            return Err(HeadError::SeriesCapacityExceeded(MAX_SERIES_PER_BLOCK));
        }
        let series_ref = self.series.len() as u32;
        for label in labels.iter() {
            self.values.insert(&label.name, &label.value);
            self.postings
                .add(series_ref, (label.name.clone(), label.value.clone()));
        }
        self.postings.add(series_ref, ALL_POSTINGS_TERM.clone());
        self.hashes.entry(hash).or_default().push(series_ref);
        self.series.push(RwLock::new(MemSeries::new(series_ref, labels)));
        Ok(series_ref)
    }
}

/// Resolution of one batch sample during the classification pass: either
/// an existing series, or an index into this call's locally-new series
/// list (fixed up to a real ref once those series are created).
enum Resolution {
    Existing(SeriesRef),
    New(usize),
}

/// The in-memory "head block": the hot write-path tier of the database.
/// Aggregates the series list, label index, position mapper, statistics,
/// and WAL handle, and exposes the public ingest and read API.
///
/// Lock hierarchy (outer to inner): the block lock, then per-series locks,
/// with the stats lock and the mapper lock each independent leaves
/// acquired only briefly and never while holding a series lock.
pub struct HeadBlock<C: Chunk> {
    inner: RwLock<Inner<C>>,
    mapper: Mutex<PositionMapper>,
    stats: Mutex<Stats>,
    wal: Wal,
}

impl<C: Chunk> HeadBlock<C> {
    /// Opens (or creates) a head block backed by a WAL under `dir`,
    /// replaying any existing log to reconstruct series, the label index,
    /// and statistics before returning.
    pub fn open(dir: impl AsRef<Path>, flush_interval: Duration) -> HeadResult<Self> {
        let wal = Wal::open(dir, flush_interval)?;

        let mut inner = Inner::<C>::default();
        let mut stats = Stats::default();
        {
            struct Replayer<'a, C: Chunk> {
                inner: &'a mut Inner<C>,
                stats: &'a mut Stats,
            }
            impl<C: Chunk> ReplayHandler for Replayer<'_, C> {
                fn series(&mut self, labels: LabelSet) -> HeadResult<()> {
                    let hash = labels.fingerprint();
                    self.inner.create_series(hash, labels)?;
                    self.stats.series_count += 1;
                    self.stats.chunk_count += 1;
                    Ok(())
                }

                fn sample(&mut self, sample: WalSample) -> HeadResult<()> {
                    let Some(lock) = self.inner.series.get(sample.series as usize) else {
                        log::warn!(
                            "wal replay: sample references unknown series {}",
                            sample.series
                        );
                        return Ok(());
                    };
                    let mut series = lock.write().expect("series lock poisoned");
                    if series.append(sample.timestamp, sample.value)? {
                        self.stats.sample_count += 1;
                        self.stats.widen(sample.timestamp);
                    }
                    Ok(())
                }
            }

            let mut replayer = Replayer {
                inner: &mut inner,
                stats: &mut stats,
            };
            wal.read_all(&mut replayer)?;
        }

        Ok(Self {
            inner: RwLock::new(inner),
            mapper: Mutex::new(PositionMapper::new()),
            stats: Mutex::new(stats),
            wal,
        })
    }

    /// Ingests a batch of hashed samples as a single unit. On
    /// success, returns the number of samples actually applied (excluding
    /// duplicate-timestamp rejects) and fills in `series_ref` on every
    /// input sample. On `OutOfOrderSample`/`AmendSample`/durability
    /// failure, the batch is rejected whole: neither the WAL nor any
    /// in-memory series has been touched.
    pub fn append_batch(&self, batch: &mut [HashedSample]) -> HeadResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut guard = self.inner.read().expect("head lock poisoned");

        // First pass: classify each sample against existing series, or
        // collect it as part of this batch's locally-new series.
        let mut resolutions = Vec::with_capacity(batch.len());
        let mut new_series: Vec<(u64, LabelSet)> = Vec::new();
        let mut dedup: AHashMap<u64, Vec<(LabelSet, usize)>> = AHashMap::new();

        for sample in batch.iter() {
            if let Some(series_ref) = guard.find_series(sample.hash, &sample.labels) {
                let series = guard.series[series_ref as usize]
                    .read()
                    .expect("series lock poisoned");
                if let Some(head) = series.head() {
                    if sample.timestamp < head.max_time {
                        return Err(HeadError::OutOfOrderSample {
                            series: series_ref,
                            max_time: head.max_time,
                            timestamp: sample.timestamp,
                        });
                    }
                    if sample.timestamp == head.max_time && sample.value != series.last_value {
                        return Err(HeadError::AmendSample {
                            series: series_ref,
                            timestamp: sample.timestamp,
                        });
                    }
                }
                resolutions.push(Resolution::Existing(series_ref));
            } else if let Some(&(_, idx)) = dedup
                .get(&sample.hash)
                .and_then(|v| v.iter().find(|(ls, _)| *ls == sample.labels))
            {
                resolutions.push(Resolution::New(idx));
            } else {
                let idx = new_series.len();
                new_series.push((sample.hash, sample.labels.clone()));
                dedup
                    .entry(sample.hash)
                    .or_default()
                    .push((sample.labels.clone(), idx));
                resolutions.push(Resolution::New(idx));
            }
        }

        // Series creation, under a briefly-upgraded exclusive lock.
        let mut tentative_final = Vec::with_capacity(new_series.len());
        let mut created_labels = Vec::with_capacity(new_series.len());
        let mut created_count = 0u64;
        if !new_series.is_empty() {
            drop(guard);
            {
                let mut w = self.inner.write().expect("head lock poisoned");
                for (hash, labels) in new_series.iter() {
                    // Re-validate: another batch may have created this
                    // exact series between the read-lock release above and
                    // this write-lock acquisition.
                    if let Some(existing) = w.find_series(*hash, labels) {
                        tentative_final.push(existing);
                    } else {
                        let series_ref = w.create_series(*hash, labels.clone())?;
                        tentative_final.push(series_ref);
                        created_labels.push(labels.clone());
                        created_count += 1;
                    }
                }
            }
            guard = self.inner.read().expect("head lock poisoned");
        }

        let final_refs: Vec<SeriesRef> = resolutions
            .iter()
            .map(|r| match r {
                Resolution::Existing(s) => *s,
                Resolution::New(idx) => tentative_final[*idx],
            })
            .collect();

        // Durability: the batch is logged before any in-memory apply, and
        // with exactly the samples apply is about to attempt. Replay runs
        // those same samples back through `MemSeries::append`, so a
        // duplicate-timestamp reject during ingest is rejected identically
        // on replay instead of silently appearing accepted.
        let wal_samples: Vec<WalSample> = batch
            .iter()
            .zip(final_refs.iter())
            .map(|(s, &series)| WalSample {
                series,
                timestamp: s.timestamp,
                value: s.value,
            })
            .collect();
        self.wal.log(&created_labels, &wal_samples)?;

        // Apply, in original batch order, so same-series samples are
        // applied in the order they arrived.
        let mut accepted = 0usize;
        let mut min_t = Timestamp::MAX;
        let mut max_t = Timestamp::MIN;
        let mut fatal: Option<HeadError> = None;
        for (sample, &series_ref) in batch.iter_mut().zip(final_refs.iter()) {
            sample.series_ref = Some(series_ref);
            let mut series = guard.series[series_ref as usize]
                .write()
                .expect("series lock poisoned");
            match series.append(sample.timestamp, sample.value) {
                Ok(true) => {
                    accepted += 1;
                    min_t = min_t.min(sample.timestamp);
                    max_t = max_t.max(sample.timestamp);
                }
                Ok(false) => {}
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }

        if accepted > 0 || created_count > 0 {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.sample_count += accepted as u64;
            stats.series_count += created_count;
            stats.chunk_count += created_count;
            if accepted > 0 {
                stats.widen(min_t);
                stats.widen(max_t);
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(accepted),
        }
    }

    /// Current block statistics.
    pub fn stats(&self) -> Stats {
        *self.stats.lock().expect("stats lock poisoned")
    }

    /// `SampleCount / (SeriesCount + 1) / 250`: the surrounding database's
    /// flush trigger. The `+1` avoids a division by zero on an empty
    /// block.
    pub fn fullness(&self) -> f64 {
        let stats = self.stats();
        stats.sample_count as f64 / (stats.series_count as f64 + 1.0) / FULLNESS_DENOMINATOR
    }

    /// Approximate resident memory of every series currently held, for the
    /// surrounding database's memory accounting. Does not include the
    /// label index or postings, which are comparatively small and cheap to
    /// recompute from the series list.
    pub fn memory_usage(&self) -> usize {
        let guard = self.inner.read().expect("head lock poisoned");
        guard
            .series
            .iter()
            .map(|s| s.read().expect("series lock poisoned").memory_usage())
            .sum()
    }

    /// Acquires the block's read lock for the duration of the returned
    /// reader, yielding both the index-side and series-side read views.
    pub fn reader(&self) -> HeadReader<'_, C> {
        HeadReader::new(self.inner.read().expect("head lock poisoned"))
    }

    /// Materializes `postings` into a list, ensures the position mapper is
    /// up to date with the current series count, and returns the list
    /// reordered to sorted-by-label-set rank. Needs both the block lock
    /// (to read every series' label set) and the mapper's own lock, so it
    /// lives on `HeadBlock` rather than on `IndexReader`/`SeriesReader`,
    /// which only ever hold the block lock.
    pub fn remap_postings(&self, postings: PostingsIterator<'_>) -> Vec<SeriesRef> {
        let refs = postings.into_vec();
        let labels: Vec<LabelSet> = {
            let guard = self.inner.read().expect("head lock poisoned");
            guard
                .series
                .iter()
                .map(|s| s.read().expect("series lock poisoned").labels.clone())
                .collect()
        };
        let mut mapper = self.mapper.lock().expect("mapper lock poisoned");
        mapper.update(&labels);
        mapper.sort(refs)
    }

    /// Flushes and releases the WAL.
    pub fn close(self) -> HeadResult<()> {
        self.wal.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::PlainChunk;
    use crate::labels::Label;

    fn open_block(dir: &std::path::Path) -> HeadBlock<PlainChunk> {
        HeadBlock::open(dir, Duration::from_secs(1)).unwrap()
    }

    fn sample(name: &str, t: Timestamp, v: f64) -> HashedSample {
        let labels = LabelSet::new(vec![Label::new("__name__", name)]);
        HashedSample::new(labels, t, v)
    }

    #[test]
    fn single_series_monotonic_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        let mut batch = vec![sample("x", 10, 1.0), sample("x", 20, 2.0), sample("x", 30, 3.0)];
        let accepted = block.append_batch(&mut batch).unwrap();
        assert_eq!(accepted, 3);

        let stats = block.stats();
        assert_eq!(stats.series_count, 1);
        assert_eq!(stats.sample_count, 3);
        assert_eq!(stats.min_time, 10);
        assert_eq!(stats.max_time, 30);

        let reader = block.reader();
        let values = reader.index().label_values(&["__name__"]).unwrap();
        assert_eq!(values, vec!["x".to_string()]);
        assert_eq!(
            reader
                .index()
                .postings("__name__", "x")
                .into_vec(),
            vec![0]
        );
    }

    #[test]
    fn out_of_order_sample_rejects_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        let mut first = vec![sample("x", 10, 1.0), sample("x", 20, 2.0), sample("x", 30, 3.0)];
        block.append_batch(&mut first).unwrap();
        let before = block.stats();

        let mut second = vec![sample("x", 25, 2.5)];
        let err = block.append_batch(&mut second).unwrap_err();
        assert!(matches!(err, HeadError::OutOfOrderSample { .. }));
        assert_eq!(block.stats(), before);
    }

    #[test]
    fn amend_sample_rejects_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        let mut first = vec![sample("x", 10, 1.0), sample("x", 20, 2.0), sample("x", 30, 3.0)];
        block.append_batch(&mut first).unwrap();
        let before = block.stats();

        let mut second = vec![sample("x", 30, 3.5)];
        let err = block.append_batch(&mut second).unwrap_err();
        assert!(matches!(err, HeadError::AmendSample { .. }));
        assert_eq!(block.stats(), before);
    }

    #[test]
    fn duplicate_batch_new_series_creates_one_series() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        let labels = LabelSet::new(vec![Label::new("a", "b")]);
        let mut batch = vec![
            HashedSample::new(labels.clone(), 10, 1.0),
            HashedSample::new(labels, 20, 2.0),
        ];
        let accepted = block.append_batch(&mut batch).unwrap();
        assert_eq!(accepted, 2);
        assert_eq!(block.stats().series_count, 1);
        assert_eq!(batch[0].series_ref, Some(0));
        assert_eq!(batch[1].series_ref, Some(0));
    }

    #[test]
    fn hash_collision_resolves_by_label_equality() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        let a = LabelSet::new(vec![Label::new("a", "1")]);
        let b = LabelSet::new(vec![Label::new("b", "2")]);
        let mut batch = vec![
            HashedSample {
                hash: 42,
                labels: a.clone(),
                timestamp: 10,
                value: 1.0,
                series_ref: None,
            },
            HashedSample {
                hash: 42,
                labels: b.clone(),
                timestamp: 10,
                value: 2.0,
                series_ref: None,
            },
        ];
        block.append_batch(&mut batch).unwrap();
        assert_eq!(batch[0].series_ref, Some(0));
        assert_eq!(batch[1].series_ref, Some(1));

        let reader = block.reader();
        assert_eq!(reader.index().postings("a", "1").into_vec(), vec![0]);
        assert_eq!(reader.index().postings("b", "2").into_vec(), vec![1]);
    }

    #[test]
    fn mapper_sorts_by_label_order() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        let mut batch = vec![sample("2", 1, 1.0), sample("1", 2, 1.0), sample("3", 3, 1.0)];
        block.append_batch(&mut batch).unwrap();

        let all = block.reader().index().postings("", "");
        let sorted = block.remap_postings(all);
        assert_eq!(sorted, vec![1, 0, 2]);
    }

    #[test]
    fn empty_label_set_only_matches_all_posting() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        let mut batch = vec![HashedSample::new(LabelSet::default(), 1, 1.0)];
        block.append_batch(&mut batch).unwrap();

        let reader = block.reader();
        assert_eq!(reader.index().label_indices(), Vec::<String>::new());
        assert_eq!(reader.index().postings("", "").into_vec(), vec![0]);
    }

    #[test]
    fn replay_reconstructs_equivalent_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let block = open_block(dir.path());
            let mut batch = vec![sample("x", 10, 1.0), sample("x", 20, 2.0)];
            block.append_batch(&mut batch).unwrap();
            block.close().unwrap();
        }

        let reopened = open_block(dir.path());
        let stats = reopened.stats();
        assert_eq!(stats.series_count, 1);
        assert_eq!(stats.sample_count, 2);
        assert_eq!(stats.min_time, 10);
        assert_eq!(stats.max_time, 20);

        let mut empty_batch: Vec<HashedSample> = Vec::new();
        assert_eq!(reopened.append_batch(&mut empty_batch).unwrap(), 0);
        assert_eq!(reopened.stats(), stats);
    }

    #[test]
    fn fullness_follows_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        assert_eq!(block.fullness(), 0.0);
        let mut batch = vec![sample("x", 1, 1.0)];
        block.append_batch(&mut batch).unwrap();
        // 1 sample / (1 series + 1) / 250
        assert!((block.fullness() - (1.0 / 2.0 / 250.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn memory_usage_grows_with_ingested_samples() {
        let dir = tempfile::tempdir().unwrap();
        let block = open_block(dir.path());
        assert_eq!(block.memory_usage(), 0);

        let mut batch = vec![sample("x", 1, 1.0), sample("x", 2, 2.0)];
        block.append_batch(&mut batch).unwrap();
        let after_one_series = block.memory_usage();
        assert!(after_one_series > 0);

        let mut batch = vec![sample("y", 1, 1.0)];
        block.append_batch(&mut batch).unwrap();
        assert!(block.memory_usage() > after_one_series);
    }
}
