mod plain;

pub use plain::PlainChunk;

use crate::common::{Sample, Timestamp};
use get_size::GetSize;

/// Cut threshold for a chunk. Chosen so chunks stay within a compression
/// codec's efficient range while bounding the cost of any single
/// encode/decode. A policy constant, not an invariant: implementations may
/// tune it but must preserve ordering and the 256-chunks-per-series limit.
pub const CHUNK_TARGET: usize = 10050;

/// At most 256 chunks per series (8 bits of the packed chunk ref).
pub const MAX_CHUNKS_PER_SERIES: u32 = 256;

/// At most 2^24 series per block (24 bits of the packed chunk ref).
pub const MAX_SERIES_PER_BLOCK: u32 = 1 << 24;

/// The chunk abstraction the head block depends on. The concrete codec
/// (XOR/Gorilla-style compression) is a pluggable collaborator, not
/// something this crate implements; callers may supply any type satisfying
/// this trait. Implementations may assume timestamps are non-decreasing.
pub trait Chunk: Default + Send + Sync + std::fmt::Debug + GetSize {
    /// Appends a sample. Callers (MemSeries::append) guarantee `t` is
    /// non-decreasing relative to prior appends on this chunk.
    fn append(&mut self, t: Timestamp, v: f64);

    /// Iterates samples in append order.
    fn iter(&self) -> Box<dyn Iterator<Item = Sample> + '_>;

    /// Size in bytes if this chunk were persisted, for flush/size accounting.
    fn bytes(&self) -> usize;
}

/// A compressed chunk plus the metadata the head block needs without
/// decoding it: time range and sample count.
///
/// Invariant: `min_time <= max_time`; `samples <= CHUNK_TARGET`.
#[derive(Debug, GetSize)]
pub struct MemChunk<C: Chunk> {
    pub chunk: C,
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub samples: usize,
}

impl<C: Chunk> MemChunk<C> {
    pub fn new(first: Sample) -> Self {
        let mut chunk = C::default();
        chunk.append(first.timestamp, first.value);
        Self {
            chunk,
            min_time: first.timestamp,
            max_time: first.timestamp,
            samples: 1,
        }
    }

    pub fn append(&mut self, sample: Sample) {
        self.chunk.append(sample.timestamp, sample.value);
        self.max_time = sample.timestamp;
        self.samples += 1;
    }

    pub fn is_full(&self) -> bool {
        self.samples >= CHUNK_TARGET
    }
}
