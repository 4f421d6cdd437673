mod iter;
mod tail_buffer;

pub use iter::SeriesIter;
use tail_buffer::TailBuffer;

use crate::chunk::{Chunk, MemChunk, MAX_CHUNKS_PER_SERIES};
use crate::common::{Sample, Timestamp};
use crate::error::{HeadError, HeadResult};
use crate::labels::LabelSet;

/// Dense, insertion-order series identifier. At most `MAX_SERIES_PER_BLOCK`
/// may exist in one head block (packed chunk ref).
pub type SeriesRef = u32;

/// Per-series mutable state: label set, chunk list, recent-sample tail
/// buffer, active appender.
///
/// Invariants: for `i < j`, `chunks[i].max_time <= chunks[j].min_time`;
/// within a chunk, appended timestamps are non-decreasing; the newest
/// sample's time equals `chunks.last().max_time`.
#[derive(Debug)]
pub struct MemSeries<C: Chunk> {
    pub id: SeriesRef,
    pub labels: LabelSet,
    pub chunks: Vec<MemChunk<C>>,
    pub last_value: f64,
    tail: TailBuffer,
}

impl<C: Chunk> MemSeries<C> {
    pub fn new(id: SeriesRef, labels: LabelSet) -> Self {
        Self {
            id,
            labels,
            chunks: Vec::new(),
            last_value: f64::NAN,
            tail: TailBuffer::default(),
        }
    }

    /// The last (currently open) chunk, if any sample has been appended yet.
    pub fn head(&self) -> Option<&MemChunk<C>> {
        self.chunks.last()
    }

    /// Appends a sample, cutting a new chunk when the head chunk is full or
    /// absent. Returns `Ok(false)` on a duplicate-timestamp mismatch reject
    /// (callers may choose to pre-filter these before reaching here); `Err`
    /// only on the chunks-per-series capacity violation.
    pub fn append(&mut self, t: Timestamp, v: f64) -> HeadResult<bool> {
        let needs_cut = match self.head() {
            None => true,
            Some(head) => head.is_full(),
        };

        if needs_cut {
            if self.chunks.len() as u32 >= MAX_CHUNKS_PER_SERIES {
                return Err(HeadError::ChunkCapacityExceeded(MAX_CHUNKS_PER_SERIES));
            }
            self.chunks.push(MemChunk::new(Sample::new(t, v)));
        } else {
            let head = self.chunks.last_mut().expect("checked above");
            if head.max_time == t && v != self.last_value {
                return Ok(false);
            }
            head.append(Sample::new(t, v));
        }

        self.last_value = v;
        self.tail.push(Sample::new(t, v));
        Ok(true)
    }

    /// An iterator over chunk `i`. For the tail (last) chunk this is the
    /// "safe iterator": it reads the codec body for all samples except the
    /// last `min(4, samples)`, served instead from the in-memory tail
    /// buffer, so a concurrent reader never races an in-progress codec
    /// encode at the very end of the stream.
    pub fn iterator(&self, index: usize) -> SeriesIter<'_> {
        let chunk = &self.chunks[index];
        let is_tail = index + 1 == self.chunks.len();
        if !is_tail {
            return SeriesIter::direct(chunk.chunk.iter());
        }
        let buffered = self.tail.len().min(chunk.samples);
        let from_codec = chunk.samples - buffered;
        SeriesIter::safe(chunk.chunk.iter(), from_codec, self.tail.last_n(buffered))
    }

    /// Approximate resident memory: the struct itself plus every field's
    /// heap allocation (label names/values, chunk codec bodies).
    pub fn memory_usage(&self) -> usize {
        use get_size::GetSize;
        std::mem::size_of::<Self>()
            + self.labels.get_heap_size()
            + self.chunks.iter().map(GetSize::get_heap_size).sum::<usize>()
    }
}
