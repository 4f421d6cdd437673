use super::{decode_chunk_ref, encode_chunk_ref, ChunkRef, Inner};
use crate::chunk::Chunk;
use crate::common::Timestamp;
use crate::error::{HeadError, HeadResult};
use crate::index::PostingsIterator;
use crate::labels::LabelSet;
use crate::series::{MemSeries, SeriesIter, SeriesRef};
use std::sync::RwLockReadGuard;

/// A chunk's time range and packed reference, without its sample body:
/// what `SeriesReader::series` returns per chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkMeta {
    pub min_time: Timestamp,
    pub max_time: Timestamp,
    pub chunk_ref: ChunkRef,
}

/// Holds the HeadBlock's read lock for the duration of a read operation
/// and hands out the `IndexReader`/`SeriesReader` pair, both borrowing
/// from the same lock acquisition.
pub struct HeadReader<'a, C: Chunk> {
    guard: RwLockReadGuard<'a, Inner<C>>,
}

impl<'a, C: Chunk> HeadReader<'a, C> {
    pub(super) fn new(guard: RwLockReadGuard<'a, Inner<C>>) -> Self {
        Self { guard }
    }

    pub fn index(&self) -> IndexReader<'_, C> {
        IndexReader { inner: &self.guard }
    }

    pub fn series(&self) -> SeriesReader<'_, C> {
        SeriesReader { inner: &self.guard }
    }
}

/// Label and postings lookups.
pub struct IndexReader<'a, C: Chunk> {
    inner: &'a Inner<C>,
}

impl<C: Chunk> IndexReader<'_, C> {
    /// The postings list for `(name, value)`, ascending by series ID.
    pub fn postings(&self, name: &str, value: &str) -> PostingsIterator<'_> {
        self.inner.postings.get(&(name.to_string(), value.to_string()))
    }

    /// Every value seen for a single label name, in lexicographic order.
    /// Fails with `InvalidLabelValuesArgumentSize` unless exactly one name
    /// is given; this release indexes only single-name tuples.
    pub fn label_values(&self, names: &[&str]) -> HeadResult<Vec<String>> {
        self.inner.values.values(names)
    }

    /// The list of single-name tuples currently indexed.
    pub fn label_indices(&self) -> Vec<String> {
        self.inner.values.names().map(str::to_string).collect()
    }
}

/// Per-series lookups: label set plus chunk metadata, and chunk iteration.
pub struct SeriesReader<'a, C: Chunk> {
    inner: &'a Inner<C>,
}

impl<'a, C: Chunk> SeriesReader<'a, C> {
    /// The label set and chunk metadata for `id`, in chunk order.
    pub fn series(&self, id: SeriesRef) -> HeadResult<(LabelSet, Vec<ChunkMeta>)> {
        let lock = self
            .inner
            .series
            .get(id as usize)
            .ok_or(HeadError::NotFound(id))?;
        let series = lock.read().expect("series lock poisoned");
        let metas = series
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| ChunkMeta {
                min_time: c.min_time,
                max_time: c.max_time,
                chunk_ref: encode_chunk_ref(id, i),
            })
            .collect();
        Ok((series.labels.clone(), metas))
    }

    /// Decodes `chunk_ref` and returns a handle holding a shared lock on
    /// the enclosing series for the handle's lifetime, so a concurrent
    /// writer can keep appending to other series, and even cut a new chunk
    /// on this one, without blocking an in-flight reader's iterator.
    pub fn chunk(&self, chunk_ref: ChunkRef) -> HeadResult<ChunkHandle<'a, C>> {
        let (series_id, index) = decode_chunk_ref(chunk_ref);
        let lock = self
            .inner
            .series
            .get(series_id as usize)
            .ok_or(HeadError::NotFound(series_id))?;
        let guard = lock.read().expect("series lock poisoned");
        if index >= guard.chunks.len() {
            return Err(HeadError::OutOfBounds(series_id));
        }
        Ok(ChunkHandle { guard, index })
    }
}

/// A chunk read handle. Borrows the series' read lock for as long as the
/// handle (and the iterator it yields) is alive.
pub struct ChunkHandle<'a, C: Chunk> {
    guard: RwLockReadGuard<'a, MemSeries<C>>,
    index: usize,
}

impl<C: Chunk> ChunkHandle<'_, C> {
    pub fn min_time(&self) -> Timestamp {
        self.guard.chunks[self.index].min_time
    }

    pub fn max_time(&self) -> Timestamp {
        self.guard.chunks[self.index].max_time
    }

    pub fn samples(&self) -> usize {
        self.guard.chunks[self.index].samples
    }

    /// The tail-spliced, reader-safe iterator over this chunk's samples.
    pub fn iter(&self) -> SeriesIter<'_> {
        self.guard.iterator(self.index)
    }
}
