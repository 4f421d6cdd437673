//! The in-memory "head block" of a time-series database: the hot
//! write-path tier that ingests `(timestamp, value)` samples tagged with
//! label sets, indexes them for query, and durably records them in a
//! write-ahead log so the block can be reconstructed after a crash.
//!
//! Persistent immutable blocks, compaction, retention, and cross-block
//! query merging are out of scope. This crate is the concurrent ingest
//! path, the label index, and the replayable durability layer underneath
//! them, with a swappable [`chunk::Chunk`] codec and a built-in default
//! [`wal::Wal`].

pub mod chunk;
pub mod common;
pub mod error;
pub mod head;
pub mod index;
pub mod labels;
pub mod series;
pub mod wal;

pub use chunk::{Chunk, MemChunk, PlainChunk, CHUNK_TARGET, MAX_CHUNKS_PER_SERIES, MAX_SERIES_PER_BLOCK};
pub use common::{Sample, Timestamp};
pub use error::{HeadError, HeadResult};
pub use head::{
    decode_chunk_ref, encode_chunk_ref, ChunkHandle, ChunkMeta, ChunkRef, HashedSample, HeadBlock,
    HeadReader, IndexReader, SeriesReader, Stats,
};
pub use index::{
    intersect, merge, LabelValues, PositionMapper, Postings, PostingsIterator, Term,
    ALL_POSTINGS_TERM,
};
pub use labels::{Label, LabelSet};
pub use series::{MemSeries, SeriesIter, SeriesRef};
pub use wal::{ReplayHandler, Wal, WalSample};
