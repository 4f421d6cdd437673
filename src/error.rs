use crate::common::Timestamp;
use crate::series::SeriesRef;
use thiserror::Error;

/// Errors surfaced by the head block. The core recovers nothing internally;
/// every failure carries enough context for the caller to decide batch retry,
/// block rotation, or shutdown.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum HeadError {
    #[error("out of order sample: series {series} has max time {max_time}, got {timestamp}")]
    OutOfOrderSample {
        series: SeriesRef,
        max_time: Timestamp,
        timestamp: Timestamp,
    },

    #[error("amend sample: series {series} already has a value at {timestamp}")]
    AmendSample {
        series: SeriesRef,
        timestamp: Timestamp,
    },

    #[error("series id {0} is out of bounds")]
    OutOfBounds(SeriesRef),

    #[error("series id {0} not found")]
    NotFound(SeriesRef),

    #[error("label-values query requires exactly one label name, got {0}")]
    InvalidLabelValuesArgumentSize(usize),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    #[error("WAL read failed: {0}")]
    WalRead(String),

    #[error("series capacity exceeded: at most {0} series per block")]
    SeriesCapacityExceeded(u32),

    #[error("chunk capacity exceeded: at most {0} chunks per series")]
    ChunkCapacityExceeded(u32),
}

pub type HeadResult<T = ()> = Result<T, HeadError>;
