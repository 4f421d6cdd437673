use crate::common::Timestamp;
use crate::error::HeadResult;
use crate::labels::LabelSet;
use crate::series::SeriesRef;
use serde::{Deserialize, Serialize};

/// A single sample as recorded in a WAL batch record: the series it
/// resolved to (possibly one declared earlier in this same record) plus
/// its timestamp and value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalSample {
    pub series: SeriesRef,
    pub timestamp: Timestamp,
    pub value: f64,
}

/// One WAL record: zero or more newly declared label sets followed by the
/// sample batch that references them (some new, some pre-existing).
/// Declarations and samples are always written together so a crash can
/// never observe samples referencing a series whose declaration wasn't
/// made durable first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct WalRecord {
    pub series: Vec<LabelSet>,
    pub samples: Vec<WalSample>,
}

/// Callback interface driven by `Wal::read_all` during replay. Declarations
/// and samples fire in the exact order the original `log` calls recorded
/// them, reproducing ingest order across the whole log.
pub trait ReplayHandler {
    fn series(&mut self, labels: LabelSet) -> HeadResult<()>;
    fn sample(&mut self, sample: WalSample) -> HeadResult<()>;
}
