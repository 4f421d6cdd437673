pub mod hash;

use get_size::GetSize;

/// Millisecond-resolution timestamp. Monotonic per series.
pub type Timestamp = i64;

#[derive(Debug, Clone, Copy, PartialEq, GetSize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}
