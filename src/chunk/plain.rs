use super::Chunk;
use crate::common::{Sample, Timestamp};
use get_size::GetSize;
use std::mem::size_of;

/// Default, uncompressed `Chunk` implementation: a plain append-only vector
/// of samples. Stands in for a real compression codec: correct and
/// simple, not space-efficient.
#[derive(Debug, Default, Clone, GetSize)]
pub struct PlainChunk {
    samples: Vec<Sample>,
}

impl Chunk for PlainChunk {
    fn append(&mut self, t: Timestamp, v: f64) {
        self.samples.push(Sample::new(t, v));
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Sample> + '_> {
        Box::new(self.samples.iter().copied())
    }

    fn bytes(&self) -> usize {
        self.samples.len() * size_of::<Sample>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_iterates_in_order() {
        let mut chunk = PlainChunk::default();
        chunk.append(10, 1.0);
        chunk.append(20, 2.0);
        let collected: Vec<_> = chunk.iter().collect();
        assert_eq!(collected, vec![Sample::new(10, 1.0), Sample::new(20, 2.0)]);
    }

    #[test]
    fn bytes_scales_with_sample_count() {
        let mut chunk = PlainChunk::default();
        assert_eq!(chunk.bytes(), 0);
        chunk.append(1, 1.0);
        assert_eq!(chunk.bytes(), size_of::<Sample>());
    }
}
