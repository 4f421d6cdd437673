use crate::common::Sample;
use smallvec::SmallVec;

/// Iterator returned by `MemSeries::iterator`. `Safe` transparently splices
/// the codec body with the in-memory tail buffer; `Direct` is a plain
/// pass-through for non-tail chunks.
pub enum SeriesIter<'a> {
    Direct(Box<dyn Iterator<Item = Sample> + 'a>),
    Safe {
        body: std::iter::Take<Box<dyn Iterator<Item = Sample> + 'a>>,
        tail: std::vec::IntoIter<Sample>,
    },
}

impl<'a> SeriesIter<'a> {
    pub(super) fn direct(body: Box<dyn Iterator<Item = Sample> + 'a>) -> Self {
        SeriesIter::Direct(body)
    }

    pub(super) fn safe(
        body: Box<dyn Iterator<Item = Sample> + 'a>,
        from_codec: usize,
        tail: SmallVec<Sample, 4>,
    ) -> Self {
        let tail: Vec<Sample> = tail.into_iter().collect();
        SeriesIter::Safe {
            body: body.take(from_codec),
            tail: tail.into_iter(),
        }
    }
}

impl Iterator for SeriesIter<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SeriesIter::Direct(it) => it.next(),
            SeriesIter::Safe { body, tail } => body.next().or_else(|| tail.next()),
        }
    }
}
