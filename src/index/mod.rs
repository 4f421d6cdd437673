mod mapper;
mod postings;
mod values;

pub use mapper::PositionMapper;
pub use postings::{intersect, merge, Postings, PostingsIterator, Term, ALL_POSTINGS_TERM};
pub use values::LabelValues;
