use crate::series::SeriesRef;
use ahash::AHashMap;
use croaring::Bitmap;
use std::borrow::Cow;
use std::sync::LazyLock;

/// A `(label-name, label-value)` key into the postings index.
pub type Term = (String, String);

/// The reserved term whose postings list holds every series ID in the
/// block: the "match all" iterator used to enumerate the entire block.
pub static ALL_POSTINGS_TERM: LazyLock<Term> = LazyLock::new(|| (String::new(), String::new()));

static EMPTY_BITMAP: LazyLock<Bitmap> = LazyLock::new(Bitmap::new);

/// Inverted index from a label term to a strictly ascending list of series
/// IDs. Backed by a roaring bitmap per term: bitmaps iterate in ascending
/// order by construction, and their AND/OR operations underpin the
/// `intersect`/`merge` set-algebra helpers below.
#[derive(Clone, Default)]
pub struct Postings {
    by_term: AHashMap<Term, Bitmap>,
}

impl Postings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `series` to the postings list for `term`. A roaring bitmap's
    /// `add` is order-independent, but callers (series creation in
    /// HeadBlock) only ever call it with a freshly assigned, monotonically
    /// increasing ref, so the list stays in insertion order regardless.
    pub fn add(&mut self, series: SeriesRef, term: Term) {
        self.by_term.entry(term).or_default().add(series);
    }

    /// A lazy ascending iterator over the postings list for `term`; an empty
    /// iterator on miss.
    pub fn get(&self, term: &Term) -> PostingsIterator<'_> {
        match self.by_term.get(term) {
            Some(bmp) => PostingsIterator::from_bitmap(Cow::Borrowed(bmp)),
            None => PostingsIterator::from_bitmap(Cow::Borrowed(&EMPTY_BITMAP)),
        }
    }

    pub fn bitmap(&self, term: &Term) -> Cow<'_, Bitmap> {
        match self.by_term.get(term) {
            Some(bmp) => Cow::Borrowed(bmp),
            None => Cow::Borrowed(&EMPTY_BITMAP),
        }
    }

    pub fn all(&self) -> Cow<'_, Bitmap> {
        self.bitmap(&ALL_POSTINGS_TERM)
    }
}

/// A lazy ascending iterator over a postings list.
pub struct PostingsIterator<'a> {
    bitmap: Cow<'a, Bitmap>,
}

impl<'a> PostingsIterator<'a> {
    fn from_bitmap(bitmap: Cow<'a, Bitmap>) -> Self {
        Self { bitmap }
    }

    pub fn into_vec(self) -> Vec<SeriesRef> {
        self.bitmap.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = SeriesRef> + '_ {
        self.bitmap.iter()
    }
}

/// Standard merge-advance intersection on two ascending postings streams.
/// Only valid on monotonic iterators, which `Postings::get` guarantees.
pub fn intersect(a: &PostingsIterator, b: &PostingsIterator) -> Vec<SeriesRef> {
    let mut lhs = a.iter().peekable();
    let mut rhs = b.iter().peekable();
    let mut out = Vec::new();
    loop {
        match (lhs.peek(), rhs.peek()) {
            (Some(&x), Some(&y)) => {
                if x == y {
                    out.push(x);
                    lhs.next();
                    rhs.next();
                } else if x < y {
                    lhs.next();
                } else {
                    rhs.next();
                }
            }
            _ => break,
        }
    }
    out
}

/// Sorted union with dedup of two ascending postings streams.
pub fn merge(a: &PostingsIterator, b: &PostingsIterator) -> Vec<SeriesRef> {
    let mut lhs = a.iter().peekable();
    let mut rhs = b.iter().peekable();
    let mut out = Vec::new();
    loop {
        match (lhs.peek(), rhs.peek()) {
            (Some(&x), Some(&y)) => {
                if x == y {
                    out.push(x);
                    lhs.next();
                    rhs.next();
                } else if x < y {
                    out.push(x);
                    lhs.next();
                } else {
                    out.push(y);
                    rhs.next();
                }
            }
            (Some(&x), None) => {
                out.push(x);
                lhs.next();
            }
            (None, Some(&y)) => {
                out.push(y);
                rhs.next();
            }
            (None, None) => break,
        }
    }
    out
}
