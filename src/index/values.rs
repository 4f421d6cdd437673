use crate::error::{HeadError, HeadResult};
use ahash::AHashMap;
use std::collections::BTreeSet;

/// Label-value dictionary: `label-name -> set of label-values` seen across
/// every series in the block. Values are added idempotently on series
/// creation; a `BTreeSet` per name keeps per-name enumeration in
/// lexicographic order for free.
#[derive(Clone, Default)]
pub struct LabelValues {
    by_name: AHashMap<String, BTreeSet<String>>,
}

impl LabelValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        match self.by_name.get_mut(name) {
            Some(values) => {
                if !values.contains(value) {
                    values.insert(value.to_string());
                }
            }
            None => {
                let mut values = BTreeSet::new();
                values.insert(value.to_string());
                self.by_name.insert(name.to_string(), values);
            }
        }
    }

    /// Every label name that appears on at least one series, in
    /// lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.into_iter()
    }

    /// Every value seen for a single label name, in lexicographic order.
    /// This release indexes only single-name tuples: a request naming
    /// more than one label fails with `InvalidLabelValuesArgumentSize`.
    pub fn values(&self, names: &[&str]) -> HeadResult<Vec<String>> {
        if names.len() != 1 {
            return Err(HeadError::InvalidLabelValuesArgumentSize(names.len()));
        }
        Ok(self
            .by_name
            .get(names[0])
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default())
    }
}
