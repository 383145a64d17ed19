use crate::definition::{
    BIN_BOTTOM_PREFIX, BIN_CENTER_PREFIX, BIN_COUNT, BIN_TOP_PREFIX, ERRORBAR_HIGH, ERRORBAR_LOW,
};
use crate::source::ColumnSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Published result of a histogram: named flat arrays, one entry per flat bin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDataset {
    strides: Vec<usize>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl OutputDataset {
    pub fn new(strides: Vec<usize>) -> Self {
        Self {
            strides,
            columns: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.len());
        self.columns.insert(name.into(), values);
    }

    /// Number of flat bins; every column has this length.
    pub fn len(&self) -> usize {
        self.strides.last().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn bin_count(&self) -> Option<&[f64]> {
        self.get(BIN_COUNT)
    }

    pub fn errorbar_low(&self) -> Option<&[f64]> {
        self.get(ERRORBAR_LOW)
    }

    pub fn errorbar_high(&self) -> Option<&[f64]> {
        self.get(ERRORBAR_HIGH)
    }

    pub fn bin_bottom(&self, axis: usize) -> Option<&[f64]> {
        self.get(&format!("{BIN_BOTTOM_PREFIX}{axis}"))
    }

    pub fn bin_center(&self, axis: usize) -> Option<&[f64]> {
        self.get(&format!("{BIN_CENTER_PREFIX}{axis}"))
    }

    pub fn bin_top(&self, axis: usize) -> Option<&[f64]> {
        self.get(&format!("{BIN_TOP_PREFIX}{axis}"))
    }

    /// Sum of `bin_count`, i.e. the in-range entries (or weight) of the histogram.
    pub fn total(&self) -> f64 {
        self.bin_count().map(|c| c.iter().sum()).unwrap_or(0.0)
    }
}

// Lets one histogram's output feed another engine (e.g. re-binning bin centers).
impl ColumnSource for OutputDataset {
    fn num_rows(&self) -> usize {
        if self.columns.is_empty() {
            0
        } else {
            self.len()
        }
    }

    fn column(&self, name: &str) -> Option<&[f64]> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emptiness_follows_bin_count() {
        assert!(OutputDataset::default().is_empty());
        let out = OutputDataset::new(vec![1, 3]);
        assert_eq!(out.len(), 3);
        assert!(!out.is_empty());
        // no columns yet, so nothing to read as a source
        assert_eq!(out.num_rows(), 0);
    }
}
