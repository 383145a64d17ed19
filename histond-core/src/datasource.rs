//! Live N-dimensional histogram over a [`ColumnSource`].
//!
//! The engine recomputes in two stages. [`HistogramDataSource::update_range`] derives
//! the axis descriptors, strides and edge arrays (scanning the data for auto-ranged
//! axes) and invalidates the row → bin cache when they moved.
//! [`HistogramDataSource::update_data`] then re-aggregates every output array from the
//! cache and publishes a fresh [`OutputDataset`] to subscribers.

use crate::binning::{Binning, Dimension};
use crate::cache::{BinIndexCache, BinSlot};
use crate::definition::{
    AuxHistogram, HistogramSpec, Weights, BIN_BOTTOM_PREFIX, BIN_CENTER_PREFIX, BIN_COUNT,
    BIN_TOP_PREFIX, ERRORBAR_HIGH, ERRORBAR_LOW,
};
use crate::output::OutputDataset;
use crate::source::ColumnSource;
use histond_common::{HistondError, Result};
use std::collections::BTreeMap;
use tracing::debug;

type Listener = Box<dyn FnMut(&OutputDataset)>;

pub struct HistogramDataSource<S: ColumnSource> {
    source: S,
    spec: HistogramSpec,
    binning: Binning,
    cache: BinIndexCache,
    edges: Vec<(String, Vec<f64>)>,
    output: OutputDataset,
    listeners: Vec<(usize, Listener)>,
    next_listener: usize,
}

impl<S: ColumnSource> HistogramDataSource<S> {
    /// Validate `spec` against `source` and compute the initial output.
    pub fn new(source: S, spec: HistogramSpec) -> Result<Self> {
        spec.validate()?;
        check_view(spec.view.as_deref(), source.num_rows())?;
        let mut ds = Self {
            source,
            spec,
            binning: Binning::default(),
            cache: BinIndexCache::new(),
            edges: Vec::new(),
            output: OutputDataset::default(),
            listeners: Vec::new(),
            next_listener: 0,
        };
        ds.cache.invalidate_all(ds.source.num_rows());
        ds.update_range()?;
        Ok(ds)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn spec(&self) -> &HistogramSpec {
        &self.spec
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    pub fn output(&self) -> &OutputDataset {
        &self.output
    }

    /// `strides[i]` for `i` in `0..=dim`; `stride(dim)` is the flat bin count.
    pub fn stride(&self, i: usize) -> Option<usize> {
        self.binning.stride(i)
    }

    /// Register a callback run after every successful recompute. Returns an id for
    /// [`HistogramDataSource::unsubscribe`].
    pub fn subscribe(&mut self, listener: impl FnMut(&OutputDataset) + 'static) -> usize {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: usize) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Change-event handler for the source: drop every cached bin, then rebuild.
    pub fn source_changed(&mut self) -> Result<()> {
        let rows = self.source.num_rows();
        debug!(rows, "source changed, invalidating bin cache");
        self.cache.invalidate_all(rows);
        check_view(self.spec.view.as_deref(), rows)?;
        self.update_range()
    }

    /// Swap in a new source and rebuild. Returns the previous source.
    pub fn replace_source(&mut self, source: S) -> Result<S> {
        let old = std::mem::replace(&mut self.source, source);
        self.source_changed()?;
        Ok(old)
    }

    /// Mutate the source in place, then rebuild.
    pub fn modify_source<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        let r = f(&mut self.source);
        self.source_changed()?;
        Ok(r)
    }

    /// Change the sample variables and their bin counts together.
    pub fn set_sample_variables(&mut self, sample_variables: Vec<String>, nbins: Vec<usize>) -> Result<()> {
        let previous = self.reconfigure(|s| {
            s.sample_variables = sample_variables;
            s.nbins = nbins;
            // explicit ranges belong to the old axes
            if s.range.as_ref().is_some_and(|r| r.len() != s.sample_variables.len()) {
                s.range = None;
            }
        })?;
        // same ranges on different columns still map rows to different bins
        let rows = self.source.num_rows();
        self.cache.invalidate_all(rows);
        let result = self.update_range();
        if result.is_err() {
            self.spec = previous;
            self.cache.invalidate_all(rows);
        }
        result
    }

    pub fn set_nbins(&mut self, nbins: Vec<usize>) -> Result<()> {
        let previous = self.reconfigure(|s| s.nbins = nbins)?;
        self.rebuild_or_restore(previous, Self::update_range)
    }

    /// Set explicit bounds per axis (`None` entries are computed from the data), or
    /// clear them all with `None`.
    pub fn set_range(&mut self, range: Option<Vec<Option<[f64; 2]>>>) -> Result<()> {
        let previous = self.reconfigure(|s| s.range = range)?;
        self.rebuild_or_restore(previous, Self::update_range)
    }

    pub fn set_view(&mut self, view: Option<Vec<usize>>) -> Result<()> {
        check_view(view.as_deref(), self.source.num_rows())?;
        let previous = self.reconfigure(|s| s.view = view)?;
        self.rebuild_or_restore(previous, Self::update_range)
    }

    pub fn set_weights(&mut self, weights: Weights) -> Result<()> {
        let previous = self.reconfigure(|s| s.weights = weights)?;
        self.rebuild_or_restore(previous, |ds| ds.update_data(None))
    }

    pub fn set_histograms(&mut self, histograms: BTreeMap<String, AuxHistogram>) -> Result<()> {
        let previous = self.reconfigure(|s| s.histograms = histograms)?;
        self.rebuild_or_restore(previous, |ds| ds.update_data(None))
    }

    // applies `f` to a copy of the definition and commits it only if it validates;
    // returns the definition it replaced
    fn reconfigure(&mut self, f: impl FnOnce(&mut HistogramSpec)) -> Result<HistogramSpec> {
        let mut next = self.spec.clone();
        f(&mut next);
        next.validate()?;
        Ok(std::mem::replace(&mut self.spec, next))
    }

    fn rebuild_or_restore(
        &mut self,
        previous: HistogramSpec,
        rebuild: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        if let Err(e) = rebuild(self) {
            self.spec = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Recompute axis descriptors, strides and edge arrays, then re-aggregate the
    /// data as [`HistogramDataSource::update_data`] does.
    ///
    /// Nothing is committed when a column is missing: binning, output and
    /// subscribers all keep their previous state.
    pub fn update_range(&mut self) -> Result<()> {
        let rows = self.source.num_rows();
        let view = self.spec.view.as_deref();
        let mut auto_ranged = false;
        let mut dims = Vec::with_capacity(self.spec.dim());
        for (i, name) in self.spec.sample_variables.iter().enumerate() {
            let [lo, hi] = match self.spec.axis_range(i) {
                Some(r) => r,
                None => {
                    auto_ranged = true;
                    let column = self
                        .source
                        .column(name)
                        .ok_or_else(|| HistondError::MissingColumn(name.clone()))?;
                    scan_range(column, view)
                }
            };
            dims.push(Dimension::new(self.spec.nbins[i], lo, hi));
        }
        let binning = Binning::new(dims);
        // auto ranges always invalidate: proving them unchanged would cost another pass
        let stale = auto_ranged || binning != self.binning || self.cache.len() != rows;
        if stale {
            self.cache.invalidate_all(rows);
        }
        let edges = edge_columns(&binning);
        let output = match build_output(&self.source, &self.spec, &binning, &edges, &mut self.cache) {
            Ok(output) => output,
            Err(e) => {
                // the cache may now hold bins of the rejected binning
                if stale {
                    self.cache.invalidate_all(rows);
                }
                return Err(e);
            }
        };
        debug!(strides = ?binning.strides(), auto_ranged, stale, "binning updated");
        self.binning = binning;
        self.edges = edges;
        self.publish(output);
        Ok(())
    }

    /// Flat bin of `row`, or `None` for rows outside the binned domain.
    ///
    /// Memoized: a second call for the same row does not touch the source until the
    /// cache is invalidated.
    pub fn resolve_bin(&mut self, row: usize) -> Result<Option<usize>> {
        match self.cache.get(row) {
            BinSlot::Bin(b) => return Ok(Some(b)),
            BinSlot::Overflow => return Ok(None),
            BinSlot::Pending => {}
        }
        let samples = sample_columns(&self.source, &self.spec.sample_variables)?;
        let binning = &self.binning;
        Ok(self
            .cache
            .resolve(row, || binning.locate(|i| samples[i].get(row).copied())))
    }

    /// Fill a flat bin array over the effective rows (the view, or every row): +1 per
    /// row, or + the row's weight. Rows outside the binned domain are dropped.
    ///
    /// Rows whose weight is NaN (a null in the loaded column) are dropped as well
    /// rather than summed, so one missing weight does not turn its whole bin into NaN.
    pub fn aggregate(&mut self, weights: &Weights) -> Result<Vec<f64>> {
        aggregate_rows(&self.source, &self.spec, &self.binning, &mut self.cache, weights)
    }

    /// Re-aggregate `bin_count`, the error bars and every auxiliary histogram, then
    /// publish them together with the edge arrays and notify subscribers.
    ///
    /// `changed_rows` is a hint for incremental updates; it is currently ignored and
    /// every call recomputes in full. Nothing is published when any aggregation fails.
    pub fn update_data(&mut self, changed_rows: Option<&[usize]>) -> Result<()> {
        if let Some(rows) = changed_rows {
            debug!(hinted = rows.len(), "row hint ignored, recomputing in full");
        }
        let output = build_output(&self.source, &self.spec, &self.binning, &self.edges, &mut self.cache)?;
        self.publish(output);
        Ok(())
    }

    fn publish(&mut self, output: OutputDataset) {
        self.output = output;
        for (_, listener) in &mut self.listeners {
            listener(&self.output);
        }
    }
}

fn edge_columns(binning: &Binning) -> Vec<(String, Vec<f64>)> {
    (0..binning.dim())
        .flat_map(|axis| {
            let e = binning.axis_edges(axis);
            [
                (format!("{BIN_BOTTOM_PREFIX}{axis}"), e.bottom),
                (format!("{BIN_CENTER_PREFIX}{axis}"), e.center),
                (format!("{BIN_TOP_PREFIX}{axis}"), e.top),
            ]
        })
        .collect()
}

fn build_output<S: ColumnSource>(
    source: &S,
    spec: &HistogramSpec,
    binning: &Binning,
    edges: &[(String, Vec<f64>)],
    cache: &mut BinIndexCache,
) -> Result<OutputDataset> {
    let bin_count = aggregate_rows(source, spec, binning, cache, &spec.weights)?;
    let mut aux = Vec::with_capacity(spec.histograms.len());
    for (name, h) in &spec.histograms {
        aux.push((name, aggregate_rows(source, spec, binning, cache, &h.weights)?));
    }

    // low = count + sqrt(count) and high = count - sqrt(count); downstream plots
    // read these exact values, so the names stay as published.
    let errorbar_low = bin_count.iter().map(|c| c + c.sqrt()).collect();
    let errorbar_high = bin_count.iter().map(|c| c - c.sqrt()).collect();

    let mut output = OutputDataset::new(binning.strides().to_vec());
    for (name, values) in edges {
        output.insert(name.clone(), values.clone());
    }
    output.insert(BIN_COUNT, bin_count);
    output.insert(ERRORBAR_LOW, errorbar_low);
    output.insert(ERRORBAR_HIGH, errorbar_high);
    for (name, values) in aux {
        output.insert(name.clone(), values);
    }
    Ok(output)
}

fn aggregate_rows<S: ColumnSource>(
    source: &S,
    spec: &HistogramSpec,
    binning: &Binning,
    cache: &mut BinIndexCache,
    weights: &Weights,
) -> Result<Vec<f64>> {
    let total = binning.total_bins();
    let weight_values = match weights {
        Weights::Unweighted => None,
        Weights::Column(name) => Some(
            source
                .column(name)
                .ok_or_else(|| HistondError::MissingColumn(name.clone()))?,
        ),
    };
    let samples = sample_columns(source, &spec.sample_variables)?;
    let mut bins = vec![0.0; total];
    let mut dropped = 0usize;
    let mut fill = |row: usize| {
        let bin = cache.resolve(row, || binning.locate(|i| samples[i].get(row).copied()));
        match bin {
            Some(b) if b < total => {
                let w = match weight_values {
                    Some(w) => w.get(row).copied().unwrap_or(f64::NAN),
                    None => 1.0,
                };
                if w.is_nan() {
                    dropped += 1;
                } else {
                    bins[b] += w;
                }
            }
            _ => dropped += 1,
        }
    };
    match spec.view.as_deref() {
        Some(view) => view.iter().for_each(|&row| fill(row)),
        None => (0..source.num_rows()).for_each(&mut fill),
    }
    debug!(weights = ?weights.column_name(), total, dropped, "aggregated");
    Ok(bins)
}

fn sample_columns<'a, S: ColumnSource>(source: &'a S, names: &[String]) -> Result<Vec<&'a [f64]>> {
    names
        .iter()
        .map(|n| {
            source
                .column(n)
                .ok_or_else(|| HistondError::MissingColumn(n.clone()))
        })
        .collect()
}

fn check_view(view: Option<&[usize]>, rows: usize) -> Result<()> {
    match view.and_then(|v| v.iter().find(|&&r| r >= rows)) {
        Some(r) => Err(HistondError::InvalidConfig(format!(
            "view row {r} out of bounds for {rows} rows"
        ))),
        None => Ok(()),
    }
}

/// Min/max of the finite values of `column` (restricted to `view`). A column with
/// no finite values yields the degenerate range `[0, 0]`.
fn scan_range(column: &[f64], view: Option<&[usize]>) -> [f64; 2] {
    let fold = |(lo, hi): (f64, f64), v: f64| {
        if v.is_finite() {
            (lo.min(v), hi.max(v))
        } else {
            (lo, hi)
        }
    };
    let init = (f64::INFINITY, f64::NEG_INFINITY);
    let (lo, hi) = match view {
        Some(rows) => rows
            .iter()
            .filter_map(|&r| column.get(r).copied())
            .fold(init, fold),
        None => column.iter().copied().fold(init, fold),
    };
    if lo > hi {
        [0.0, 0.0]
    } else {
        [lo, hi]
    }
}
