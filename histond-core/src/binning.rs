//! Axis descriptors and the mixed-radix flat bin layout.

use serde::{Deserialize, Serialize};

/// One histogram axis: bin count plus the affine transform mapping a sample value to
/// its fractional bin coordinate (`value * transform_scale - transform_origin`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub nbins: usize,
    pub range_min: f64,
    pub range_max: f64,
    pub transform_scale: f64,
    pub transform_origin: f64,
}

impl Dimension {
    pub fn new(nbins: usize, range_min: f64, range_max: f64) -> Self {
        let transform_scale = nbins as f64 / (range_max - range_min);
        Self {
            nbins,
            range_min,
            range_max,
            transform_scale,
            transform_origin: range_min * transform_scale,
        }
    }

    pub fn bin_width(&self) -> f64 {
        1.0 / self.transform_scale
    }

    /// Bin coordinate of `value` along this axis, or `None` when it lies outside
    /// `[range_min, range_max]` (NaN included). The upper edge belongs to the last bin.
    pub fn coordinate(&self, value: f64) -> Option<usize> {
        if value == self.range_max {
            return Some(self.nbins - 1);
        }
        if !(value >= self.range_min && value <= self.range_max) {
            return None;
        }
        let c = (value * self.transform_scale - self.transform_origin).floor();
        // rounding can push values hugging an edge one bin outside the axis
        Some((c.max(0.0) as usize).min(self.nbins - 1))
    }
}

/// Edge arrays for one axis, one entry per flat bin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisEdges {
    pub bottom: Vec<f64>,
    pub center: Vec<f64>,
    pub top: Vec<f64>,
}

/// All axes of a histogram and their strides: `strides[0] = 1`,
/// `strides[i + 1] = strides[i] * nbins[i]`, so `strides[dim]` is the flat bin count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    dims: Vec<Dimension>,
    strides: Vec<usize>,
}

impl Default for Binning {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Binning {
    pub fn new(dims: Vec<Dimension>) -> Self {
        let mut strides = Vec::with_capacity(dims.len() + 1);
        strides.push(1);
        for (i, d) in dims.iter().enumerate() {
            strides.push(strides[i] * d.nbins);
        }
        Self { dims, strides }
    }

    pub fn dim(&self) -> usize {
        self.dims.len()
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn stride(&self, i: usize) -> Option<usize> {
        self.strides.get(i).copied()
    }

    pub fn total_bins(&self) -> usize {
        self.strides[self.dims.len()]
    }

    /// Coordinate of flat bin `flat` along axis `axis`.
    pub fn axis_coordinate(&self, flat: usize, axis: usize) -> usize {
        (flat % self.strides[axis + 1]) / self.strides[axis]
    }

    /// Flat bin of a sample whose value on axis `i` is `value_at(i)`.
    ///
    /// Axes are visited in order and the walk stops at the first axis that is out of
    /// range or has no value, so later axes are never read for overflowing samples.
    pub fn locate(&self, mut value_at: impl FnMut(usize) -> Option<f64>) -> Option<usize> {
        let mut bin = 0;
        for (i, d) in self.dims.iter().enumerate() {
            let coord = d.coordinate(value_at(i)?)?;
            bin += coord * self.strides[i];
        }
        Some(bin)
    }

    pub fn axis_edges(&self, axis: usize) -> AxisEdges {
        let d = &self.dims[axis];
        let width = d.bin_width();
        let total = self.total_bins();
        let mut edges = AxisEdges {
            bottom: Vec::with_capacity(total),
            center: Vec::with_capacity(total),
            top: Vec::with_capacity(total),
        };
        for flat in 0..total {
            let j = self.axis_coordinate(flat, axis) as f64;
            edges.bottom.push(d.range_min + j * width);
            edges.center.push(d.range_min + (j + 0.5) * width);
            edges.top.push(d.range_min + (j + 1.0) * width);
        }
        edges
    }
}
