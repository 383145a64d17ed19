use histond_common::{HistondError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names of the built-in output columns. Per-axis edge columns carry the axis index
/// as a suffix (`bin_bottom_0`, `bin_center_1`, ...).
pub const BIN_COUNT: &str = "bin_count";
pub const ERRORBAR_LOW: &str = "errorbar_low";
pub const ERRORBAR_HIGH: &str = "errorbar_high";
pub const BIN_BOTTOM_PREFIX: &str = "bin_bottom_";
pub const BIN_CENTER_PREFIX: &str = "bin_center_";
pub const BIN_TOP_PREFIX: &str = "bin_top_";

/// Largest accepted flat bin count. Every output array holds this many `f64`s.
pub const MAX_BINS: usize = 1 << 28;

/// How rows contribute to a bin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Weights {
    /// Each row adds 1.
    #[default]
    Unweighted,
    /// Each row adds its value in the named column.
    Column(String),
}

impl Weights {
    pub fn column(name: impl Into<String>) -> Self {
        Weights::Column(name.into())
    }

    pub fn column_name(&self) -> Option<&str> {
        match self {
            Weights::Unweighted => None,
            Weights::Column(name) => Some(name),
        }
    }
}

impl From<Option<String>> for Weights {
    fn from(name: Option<String>) -> Self {
        name.map_or(Weights::Unweighted, Weights::Column)
    }
}

impl From<Weights> for Option<String> {
    fn from(w: Weights) -> Self {
        match w {
            Weights::Unweighted => None,
            Weights::Column(name) => Some(name),
        }
    }
}

/// Additional output array binned like `bin_count` but aggregated with its own weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxHistogram {
    #[serde(default)]
    pub weights: Weights,
}

/// Full description of an N-dimensional histogram.
///
/// `range` entries are `None` for axes whose bounds are taken from the data. In
/// TOML an auto-ranged axis is written as an empty array:
///
/// ```toml
/// sample_variables = ["x", "y"]
/// nbins = [10, 4]
/// range = [[0.0, 10.0], []]
/// weights = "w"
///
/// [histograms.unweighted]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSpec {
    pub sample_variables: Vec<String>,
    #[serde(default)]
    pub nbins: Vec<usize>,
    #[serde(default, with = "range_serde")]
    pub range: Option<Vec<Option<[f64; 2]>>>,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub histograms: BTreeMap<String, AuxHistogram>,
    #[serde(default)]
    pub view: Option<Vec<usize>>,
}

impl HistogramSpec {
    pub fn new<I, S>(sample_variables: I, nbins: Vec<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sample_variables: sample_variables.into_iter().map(Into::into).collect(),
            nbins,
            range: None,
            weights: Weights::Unweighted,
            histograms: BTreeMap::new(),
            view: None,
        }
    }

    pub fn with_range(mut self, range: Vec<Option<[f64; 2]>>) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_histogram(mut self, name: impl Into<String>, weights: Weights) -> Self {
        self.histograms.insert(name.into(), AuxHistogram { weights });
        self
    }

    pub fn with_view(mut self, view: Vec<usize>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn dim(&self) -> usize {
        self.sample_variables.len()
    }

    /// Explicit bounds for axis `i`, if any.
    pub fn axis_range(&self, i: usize) -> Option<[f64; 2]> {
        self.range.as_ref().and_then(|r| r.get(i).copied().flatten())
    }

    /// Every source column this histogram reads, deduplicated, in first-use order.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let weight_cols = std::iter::once(&self.weights)
            .chain(self.histograms.values().map(|h| &h.weights))
            .filter_map(Weights::column_name);
        for name in self.sample_variables.iter().map(String::as_str).chain(weight_cols) {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
        out
    }

    /// Check the shape of the definition. Row-dependent checks (view bounds, column
    /// presence) happen against the source in the engine.
    pub fn validate(&self) -> Result<()> {
        let dim = self.dim();
        if dim == 0 {
            return invalid("at least one sample variable is required".into());
        }
        if self.nbins.len() != dim {
            return invalid(format!(
                "{} sample variables but {} bin counts",
                dim,
                self.nbins.len()
            ));
        }
        if let Some(i) = self.nbins.iter().position(|&n| n == 0) {
            return invalid(format!("nbins[{i}] must be positive"));
        }
        match self
            .nbins
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        {
            Some(total) if total <= MAX_BINS => {}
            _ => return invalid(format!("total bin count exceeds {MAX_BINS}")),
        }
        if let Some(range) = &self.range {
            if range.len() != dim {
                return invalid(format!(
                    "{} sample variables but {} range entries",
                    dim,
                    range.len()
                ));
            }
            for (i, r) in range.iter().enumerate() {
                if let Some([lo, hi]) = r {
                    if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                        return invalid(format!("range[{i}] = [{lo}, {hi}] is not a finite, ordered interval"));
                    }
                }
            }
        }
        for name in self.histograms.keys() {
            if is_reserved_column(name) {
                return invalid(format!("auxiliary histogram '{name}' shadows a built-in output column"));
            }
        }
        Ok(())
    }
}

fn invalid(msg: String) -> Result<()> {
    Err(HistondError::InvalidConfig(msg))
}

pub fn is_reserved_column(name: &str) -> bool {
    matches!(name, BIN_COUNT | ERRORBAR_LOW | ERRORBAR_HIGH)
        || [BIN_BOTTOM_PREFIX, BIN_CENTER_PREFIX, BIN_TOP_PREFIX]
            .iter()
            .any(|p| name.strip_prefix(p).is_some_and(|rest| rest.parse::<usize>().is_ok()))
}

// `[]` <-> auto-ranged axis, `[lo, hi]` <-> explicit bounds
mod range_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        range: &Option<Vec<Option<[f64; 2]>>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        let plain: Option<Vec<Vec<f64>>> = range
            .as_ref()
            .map(|r| r.iter().map(|a| a.map(|b| b.to_vec()).unwrap_or_default()).collect());
        plain.serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<Vec<Option<[f64; 2]>>>, D::Error> {
        let plain: Option<Vec<Vec<f64>>> = Option::deserialize(de)?;
        plain
            .map(|axes| {
                axes.into_iter()
                    .map(|a| match a.as_slice() {
                        [] => Ok(None),
                        [lo, hi] => Ok(Some([*lo, *hi])),
                        other => Err(D::Error::custom(format!(
                            "range entry must be [] or [min, max], got {} values",
                            other.len()
                        ))),
                    })
                    .collect()
            })
            .transpose()
    }
}
