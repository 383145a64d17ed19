use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use histond_common::{HistondError, Result};
use std::collections::HashMap;

/// Column-oriented table the histogram engine reads its samples from.
///
/// Rows are indexed `0..num_rows()`. Every column returned by [`ColumnSource::column`]
/// must have exactly `num_rows()` entries; missing values are represented as NaN.
pub trait ColumnSource {
    fn num_rows(&self) -> usize;

    /// Values of the named column, or `None` when the source has no such column.
    fn column(&self, name: &str) -> Option<&[f64]>;
}

/// In-memory numeric table, the default [`ColumnSource`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    names: Vec<String>, // insertion order
    columns: HashMap<String, Vec<f64>>,
    num_rows: usize,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns<I, N>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, Vec<f64>)>,
        N: Into<String>,
    {
        let mut table = Self::new();
        for (name, values) in columns {
            table.insert_column(name, values)?;
        }
        Ok(table)
    }

    /// Build a table from Arrow batches sharing one schema. Numeric columns are cast
    /// to `f64` with nulls mapped to NaN; other columns are skipped.
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Ok(Self::new());
        };
        let schema = first.schema();
        let merged = concat_batches(&schema, batches)?;
        let mut table = Self::new();
        for (field, array) in schema.fields().iter().zip(merged.columns()) {
            match numeric_values(array)? {
                Some(values) => table.insert_column(field.name().clone(), values)?,
                None => tracing::warn!(
                    column = %field.name(),
                    data_type = ?field.data_type(),
                    "skipping non-numeric column"
                ),
            }
        }
        // an all-non-numeric batch still carries a row count
        if table.names.is_empty() {
            table.num_rows = merged.num_rows();
        }
        Ok(table)
    }

    /// Insert or replace a column. The first column fixes the row count.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        let is_only_column = self.names.len() == 1 && self.names[0] == name;
        if !self.names.is_empty() && !is_only_column && values.len() != self.num_rows {
            return Err(HistondError::InvalidConfig(format!(
                "column '{name}' has {} rows, table has {}",
                values.len(),
                self.num_rows
            )));
        }
        self.num_rows = values.len();
        if self.columns.insert(name.clone(), values).is_none() {
            self.names.push(name);
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        let removed = self.columns.remove(name)?;
        self.names.retain(|n| n != name);
        Some(removed)
    }

    /// Append one row; `values` must hold a value for every column, in column order.
    pub fn push_row(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.names.len() {
            return Err(HistondError::InvalidConfig(format!(
                "row has {} values, table has {} columns",
                values.len(),
                self.names.len()
            )));
        }
        for (name, &v) in self.names.iter().zip(values) {
            if let Some(col) = self.columns.get_mut(name) {
                col.push(v);
            }
        }
        self.num_rows += 1;
        Ok(())
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }
}

impl ColumnSource for MemoryTable {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|c| c.as_slice())
    }
}

fn numeric_values(array: &ArrayRef) -> Result<Option<Vec<f64>>> {
    if !array.data_type().is_numeric() {
        return Ok(None);
    }
    let floats = cast(array, &DataType::Float64)?;
    let floats = floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| HistondError::Other("cast to Float64 produced another type".into()))?;
    Ok(Some(floats.iter().map(|v| v.unwrap_or(f64::NAN)).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use std::sync::Arc;

    #[test]
    fn from_columns_checks_lengths() {
        let err = MemoryTable::from_columns([("x", vec![1.0, 2.0]), ("y", vec![1.0])]);
        assert!(matches!(err, Err(HistondError::InvalidConfig(_))));
        let ok = MemoryTable::from_columns([("x", vec![1.0, 2.0]), ("y", vec![3.0, 4.0])]).unwrap();
        assert_eq!(ok.num_rows(), 2);
        assert_eq!(ok.column("y"), Some(&[3.0, 4.0][..]));
        assert!(ok.column("z").is_none());
    }

    #[test]
    fn replacing_sole_column_changes_row_count() {
        let mut t = MemoryTable::from_columns([("x", vec![1.0, 2.0])]).unwrap();
        t.insert_column("x", vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.column_names(), &["x".to_string()]);
    }

    #[test]
    fn push_row_appends_in_column_order() {
        let mut t = MemoryTable::from_columns([("x", vec![1.0]), ("w", vec![0.5])]).unwrap();
        t.push_row(&[2.0, 1.5]).unwrap();
        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.column("w"), Some(&[0.5, 1.5][..]));
        assert!(t.push_row(&[1.0]).is_err());
    }

    #[test]
    fn from_batches_casts_and_skips() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, true),
            Field::new("name", DataType::Utf8, true),
        ]));
        let b1 = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![Some(1), None])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap();
        let b2 = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(7)])),
                Arc::new(StringArray::from(vec!["c"])),
            ],
        )
        .unwrap();
        let t = MemoryTable::from_batches(&[b1, b2]).unwrap();
        assert_eq!(t.num_rows(), 3);
        assert_eq!(t.column_names(), &["id".to_string()]);
        let id = t.column("id").unwrap();
        assert_eq!(id[0], 1.0);
        assert!(id[1].is_nan());
        assert_eq!(id[2], 7.0);
        assert!(t.column("name").is_none());
    }
}
