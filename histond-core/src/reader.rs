use crate::source::{ColumnSource, MemoryTable};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use histond_common::{HistondError, Result};
use memmap2::Mmap;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnListing {
    pub path: PathBuf,
    pub row_count: i64,
    pub numeric_columns: Vec<String>,
    pub other_columns: Vec<String>,
}

fn map_file(path: &Path) -> Result<Bytes> {
    let file = std::fs::File::open(path)?;
    // one bulk copy out of the mapping; the reader then slices the shared buffer
    let mmap: Mmap = unsafe { Mmap::map(&file)? };
    Ok(Bytes::copy_from_slice(&mmap))
}

/// Decode one Parquet file into Arrow batches, keeping only `columns` when given.
/// Requested columns the file lacks are ignored here; the engine reports them.
pub fn read_parquet_batches(
    path: &Path,
    columns: Option<&[String]>,
    batch_size: usize,
) -> Result<Vec<RecordBatch>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(map_file(path)?)?;
    let schema = builder.schema().clone();
    let builder = if let Some(cols) = columns {
        let indices: Vec<usize> = cols
            .iter()
            .filter_map(|c| schema.fields().iter().position(|f| f.name() == c))
            .collect();
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
        builder.with_projection(mask)
    } else {
        builder
    };
    let reader = builder.with_batch_size(batch_size.max(1)).build()?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(HistondError::Arrow)?;
    tracing::debug!(path = %path.display(), batches = batches.len(), "decoded parquet file");
    Ok(batches)
}

/// Load every file into one table, rows concatenated in path order. Files are
/// decoded in parallel; all must share a schema.
pub fn load_table(paths: &[PathBuf], columns: Option<&[String]>, batch_size: usize) -> Result<MemoryTable> {
    let per_file: Vec<Vec<RecordBatch>> = paths
        .par_iter()
        .map(|p| read_parquet_batches(p, columns, batch_size))
        .collect::<Result<_>>()?;
    let batches: Vec<RecordBatch> = per_file.into_iter().flatten().collect();
    let table = MemoryTable::from_batches(&batches)?;
    tracing::info!(
        files = paths.len(),
        rows = table.num_rows(),
        columns = table.column_names().len(),
        "table loaded"
    );
    Ok(table)
}

pub fn list_columns(path: &Path) -> Result<ColumnListing> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(map_file(path)?)?;
    let row_count = builder.metadata().file_metadata().num_rows();
    let (numeric_columns, other_columns): (Vec<_>, Vec<_>) = builder
        .schema()
        .fields()
        .iter()
        .partition(|f| f.data_type().is_numeric());
    Ok(ColumnListing {
        path: path.to_path_buf(),
        row_count,
        numeric_columns: numeric_columns.iter().map(|f| f.name().clone()).collect(),
        other_columns: other_columns.iter().map(|f| f.name().clone()).collect(),
    })
}
