pub mod binning;
pub mod cache;
pub mod datasource;
pub mod definition;
pub mod export;
pub mod output;
pub mod reader;
pub mod scanner;
pub mod source;

pub use binning::{AxisEdges, Binning, Dimension};
pub use cache::{BinIndexCache, BinSlot};
pub use datasource::HistogramDataSource;
pub use definition::{AuxHistogram, HistogramSpec, Weights, MAX_BINS};
pub use histond_common::{HistondError, Result};
pub use output::OutputDataset;
pub use reader::{list_columns, load_table, ColumnListing};
pub use scanner::resolve_paths;
pub use source::{ColumnSource, MemoryTable};
