pub mod config;
pub use config::{BinningConfig, Config, ExportConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistondError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Column not defined: {0}")]
    MissingColumn(String),
    #[error("Invalid histogram configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, HistondError>;
