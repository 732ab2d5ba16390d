//! Core library for tabledump.
//!
//! tabledump copies every base table of a SQL Server database into one
//! Parquet file per table. This crate holds everything except the
//! command-line surface:
//!
//! - [`config`]: resolved run configuration and its layered sources
//! - [`adapters`]: the connector/source traits and the SQL Server driver
//! - [`frame`]: the in-memory table model captured at query time
//! - [`normalize`]: microsecond normalization of temporal columns
//! - [`writer`]: atomic Parquet file writes
//! - [`export`] and [`runner`]: the per-table step and the pipeline around it
//!
//! # Guarantees
//! - The source database is only read (`SELECT` statements only)
//! - Credentials never appear in logs, errors or summaries
//! - A table either produces a complete file or none at all
//! - One failing table never stops the others

pub mod adapters;
pub mod config;
pub mod error;
pub mod export;
pub mod frame;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod runner;
pub mod security;
pub mod writer;

// Re-export commonly used types
pub use adapters::{Connector, TableSource};
pub use config::{
    ConnectionConfig, ExportConfig, OutputConfig, ParquetCompression, PartialConfig, ServerAddress,
};
pub use error::{Result, TableDumpError};
pub use export::export_table;
pub use frame::{Cell, ColumnKind, ColumnSpec, FrameBuilder, TableFrame};
pub use models::{ExportResult, RunSummary, TableOutcome, TableRef};
pub use normalize::normalize_datetimes;
pub use runner::{RunEvent, Runner, RunnerState};

#[cfg(feature = "mssql")]
pub use adapters::mssql::SqlServerConnector;
