//! Parquet output with atomic replacement.
//!
//! Each table is written to a hidden sibling file first and renamed over the
//! final path only after the Parquet footer has been flushed, so a failed
//! export never leaves a truncated file under the final name.

use crate::config::ParquetCompression;
use crate::error::{Result, TableDumpError};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Rows per Parquet row group.
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1_000_000;

/// Options controlling the Parquet encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Page compression codec
    pub compression: ParquetCompression,
    /// Maximum rows per row group
    pub row_group_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::default(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

impl WriterOptions {
    /// Builds the Parquet writer properties.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid zstd level.
    pub fn writer_properties(&self) -> Result<WriterProperties> {
        let compression = match self.compression {
            ParquetCompression::None => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Zstd(level) => {
                let level = ZstdLevel::try_new(level).map_err(|e| {
                    TableDumpError::configuration(format!("Invalid zstd level {level}: {e}"))
                })?;
                Compression::ZSTD(level)
            }
        };

        Ok(WriterProperties::builder()
            .set_compression(compression)
            .set_statistics_enabled(EnabledStatistics::Chunk)
            .set_max_row_group_size(self.row_group_size.max(1))
            .build())
    }
}

/// Summary of a completed file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Final path of the file
    pub path: PathBuf,
    /// Rows written
    pub rows: u64,
    /// File size in bytes
    pub bytes: u64,
}

/// Writes `batch` to `path` as a Parquet file, replacing any existing file.
///
/// # Errors
/// Returns [`TableDumpError::TableWrite`] on any encoding or I/O failure.
/// On error no file is left at `path` other than one that existed before.
pub fn write_parquet(
    batch: &RecordBatch,
    path: &Path,
    options: &WriterOptions,
) -> Result<WrittenFile> {
    let staging = staging_path(path);

    match write_staged(batch, path, &staging, options) {
        Ok(written) => Ok(written),
        Err(e) => {
            if staging.exists()
                && let Err(cleanup) = fs::remove_file(&staging)
            {
                tracing::warn!(
                    "Failed to remove staging file {}: {}",
                    staging.display(),
                    cleanup
                );
            }
            Err(e)
        }
    }
}

fn write_staged(
    batch: &RecordBatch,
    path: &Path,
    staging: &Path,
    options: &WriterOptions,
) -> Result<WrittenFile> {
    let props = options.writer_properties()?;

    let file = File::create(staging)
        .map_err(|e| TableDumpError::table_write_failed(path, "failed to create staging file", e))?;

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props)).map_err(|e| {
        TableDumpError::table_write_failed(path, "failed to start Parquet writer", e)
    })?;

    if batch.num_rows() > 0 {
        writer
            .write(batch)
            .map_err(|e| TableDumpError::table_write_failed(path, "failed to encode rows", e))?;
    }

    writer
        .close()
        .map_err(|e| TableDumpError::table_write_failed(path, "failed to finish Parquet file", e))?;

    fs::rename(staging, path).map_err(|e| {
        TableDumpError::table_write_failed(path, "failed to move file into place", e)
    })?;

    let bytes = fs::metadata(path).map(|m| m.len()).unwrap_or_default();
    let rows = batch.num_rows() as u64;

    tracing::debug!("Wrote {} rows ({} bytes) to {}", rows, bytes, path.display());

    Ok(WrittenFile {
        path: path.to_path_buf(),
        rows,
        bytes,
    })
}

/// Hidden sibling path used while a file is being written.
pub fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.partial"))
}
