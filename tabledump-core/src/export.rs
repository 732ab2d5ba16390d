//! Single-table export: read, normalize, write.

use crate::{
    Result, TableDumpError,
    adapters::TableSource,
    config::OutputConfig,
    models::{ExportResult, TableOutcome, TableRef},
    normalize::normalize_datetimes,
    writer::{WrittenFile, write_parquet},
};
use tracing::{debug, warn};

/// Exports one table to `<output.dir>/<schema>_<table>.parquet`.
///
/// Never fails: read and write errors are turned into
/// [`ExportResult::Failure`] so the caller can move on to the next table.
pub async fn export_table<S>(
    source: &mut S,
    table: &TableRef,
    output: &OutputConfig,
) -> TableOutcome
where
    S: TableSource + ?Sized,
{
    let result = match try_export_table(source, table, output).await {
        Ok(written) => ExportResult::Success {
            rows: written.rows,
            path: written.path,
        },
        Err(e) => {
            warn!("Export of {} failed: {}", table, e.detailed_message());
            ExportResult::Failure {
                message: e.detailed_message(),
            }
        }
    };

    TableOutcome {
        table: table.clone(),
        result,
    }
}

async fn try_export_table<S>(
    source: &mut S,
    table: &TableRef,
    output: &OutputConfig,
) -> Result<WrittenFile>
where
    S: TableSource + ?Sized,
{
    let mut frame = source.read_table(table).await?;
    debug!("Read {} rows from {}", frame.row_count(), table);

    let normalized = normalize_datetimes(&mut frame);
    if !normalized.is_empty() {
        debug!("Normalized datetime columns of {}: {}", table, normalized.join(", "));
    }

    let path = table.output_path(&output.dir);
    let batch = frame
        .to_record_batch()
        .map_err(|e| TableDumpError::table_write_failed(&path, "failed to build record batch", e))?;
    drop(frame);

    write_parquet(&batch, &path, &output.writer)
}
