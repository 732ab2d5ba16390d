//! Console output: banner, per-table progress and the final summary.

use anyhow::Context;
use std::{fs, path::Path};
use tabledump_core::{ExportConfig, ExportResult, RunEvent, RunSummary};

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Header printed before connecting.
pub fn banner(config: &ExportConfig) -> String {
    let database = config
        .connection
        .database
        .as_deref()
        .unwrap_or("(login default)");

    [
        rule(),
        format!("tabledump v{}", env!("CARGO_PKG_VERSION")),
        rule(),
        format!("Server: {}", config.connection.server),
        format!("Database: {database}"),
        format!("Output Directory: {}", config.output.dir.display()),
        format!("Compression: {}", config.output.writer.compression),
        rule(),
    ]
    .join("\n")
}

/// Text for a progress event.
///
/// `TableStarted` yields the start of a line that `TableFinished`
/// completes.
pub fn progress(event: &RunEvent<'_>) -> String {
    match event {
        RunEvent::TablesListed { count } => format!("Found {count} tables to export.\n"),
        RunEvent::TableStarted {
            position,
            total,
            table,
        } => format!("[{position}/{total}] Reading table: {table}... "),
        RunEvent::TableFinished { outcome, .. } => match &outcome.result {
            ExportResult::Success { rows, path } => {
                let name = path.file_name().map_or_else(
                    || path.display().to_string(),
                    |n| n.to_string_lossy().into_owned(),
                );
                format!("✓ Exported {rows} rows to {name}")
            }
            ExportResult::Failure { message } => format!("✗ Error: {message}"),
        },
    }
}

/// Closing summary of a run.
pub fn summary(summary: &RunSummary) -> String {
    let mut lines = vec![
        String::new(),
        rule(),
        "Export Complete!".to_string(),
        format!("Tables found: {}", summary.tables_found),
        format!("Successfully exported: {} tables", summary.succeeded),
        format!("Failed: {} tables", summary.failed),
        format!("Rows written: {}", summary.total_rows()),
        format!("Output directory: {}", summary.output_dir.display()),
    ];

    if summary.failed > 0 {
        lines.push("Failed tables:".to_string());
        for outcome in summary.failures() {
            lines.push(format!("  - {}", outcome.table));
        }
    }

    lines.push(rule());
    lines.join("\n")
}

/// Writes the run summary as pretty-printed JSON.
///
/// # Errors
/// Fails if the summary cannot be serialized or the file cannot be written.
pub fn write_summary_json(summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary).context("failed to serialize run summary")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(path, json)
        .with_context(|| format!("failed to write summary to {}", path.display()))?;

    tracing::info!("Run summary saved to {}", path.display());
    Ok(())
}
