//! Pipeline orchestration.
//!
//! A run moves through `Idle → Connecting → Listing → Exporting(i) → Done`.
//! Connection and catalog failures end the run before any table is touched;
//! a failing table only adds a failure to the summary. Whatever happens after
//! the connection is opened, it is closed exactly once.

use crate::{
    Result, TableDumpError,
    adapters::{Connector, TableSource},
    config::ExportConfig,
    export::export_table,
    models::{RunSummary, TableOutcome, TableRef},
};
use std::{fmt, fs, path::Path};
use tracing::{debug, info, warn};

/// File name used to probe the output directory for writability.
const PROBE_FILE_NAME: &str = ".tabledump-write-probe";

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerState {
    /// Not started
    #[default]
    Idle,
    /// Opening the database session
    Connecting,
    /// Querying the catalog
    Listing,
    /// Exporting the table at this zero-based index
    Exporting(usize),
    /// Finished, successfully or not
    Done,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Listing => f.write_str("listing"),
            Self::Exporting(i) => write!(f, "exporting({i})"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Progress notifications emitted while a run is exporting.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// The catalog was read
    TablesListed {
        /// Number of base tables found
        count: usize,
    },
    /// A table export is about to start
    TableStarted {
        /// One-based position of the table
        position: usize,
        /// Number of tables in the run
        total: usize,
        /// Table being exported
        table: &'a TableRef,
    },
    /// A table export finished
    TableFinished {
        /// One-based position of the table
        position: usize,
        /// Number of tables in the run
        total: usize,
        /// Outcome of the export
        outcome: &'a TableOutcome,
    },
}

/// Drives a single export run.
#[derive(Debug)]
pub struct Runner<'a> {
    config: &'a ExportConfig,
    state: RunnerState,
}

impl<'a> Runner<'a> {
    /// Creates a runner for `config`.
    pub fn new(config: &'a ExportConfig) -> Self {
        Self {
            config,
            state: RunnerState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    fn transition(&mut self, next: RunnerState) {
        debug!("Runner state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Runs the export without progress notifications.
    ///
    /// # Errors
    /// See [`Runner::run_with`].
    pub async fn run<C: Connector>(&mut self, connector: &C) -> Result<RunSummary> {
        self.run_with(connector, |_| {}).await
    }

    /// Runs the export, calling `on_event` as tables are processed.
    ///
    /// # Errors
    /// Returns the fatal error when configuration, the output directory,
    /// the connection or the catalog query fails. Per-table failures are
    /// reported in the returned summary instead.
    pub async fn run_with<C, F>(&mut self, connector: &C, mut on_event: F) -> Result<RunSummary>
    where
        C: Connector,
        F: FnMut(RunEvent<'_>),
    {
        let result = self.run_inner(connector, &mut on_event).await;
        self.transition(RunnerState::Done);
        result
    }

    async fn run_inner<C, F>(&mut self, connector: &C, on_event: &mut F) -> Result<RunSummary>
    where
        C: Connector,
        F: FnMut(RunEvent<'_>),
    {
        let config = self.config;
        config.validate()?;
        let output = &config.output;
        preflight_output_dir(&output.dir)?;

        self.transition(RunnerState::Connecting);
        let mut source = connector
            .connect(&config.connection, &config.credentials)
            .await?;
        info!("Connected to {}", config.connection);

        self.transition(RunnerState::Listing);
        let tables = match source.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                close_source(source).await;
                return Err(e);
            }
        };
        info!("Found {} base tables", tables.len());
        on_event(RunEvent::TablesListed {
            count: tables.len(),
        });

        let mut summary = RunSummary::new(&output.dir);
        summary.tables_found = tables.len();
        let total = tables.len();

        for (index, table) in tables.iter().enumerate() {
            self.transition(RunnerState::Exporting(index));
            on_event(RunEvent::TableStarted {
                position: index + 1,
                total,
                table,
            });

            let outcome = export_table(&mut source, table, output).await;
            on_event(RunEvent::TableFinished {
                position: index + 1,
                total,
                outcome: &outcome,
            });
            summary.record(outcome);
        }

        close_source(source).await;
        info!(
            "Export finished: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );

        Ok(summary)
    }
}

async fn close_source<S: TableSource>(source: S) {
    if let Err(e) = source.close().await {
        warn!("Failed to close connection cleanly: {}", e);
    }
}

/// Creates the output directory if needed and checks that files can be
/// created in it.
///
/// # Errors
/// Returns [`TableDumpError::Output`] when the directory cannot be created
/// or written to.
pub fn preflight_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| TableDumpError::output(dir, "failed to create output directory", e))?;

    let probe = dir.join(PROBE_FILE_NAME);
    fs::write(&probe, b"")
        .map_err(|e| TableDumpError::output(dir, "output directory is not writable", e))?;
    fs::remove_file(&probe)
        .map_err(|e| TableDumpError::output(dir, "failed to remove write probe", e))?;

    debug!("Output directory {} is writable", dir.display());
    Ok(())
}

/// Connects and runs a trivial query.
///
/// # Errors
/// Returns the connection error if the server cannot be reached or the
/// round trip fails.
pub async fn test_connection<C: Connector>(connector: &C, config: &ExportConfig) -> Result<()> {
    config.connection.validate()?;
    let mut source = connector
        .connect(&config.connection, &config.credentials)
        .await?;

    let result = source.ping().await;
    close_source(source).await;
    result
}

/// Connects and returns the base tables an export would process.
///
/// # Errors
/// Returns the connection or catalog error.
pub async fn list_tables<C: Connector>(
    connector: &C,
    config: &ExportConfig,
) -> Result<Vec<TableRef>> {
    config.connection.validate()?;
    let mut source = connector
        .connect(&config.connection, &config.credentials)
        .await?;

    let result = source.list_tables().await;
    close_source(source).await;
    result
}
