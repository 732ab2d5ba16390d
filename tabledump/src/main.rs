//! SQL Server to Parquet export tool.
//!
//! Connects to one SQL Server database, lists its base tables and writes
//! each table to `<output-dir>/<schema>_<table>.parquet`.
//!
//! # Guarantees
//! - Read-only database operations only
//! - No credentials stored or logged
//! - A failing table is reported and skipped
//!
//! Exit status is 0 whenever the connection and the table listing
//! succeeded, even if individual tables failed.

mod cli;
mod report;

use clap::Parser;
use cli::{Cli, Command};
use std::{
    io::{self, Write},
    process::ExitCode,
};
use tabledump_core::{
    ExportConfig, Runner, SqlServerConnector,
    logging::init_logging,
    runner::{RunEvent, list_tables, test_connection},
};
use tracing::{debug, error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_format) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.connection.resolve(cli::prompt_password)?;
    let connector = SqlServerConnector::new();

    match cli.command.unwrap_or(Command::Export) {
        Command::Export => export(cli, &config, &connector).await,
        Command::Test => {
            info!("Testing connection to {}", config.connection);
            test_connection(&connector, &config).await?;
            info!("Connection test successful");
            println!("Connection to {} successful", config.connection);
            Ok(())
        }
        Command::Tables => {
            let tables = list_tables(&connector, &config).await?;
            for table in &tables {
                println!("{table}");
            }
            info!("{} base tables", tables.len());
            Ok(())
        }
    }
}

async fn export(
    cli: &Cli,
    config: &ExportConfig,
    connector: &SqlServerConnector,
) -> anyhow::Result<()> {
    let quiet = cli.global.quiet;
    if !quiet {
        println!("{}", report::banner(config));
        println!("\nConnecting to database...");
    }

    let mut runner = Runner::new(config);
    let summary = runner
        .run_with(connector, |event| {
            if quiet {
                return;
            }
            let line = report::progress(&event);
            if let RunEvent::TableStarted { .. } = event {
                print!("{line}");
                if let Err(e) = io::stdout().flush() {
                    debug!("Failed to flush progress line: {}", e);
                }
            } else {
                println!("{line}");
            }
        })
        .await?;

    if !quiet {
        println!("{}", report::summary(&summary));
    }

    if let Some(path) = &cli.global.summary_json {
        report::write_summary_json(&summary, path)?;
    }

    Ok(())
}
