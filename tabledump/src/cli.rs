//! Command-line arguments and configuration layering.

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::{io, path::PathBuf};
use tabledump_core::{
    ExportConfig, PartialConfig, config::DEFAULT_USER, logging::LogFormat,
};

#[derive(Debug, Parser)]
#[command(name = "tabledump")]
#[command(about = "Export every base table of a SQL Server database to Parquet")]
#[command(version)]
#[command(long_about = "
tabledump - SQL Server to Parquet exporter

Connects to a SQL Server database, lists every base table (views are
skipped) and writes each one to <output-dir>/<schema>_<table>.parquet.
Datetime columns are stored at microsecond precision.

A failing table is reported and skipped; the run only fails when the
connection or the table listing fails.

CONFIGURATION (highest precedence first):
  command-line flags, TABLEDUMP_* environment variables,
  the JSON file given by --config, built-in defaults

EXAMPLES:
  TABLEDUMP_PASSWORD=... tabledump --database AdventureWorks2022
  tabledump --server db.internal,1433 --prompt-password --compression zstd
  tabledump tables --database AdventureWorks2022 --prompt-password
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Export all base tables (default)
    Export,
    /// Connect and run a trivial query
    Test,
    /// List the base tables an export would process
    Tables,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_name = "FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Write the run summary as JSON
    #[arg(long, global = true, value_name = "FILE")]
    pub summary_json: Option<PathBuf>,
}

#[derive(Debug, Default, Args)]
pub struct ConnectionArgs {
    /// Server address: host, host,port, host:port or host\instance
    #[arg(short = 'S', long, global = true, env = "TABLEDUMP_SERVER")]
    pub server: Option<String>,

    /// Database to export
    #[arg(short = 'd', long, global = true, env = "TABLEDUMP_DATABASE")]
    pub database: Option<String>,

    /// SQL Server login
    #[arg(short = 'U', long, global = true, env = "TABLEDUMP_USER")]
    pub user: Option<String>,

    /// SQL Server password
    #[arg(
        long,
        global = true,
        env = "TABLEDUMP_PASSWORD",
        hide_env_values = true,
        conflicts_with = "prompt_password"
    )]
    pub password: Option<String>,

    /// Read the password from the terminal
    #[arg(long, global = true)]
    pub prompt_password: bool,

    /// Directory receiving the Parquet files
    #[arg(short, long, global = true, env = "TABLEDUMP_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Parquet compression: none, snappy, zstd or zstd:<level>
    #[arg(long, global = true, env = "TABLEDUMP_COMPRESSION", value_name = "CODEC")]
    pub compression: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, global = true, env = "TABLEDUMP_CONNECT_TIMEOUT", value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Trust the server certificate without validation
    #[arg(
        long,
        global = true,
        env = "TABLEDUMP_TRUST_SERVER_CERTIFICATE",
        value_name = "BOOL",
        action = ArgAction::Set
    )]
    pub trust_server_certificate: Option<bool>,

    /// JSON configuration file
    #[arg(long, global = true, env = "TABLEDUMP_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Settings given on the command line or through the environment.
    pub fn layer(&self) -> PartialConfig {
        PartialConfig {
            server: self.server.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            output_dir: self.output_dir.clone(),
            compression: self.compression.clone(),
            connect_timeout_secs: self.connect_timeout,
            trust_server_certificate: self.trust_server_certificate,
        }
    }

    /// Builds the run configuration.
    ///
    /// `prompt` is called with the login name when `--prompt-password` is
    /// set.
    ///
    /// # Errors
    /// Fails when the config file cannot be read, the password cannot be
    /// read, or the merged settings are invalid.
    pub fn resolve<P>(&self, prompt: P) -> anyhow::Result<ExportConfig>
    where
        P: FnOnce(&str) -> io::Result<String>,
    {
        let mut layered = self.layer();

        if let Some(path) = &self.config {
            let file = PartialConfig::from_json_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?;
            layered = layered.merge(file);
        }

        if self.prompt_password {
            let user = layered.user.as_deref().unwrap_or(DEFAULT_USER);
            let password = prompt(user).context("failed to read password")?;
            layered.password = Some(password);
        }

        let config = layered.resolve().context("invalid configuration")?;
        Ok(config)
    }
}

/// Reads the password from the terminal without echo.
pub fn prompt_password(user: &str) -> io::Result<String> {
    rpassword::prompt_password(format!("Password for {user}: "))
}
