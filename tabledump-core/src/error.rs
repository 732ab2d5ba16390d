//! Error taxonomy for the export pipeline.
//!
//! Errors fall into two groups:
//! - fatal errors (configuration, output directory, connection, catalog) that
//!   abort the run before any table is exported
//! - per-table errors (read, write) that are converted into a failed
//!   [`ExportResult`](crate::models::ExportResult) and never stop the loop
//!
//! Credentials are never part of an error message.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed source error carried by the variants below.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for tabledump operations.
#[derive(Debug, Error)]
pub enum TableDumpError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Output directory cannot be created or written to
    #[error("Output directory {} is not usable: {context}", .path.display())]
    Output {
        path: PathBuf,
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Database connection failed (credentials sanitized)
    #[error("Database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// The catalog query listing base tables failed
    #[error("Catalog query failed: {context}")]
    CatalogQuery {
        context: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Reading a table into memory failed
    #[error("Failed to read table {table}: {context}")]
    TableRead {
        table: String,
        context: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Writing a table to its output file failed
    #[error("Failed to write {}: {context}", .path.display())]
    TableWrite {
        path: PathBuf,
        context: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

/// Convenience type alias for Results with TableDumpError
pub type Result<T> = std::result::Result<T, TableDumpError>;

impl TableDumpError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an output directory error
    pub fn output(
        path: impl Into<PathBuf>,
        context: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Output {
            path: path.into(),
            context: context.into(),
            source,
        }
    }

    /// Creates a connection error with sanitized context
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a connection error without an underlying cause
    pub fn connection(context: impl Into<String>) -> Self {
        Self::Connection {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a catalog query error
    pub fn catalog_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::CatalogQuery {
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a catalog error without an underlying cause
    pub fn catalog(context: impl Into<String>) -> Self {
        Self::CatalogQuery {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a table read error wrapping a driver or decoding failure
    pub fn table_read_failed<E>(table: impl ToString, context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TableRead {
            table: table.to_string(),
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Creates a table read error without an underlying cause
    pub fn table_read(table: impl ToString, context: impl Into<String>) -> Self {
        Self::TableRead {
            table: table.to_string(),
            context: context.into(),
            source: None,
        }
    }

    /// Creates a table write error wrapping an I/O, Arrow or Parquet failure
    pub fn table_write_failed<E>(
        path: impl Into<PathBuf>,
        context: impl Into<String>,
        error: E,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::TableWrite {
            path: path.into(),
            context: context.into(),
            source: Some(Box::new(error)),
        }
    }

    /// Returns true when the error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::TableRead { .. } | Self::TableWrite { .. })
    }

    /// Renders the error with its full source chain on one line.
    ///
    /// Used for the per-table failure message, where the driver's own
    /// message is usually the useful part.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}
