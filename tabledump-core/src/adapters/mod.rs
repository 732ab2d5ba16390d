//! Database adapter traits.
//!
//! The runner talks to the database through two traits:
//! - [`Connector`] opens a session from a [`ConnectionConfig`] and credentials
//! - [`TableSource`] is the open session: it lists base tables, reads one
//!   table at a time into a [`TableFrame`], and is closed exactly once
//!
//! The SQL Server implementation lives in [`mssql`]; tests inject in-memory
//! implementations through the same traits.

use crate::{
    Result,
    config::ConnectionConfig,
    frame::TableFrame,
    models::TableRef,
    security::Credentials,
};
use async_trait::async_trait;

#[cfg(feature = "mssql")]
pub mod mssql;

/// Opens database sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type produced by this connector.
    type Source: TableSource;

    /// Opens a live session.
    ///
    /// # Errors
    /// Returns [`TableDumpError::Connection`](crate::TableDumpError::Connection)
    /// if the server cannot be reached or rejects the login.
    async fn connect(
        &self,
        config: &ConnectionConfig,
        credentials: &Credentials,
    ) -> Result<Self::Source>;
}

/// An open database session.
///
/// The session is used for one query at a time and owned by a single
/// caller for its whole life.
#[async_trait]
pub trait TableSource: Send {
    /// Lists all base tables (no views), ordered by schema then name.
    ///
    /// # Errors
    /// Returns [`TableDumpError::CatalogQuery`](crate::TableDumpError::CatalogQuery)
    /// if the catalog cannot be queried.
    async fn list_tables(&mut self) -> Result<Vec<TableRef>>;

    /// Reads every row of `table` into memory.
    ///
    /// # Errors
    /// Returns [`TableDumpError::TableRead`](crate::TableDumpError::TableRead)
    /// if the query fails or a value cannot be decoded.
    async fn read_table(&mut self, table: &TableRef) -> Result<TableFrame>;

    /// Runs a trivial round trip to verify the session.
    ///
    /// # Errors
    /// Returns [`TableDumpError::Connection`](crate::TableDumpError::Connection)
    /// if the server does not answer.
    async fn ping(&mut self) -> Result<()>;

    /// Closes the session.
    ///
    /// # Errors
    /// Returns an error if the server-side close handshake fails; the
    /// session is gone either way.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}
