//! SQL Server adapter built on Tiberius.
//!
//! This module provides:
//! - [`SqlServerConnector`], which opens a TDS session (direct TCP or named
//!   instance through SQL Browser, following one routing redirect)
//! - [`SqlServerSource`], which lists base tables from
//!   `INFORMATION_SCHEMA.TABLES` and reads tables with `SELECT *`
//!
//! Driver errors are wrapped without the connection details, so passwords
//! never reach logs.

use super::{Connector, TableSource};
use crate::{
    Result, TableDumpError,
    config::ConnectionConfig,
    frame::{Cell, ColumnKind, ColumnSpec, FrameBuilder, MAX_DECIMAL_PRECISION, TableFrame},
    models::TableRef,
    security::Credentials,
};
use arrow::datatypes::TimeUnit;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, Config, FromSql, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// Catalog query listing every base table in a stable order.
pub const CATALOG_QUERY: &str = "SELECT TABLE_SCHEMA, TABLE_NAME \
     FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_SCHEMA, TABLE_NAME";

/// Application name reported to the server.
const APPLICATION_NAME: &str = "tabledump";

/// Opens SQL Server sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerConnector;

impl SqlServerConnector {
    /// Creates a new connector.
    pub fn new() -> Self {
        Self
    }
}

/// Builds the Tiberius configuration for a connection.
pub fn tds_config(config: &ConnectionConfig, credentials: &Credentials) -> Config {
    let mut tds = Config::new();
    tds.host(&config.server.host);
    if let Some(port) = config.server.port {
        tds.port(port);
    }
    if config.server.uses_sql_browser()
        && let Some(instance) = &config.server.instance
    {
        tds.instance_name(instance);
    }
    if let Some(database) = &config.database {
        tds.database(database);
    }
    tds.application_name(APPLICATION_NAME);
    tds.authentication(AuthMethod::sql_server(
        credentials.username(),
        credentials.password(),
    ));
    if config.trust_server_certificate {
        tds.trust_cert();
    }
    tds
}

async fn open_tcp(tds: &Config, sql_browser: bool) -> Result<TcpStream> {
    let tcp = if sql_browser {
        TcpStream::connect_named(tds)
            .await
            .map_err(|e| TableDumpError::connection_failed("SQL Browser lookup failed", e))?
    } else {
        TcpStream::connect(tds.get_addr())
            .await
            .map_err(|e| TableDumpError::connection_failed("TCP connect failed", e))?
    };

    tcp.set_nodelay(true)
        .map_err(|e| TableDumpError::connection_failed("failed to configure socket", e))?;
    Ok(tcp)
}

async fn connect_client(
    config: &ConnectionConfig,
    credentials: &Credentials,
) -> Result<Client<Compat<TcpStream>>> {
    let tds = tds_config(config, credentials);
    let tcp = open_tcp(&tds, config.server.uses_sql_browser()).await?;

    match Client::connect(tds.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways redirect the login to the actual node.
        Err(tiberius::error::Error::Routing { host, port }) => {
            tracing::debug!("Server redirected connection to {}:{}", host, port);
            let mut routed = tds;
            routed.host(&host);
            routed.port(port);
            let tcp = open_tcp(&routed, false).await?;
            Client::connect(routed, tcp.compat_write())
                .await
                .map_err(|e| TableDumpError::connection_failed("login failed after redirect", e))
        }
        Err(e) => Err(TableDumpError::connection_failed("login failed", e)),
    }
}

#[async_trait]
impl Connector for SqlServerConnector {
    type Source = SqlServerSource;

    async fn connect(
        &self,
        config: &ConnectionConfig,
        credentials: &Credentials,
    ) -> Result<SqlServerSource> {
        config.validate()?;
        tracing::debug!("Connecting to {}", config);

        let connecting = connect_client(config, credentials);
        let client = tokio::time::timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| {
                TableDumpError::connection(format!(
                    "timed out after {}s",
                    config.connect_timeout.as_secs()
                ))
            })??;

        Ok(SqlServerSource { client })
    }
}

/// An open SQL Server session.
pub struct SqlServerSource {
    client: Client<Compat<TcpStream>>,
}

impl std::fmt::Debug for SqlServerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl TableSource for SqlServerSource {
    async fn list_tables(&mut self) -> Result<Vec<TableRef>> {
        let rows = self
            .client
            .simple_query(CATALOG_QUERY)
            .await
            .map_err(|e| {
                TableDumpError::catalog_failed("INFORMATION_SCHEMA.TABLES query failed", e)
            })?
            .into_first_result()
            .await
            .map_err(|e| TableDumpError::catalog_failed("failed to read catalog rows", e))?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: Option<&str> = row
                .try_get(0)
                .map_err(|e| TableDumpError::catalog_failed("invalid TABLE_SCHEMA value", e))?;
            let name: Option<&str> = row
                .try_get(1)
                .map_err(|e| TableDumpError::catalog_failed("invalid TABLE_NAME value", e))?;

            match (schema, name) {
                (Some(schema), Some(name)) => tables.push(TableRef::new(schema, name)),
                _ => return Err(TableDumpError::catalog("catalog returned a NULL table name")),
            }
        }

        Ok(tables)
    }

    async fn read_table(&mut self, table: &TableRef) -> Result<TableFrame> {
        let query = format!("SELECT * FROM {}", table.quoted_name());
        tracing::trace!("Executing: {}", query);

        let mut stream = self
            .client
            .simple_query(query)
            .await
            .map_err(|e| TableDumpError::table_read_failed(table, "query failed", e))?;

        let specs = stream
            .columns()
            .await
            .map_err(|e| {
                TableDumpError::table_read_failed(table, "failed to read column metadata", e)
            })?
            .map(|columns| {
                columns
                    .iter()
                    .map(|c| column_spec(c.name(), c.column_type()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut builder = FrameBuilder::new(specs);
        let mut rows = stream.into_row_stream();

        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| TableDumpError::table_read_failed(table, "failed to fetch row", e))?
        {
            let cells = row
                .into_iter()
                .map(cell_from_data)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    TableDumpError::table_read_failed(table, "failed to decode value", e)
                })?;

            builder
                .push_row(cells)
                .map_err(|e| TableDumpError::table_read_failed(table, "unexpected value", e))?;
        }

        Ok(builder.finish())
    }

    async fn ping(&mut self) -> Result<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| TableDumpError::connection_failed("ping failed", e))?
            .into_row()
            .await
            .map_err(|e| TableDumpError::connection_failed("ping failed", e))?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .map_err(|e| TableDumpError::connection_failed("failed to close connection", e))
    }
}

/// Maps result-set metadata to a frame column.
///
/// Nullable fixed-width types (`intn`, `floatn`, `decimaln`, ...) do not
/// reveal their width in the column metadata, so those columns take their
/// exact kind from the first non-null value.
///
/// `money` and `smallmoney` are stored as `Float64` because the driver
/// decodes them as `f64`. The stored values are binary approximations, not
/// exact decimals, and amounts above 2^53 / 10^4 also lose whole units.
pub fn column_spec(name: &str, column_type: ColumnType) -> ColumnSpec {
    let decimal = ColumnKind::Decimal {
        precision: MAX_DECIMAL_PRECISION,
        scale: 0,
    };

    #[allow(unreachable_patterns)]
    match column_type {
        ColumnType::Null => ColumnSpec::exact(name, ColumnKind::Null),
        ColumnType::Bit | ColumnType::Bitn => ColumnSpec::exact(name, ColumnKind::Boolean),
        ColumnType::Int1 => ColumnSpec::exact(name, ColumnKind::UInt8),
        ColumnType::Int2 => ColumnSpec::exact(name, ColumnKind::Int16),
        ColumnType::Int4 => ColumnSpec::exact(name, ColumnKind::Int32),
        ColumnType::Int8 => ColumnSpec::exact(name, ColumnKind::Int64),
        ColumnType::Intn => ColumnSpec::inferred(name, ColumnKind::Int64),
        ColumnType::Float4 => ColumnSpec::exact(name, ColumnKind::Float32),
        ColumnType::Float8 | ColumnType::Money | ColumnType::Money4 => {
            ColumnSpec::exact(name, ColumnKind::Float64)
        }
        ColumnType::Floatn => ColumnSpec::inferred(name, ColumnKind::Float64),
        ColumnType::Decimaln | ColumnType::Numericn => ColumnSpec::inferred(name, decimal),
        ColumnType::Guid
        | ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml => ColumnSpec::exact(name, ColumnKind::Utf8),
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image | ColumnType::Udt => {
            ColumnSpec::exact(name, ColumnKind::Binary)
        }
        ColumnType::Daten => ColumnSpec::exact(name, ColumnKind::Date),
        ColumnType::Timen => ColumnSpec::exact(name, ColumnKind::Time(TimeUnit::Nanosecond)),
        ColumnType::Datetime4 => ColumnSpec::exact(name, ColumnKind::Timestamp(TimeUnit::Second)),
        ColumnType::Datetime => {
            ColumnSpec::exact(name, ColumnKind::Timestamp(TimeUnit::Millisecond))
        }
        // datetimen carries either datetime or smalldatetime values
        ColumnType::Datetimen => {
            ColumnSpec::inferred(name, ColumnKind::Timestamp(TimeUnit::Millisecond))
        }
        ColumnType::Datetime2 => {
            ColumnSpec::exact(name, ColumnKind::Timestamp(TimeUnit::Nanosecond))
        }
        ColumnType::DatetimeOffsetn => {
            ColumnSpec::exact(name, ColumnKind::TimestampTz(TimeUnit::Nanosecond))
        }
        // sql_variant and anything newer: let the values decide
        _ => ColumnSpec::inferred(name, ColumnKind::Utf8),
    }
}

/// Converts one decoded value into a frame cell.
///
/// # Errors
/// Returns the driver's conversion error for values that cannot be
/// represented, e.g. invalid dates.
pub fn cell_from_data(data: ColumnData<'static>) -> tiberius::Result<Cell> {
    #[allow(unreachable_patterns)]
    let cell = match data {
        ColumnData::U8(v) => v.map(Cell::U8),
        ColumnData::I16(v) => v.map(Cell::I16),
        ColumnData::I32(v) => v.map(Cell::I32),
        ColumnData::I64(v) => v.map(Cell::I64),
        ColumnData::F32(v) => v.map(Cell::F32),
        ColumnData::F64(v) => v.map(Cell::F64),
        ColumnData::Bit(v) => v.map(Cell::Bool),
        ColumnData::String(v) => v.map(|s| Cell::Text(s.into_owned())),
        // SQL Server renders uniqueidentifier in upper case
        ColumnData::Guid(v) => v.map(|g| Cell::Text(g.to_string().to_uppercase())),
        ColumnData::Binary(v) => v.map(|b| Cell::Binary(b.into_owned())),
        ColumnData::Numeric(v) => v.map(|n| Cell::Decimal {
            value: n.value(),
            scale: n.scale(),
        }),
        ColumnData::Xml(v) => v.map(|x| Cell::Text(x.into_owned().into_string())),
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?.map(Cell::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?.map(Cell::Time),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?.map(Cell::DateTime)
        }
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(&data)?.map(Cell::DateTimeTz)
        }
        other => {
            return Err(tiberius::error::Error::Conversion(
                format!("unsupported value {other:?}").into(),
            ));
        }
    };

    Ok(cell.unwrap_or(Cell::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerAddress;
    use tiberius::IntoSql;

    #[test]
    fn test_column_spec_exact_types() {
        assert_eq!(
            column_spec("id", ColumnType::Int4),
            ColumnSpec::exact("id", ColumnKind::Int32)
        );
        assert_eq!(
            column_spec("ModifiedDate", ColumnType::Datetime2),
            ColumnSpec::exact("ModifiedDate", ColumnKind::Timestamp(TimeUnit::Nanosecond))
        );
        assert_eq!(
            column_spec("rowguid", ColumnType::Guid),
            ColumnSpec::exact("rowguid", ColumnKind::Utf8)
        );
        assert_eq!(
            column_spec("OrganizationNode", ColumnType::Udt),
            ColumnSpec::exact("OrganizationNode", ColumnKind::Binary)
        );
    }

    #[test]
    fn test_column_spec_money_is_float() {
        assert_eq!(
            column_spec("ListPrice", ColumnType::Money),
            ColumnSpec::exact("ListPrice", ColumnKind::Float64)
        );
        assert_eq!(
            column_spec("Fee", ColumnType::Money4),
            ColumnSpec::exact("Fee", ColumnKind::Float64)
        );
    }

    #[test]
    fn test_column_spec_inferred_types() {
        assert!(column_spec("n", ColumnType::Intn).inferred);
        assert!(column_spec("f", ColumnType::Floatn).inferred);
        assert!(column_spec("d", ColumnType::Decimaln).inferred);
        assert!(column_spec("v", ColumnType::SSVariant).inferred);
        assert!(!column_spec("b", ColumnType::Bitn).inferred);
    }

    #[test]
    fn test_cell_from_scalar_data() {
        assert_eq!(cell_from_data(ColumnData::I32(Some(42))).unwrap(), Cell::I32(42));
        assert_eq!(cell_from_data(ColumnData::I32(None)).unwrap(), Cell::Null);
        assert_eq!(cell_from_data(ColumnData::Bit(Some(true))).unwrap(), Cell::Bool(true));
        assert_eq!(
            cell_from_data(ColumnData::String(Some("Bike".into()))).unwrap(),
            Cell::Text("Bike".to_string())
        );
        assert_eq!(
            cell_from_data(ColumnData::Binary(Some(vec![1u8, 2, 3].into()))).unwrap(),
            Cell::Binary(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_cell_from_datetime2_keeps_sub_microsecond_digits() {
        let value = NaiveDate::from_ymd_opt(2014, 6, 30)
            .unwrap()
            .and_hms_nano_opt(0, 0, 0, 123_456_700)
            .unwrap();

        let cell = cell_from_data(value.into_sql()).unwrap();
        assert_eq!(cell, Cell::DateTime(value));
    }

    #[test]
    fn test_cell_from_date_and_time() {
        let day = NaiveDate::from_ymd_opt(2008, 4, 30).unwrap();
        assert_eq!(cell_from_data(day.into_sql()).unwrap(), Cell::Date(day));

        let time = NaiveTime::from_hms_opt(13, 45, 0).unwrap();
        assert_eq!(cell_from_data(time.into_sql()).unwrap(), Cell::Time(time));
    }

    #[test]
    fn test_tds_config_address() {
        let config = ConnectionConfig {
            server: "db.internal,14330".parse().unwrap(),
            database: Some("AdventureWorks2022".to_string()),
            ..Default::default()
        };
        let creds = Credentials::new("sa".to_string(), "secret".to_string());

        let tds = tds_config(&config, &creds);
        assert_eq!(tds.get_addr(), "db.internal:14330");
    }

    #[test]
    fn test_tds_config_named_instance_with_port_connects_directly() {
        let config = ConnectionConfig {
            server: r"sql01\DEV,1500".parse().unwrap(),
            ..Default::default()
        };
        let creds = Credentials::new("sa".to_string(), "secret".to_string());

        assert!(!config.server.uses_sql_browser());
        assert_eq!(tds_config(&config, &creds).get_addr(), "sql01:1500");
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            // accept, then never answer the prelogin
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });

        let config = ConnectionConfig {
            server: ServerAddress::new("127.0.0.1").with_port(port),
            connect_timeout: std::time::Duration::from_secs(1),
            ..Default::default()
        };
        let creds = Credentials::new("sa".to_string(), "secret".to_string());

        let started = std::time::Instant::now();
        let err = SqlServerConnector::new()
            .connect(&config, &creds)
            .await
            .unwrap_err();

        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(matches!(err, TableDumpError::Connection { .. }));
        assert!(err.to_string().contains("timed out after 1s"));
        server.abort();
    }
}
