//! In-memory database used by the pipeline tests.

#![allow(dead_code)]

use arrow::datatypes::TimeUnit;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tabledump_core::{
    Cell, ColumnKind, ColumnSpec, ConnectionConfig, Connector, ExportConfig, FrameBuilder,
    OutputConfig, Result, TableDumpError, TableFrame, TableRef, TableSource, security::Credentials,
};

/// A table served by [`MemoryConnector`]; `None` fails on read.
pub type MemoryTable = (TableRef, Option<TableFrame>);

/// Fake connector serving fixed tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    pub tables: Vec<MemoryTable>,
    pub fail_connect: bool,
    pub fail_catalog: bool,
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(tables: Vec<MemoryTable>) -> Self {
        Self {
            tables,
            ..Default::default()
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Source = MemorySource;

    async fn connect(
        &self,
        _config: &ConnectionConfig,
        _credentials: &Credentials,
    ) -> Result<MemorySource> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(TableDumpError::connection("Login failed for user 'sa'"));
        }
        Ok(MemorySource {
            tables: self.tables.clone(),
            fail_catalog: self.fail_catalog,
            closes: Arc::clone(&self.closes),
        })
    }
}

/// Session opened by [`MemoryConnector`].
#[derive(Debug)]
pub struct MemorySource {
    tables: Vec<MemoryTable>,
    fail_catalog: bool,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl TableSource for MemorySource {
    async fn list_tables(&mut self) -> Result<Vec<TableRef>> {
        if self.fail_catalog {
            return Err(TableDumpError::catalog("permission denied on INFORMATION_SCHEMA"));
        }
        let mut tables: Vec<TableRef> = self.tables.iter().map(|(t, _)| t.clone()).collect();
        tables.sort();
        Ok(tables)
    }

    async fn read_table(&mut self, table: &TableRef) -> Result<TableFrame> {
        match self.tables.iter().find(|(t, _)| t == table) {
            Some((_, Some(frame))) => Ok(frame.clone()),
            _ => Err(TableDumpError::table_read(
                table,
                format!("Invalid object name '{}'", table),
            )),
        }
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Timestamp with sub-microsecond digits.
pub fn precise_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2014, 6, 30)
        .unwrap()
        .and_hms_nano_opt(0, 0, 0, 123_456_789)
        .unwrap()
}

/// A `(id int, name nvarchar, modified datetime2)` table with `rows` rows.
pub fn people_frame(rows: usize) -> TableFrame {
    let mut builder = FrameBuilder::new(vec![
        ColumnSpec::exact("BusinessEntityID", ColumnKind::Int32),
        ColumnSpec::exact("FirstName", ColumnKind::Utf8),
        ColumnSpec::exact("ModifiedDate", ColumnKind::Timestamp(TimeUnit::Nanosecond)),
    ]);
    for i in 0..rows {
        let id = i32::try_from(i).unwrap() + 1;
        let name = if i % 3 == 0 {
            Cell::Null
        } else {
            Cell::Text(format!("Person {id}"))
        };
        builder
            .push_row(vec![Cell::I32(id), name, Cell::DateTime(precise_timestamp())])
            .unwrap();
    }
    builder.finish()
}

/// A config writing to `dir`.
pub fn export_config(dir: &std::path::Path) -> ExportConfig {
    ExportConfig::new(
        ConnectionConfig::default(),
        Credentials::new("sa".to_string(), "YourStrong!Passw0rd".to_string()),
        OutputConfig::new(dir),
    )
}
