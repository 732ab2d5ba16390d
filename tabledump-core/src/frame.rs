//! In-memory table snapshots and their conversion to Arrow.
//!
//! A [`TableFrame`] holds the result of one `SELECT *` with an explicit
//! schema captured at query time: an ordered list of columns, each with a
//! name and a [`ColumnKind`]. Values are stored column by column as
//! [`Cell`]s in server-returned row order.
//!
//! Date/time cells keep whatever precision the driver produced. The column
//! kind records the precision the column is declared with; the
//! [`normalize`](crate::normalize) step lowers it to microseconds before the
//! frame is converted with [`TableFrame::to_record_batch`].

use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, NullArray, StringArray, Time32MillisecondArray,
    Time32SecondArray, Time64MicrosecondArray, Time64NanosecondArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::fmt;
use std::sync::Arc;

/// Time zone attached to offset-aware timestamp columns.
pub const UTC_TIMEZONE: &str = "UTC";

/// Largest precision a 128-bit decimal can hold.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Semantic type of a frame column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Column whose values are all NULL and whose type is unknown
    Null,
    /// bit
    Boolean,
    /// tinyint (unsigned in SQL Server)
    UInt8,
    /// smallint
    Int16,
    /// int
    Int32,
    /// bigint
    Int64,
    /// real
    Float32,
    /// float, money
    Float64,
    /// decimal / numeric
    Decimal {
        /// Total number of digits
        precision: u8,
        /// Digits after the decimal point
        scale: u8,
    },
    /// Character data, XML and GUIDs
    Utf8,
    /// Binary data and CLR user-defined types
    Binary,
    /// Calendar date without time
    Date,
    /// Time of day at the given precision
    Time(TimeUnit),
    /// Timestamp without time zone at the given precision
    Timestamp(TimeUnit),
    /// Timestamp with a UTC offset at the given precision, stored as UTC
    TimestampTz(TimeUnit),
}

impl ColumnKind {
    /// Returns true for kinds carrying a sub-day time component.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Time(_) | Self::Timestamp(_) | Self::TimestampTz(_)
        )
    }

    /// Returns the time unit of temporal kinds.
    pub fn time_unit(&self) -> Option<TimeUnit> {
        match self {
            Self::Time(unit) | Self::Timestamp(unit) | Self::TimestampTz(unit) => Some(*unit),
            _ => None,
        }
    }

    /// Returns the same kind with its time unit replaced.
    ///
    /// Non-temporal kinds are returned unchanged.
    #[must_use]
    pub fn with_time_unit(self, unit: TimeUnit) -> Self {
        match self {
            Self::Time(_) => Self::Time(unit),
            Self::Timestamp(_) => Self::Timestamp(unit),
            Self::TimestampTz(_) => Self::TimestampTz(unit),
            other => other,
        }
    }

    /// Returns true if `cell` can be stored in a column of this kind.
    pub fn accepts(&self, cell: &Cell) -> bool {
        matches!(
            (self, cell),
            (_, Cell::Null)
                | (Self::Boolean, Cell::Bool(_))
                | (Self::UInt8, Cell::U8(_))
                | (Self::Int16, Cell::I16(_))
                | (Self::Int32, Cell::I32(_))
                | (Self::Int64, Cell::I64(_))
                | (Self::Float32, Cell::F32(_))
                | (Self::Float64, Cell::F64(_))
                | (Self::Decimal { .. }, Cell::Decimal { .. })
                | (Self::Utf8, Cell::Text(_))
                | (Self::Binary, Cell::Binary(_))
                | (Self::Date, Cell::Date(_))
                | (Self::Time(_), Cell::Time(_))
                | (Self::Timestamp(_), Cell::DateTime(_))
                | (Self::TimestampTz(_), Cell::DateTimeTz(_))
        )
    }

    /// Arrow data type of this kind.
    pub fn arrow_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean => DataType::Boolean,
            Self::UInt8 => DataType::UInt8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
            Self::Decimal { precision, scale } => DataType::Decimal128(*precision, *scale as i8),
            Self::Utf8 => DataType::Utf8,
            Self::Binary => DataType::Binary,
            Self::Date => DataType::Date32,
            Self::Time(unit) => match unit {
                TimeUnit::Second | TimeUnit::Millisecond => DataType::Time32(*unit),
                TimeUnit::Microsecond | TimeUnit::Nanosecond => DataType::Time64(*unit),
            },
            Self::Timestamp(unit) => DataType::Timestamp(*unit, None),
            Self::TimestampTz(unit) => DataType::Timestamp(*unit, Some(UTC_TIMEZONE.into())),
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal { precision, scale } => write!(f, "Decimal({precision}, {scale})"),
            Self::Time(unit) => write!(f, "Time({unit:?})"),
            Self::Timestamp(unit) => write!(f, "Timestamp({unit:?})"),
            Self::TimestampTz(unit) => write!(f, "TimestampTz({unit:?})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A single value read from the database.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// SQL NULL
    Null,
    /// bit
    Bool(bool),
    /// tinyint
    U8(u8),
    /// smallint
    I16(i16),
    /// int
    I32(i32),
    /// bigint
    I64(i64),
    /// real
    F32(f32),
    /// float / money
    F64(f64),
    /// Unscaled decimal value and its scale
    Decimal {
        /// Value multiplied by `10^scale`
        value: i128,
        /// Digits after the decimal point
        scale: u8,
    },
    /// Character data
    Text(String),
    /// Binary data
    Binary(Vec<u8>),
    /// date
    Date(NaiveDate),
    /// time
    Time(NaiveTime),
    /// smalldatetime / datetime / datetime2
    DateTime(NaiveDateTime),
    /// datetimeoffset
    DateTimeTz(DateTime<FixedOffset>),
}

impl Cell {
    /// Kind a column would get if this were its first non-null value.
    ///
    /// Temporal values report nanosecond precision, the finest any SQL
    /// Server type carries.
    pub fn natural_kind(&self) -> ColumnKind {
        match self {
            Self::Null => ColumnKind::Null,
            Self::Bool(_) => ColumnKind::Boolean,
            Self::U8(_) => ColumnKind::UInt8,
            Self::I16(_) => ColumnKind::Int16,
            Self::I32(_) => ColumnKind::Int32,
            Self::I64(_) => ColumnKind::Int64,
            Self::F32(_) => ColumnKind::Float32,
            Self::F64(_) => ColumnKind::Float64,
            Self::Decimal { scale, .. } => ColumnKind::Decimal {
                precision: MAX_DECIMAL_PRECISION,
                scale: *scale,
            },
            Self::Text(_) => ColumnKind::Utf8,
            Self::Binary(_) => ColumnKind::Binary,
            Self::Date(_) => ColumnKind::Date,
            Self::Time(_) => ColumnKind::Time(TimeUnit::Nanosecond),
            Self::DateTime(_) => ColumnKind::Timestamp(TimeUnit::Nanosecond),
            Self::DateTimeTz(_) => ColumnKind::TimestampTz(TimeUnit::Nanosecond),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Decimal { .. } => "decimal",
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "datetime",
            Self::DateTimeTz(_) => "datetimeoffset",
        }
    }
}

/// Errors raised while building or converting a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A row had a different number of values than the schema
    #[error("row {row} has {actual} values, expected {expected}")]
    RowWidth {
        /// Zero-based row index
        row: usize,
        /// Number of columns in the schema
        expected: usize,
        /// Number of values in the row
        actual: usize,
    },

    /// A value did not match its column kind
    #[error("column '{column}' ({kind}) cannot hold a {value} value")]
    TypeMismatch {
        /// Column name
        column: String,
        /// Declared column kind
        kind: ColumnKind,
        /// Type of the offending value
        value: &'static str,
    },

    /// A temporal value cannot be represented at the column precision
    #[error("column '{column}': {value} is out of range for {unit:?} precision")]
    OutOfRange {
        /// Column name
        column: String,
        /// Rendered value
        value: String,
        /// Target unit
        unit: TimeUnit,
    },

    /// A decimal value cannot be rescaled to the column scale
    #[error("column '{column}': decimal with scale {from} cannot be stored at scale {to}")]
    DecimalScale {
        /// Column name
        column: String,
        /// Scale of the value
        from: u8,
        /// Scale of the column
        to: u8,
    },

    /// Arrow rejected the assembled arrays
    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

/// One column of a frame: its schema entry and its values.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameColumn {
    /// Column name as returned by the server
    pub name: String,
    /// Semantic type
    pub kind: ColumnKind,
    /// Values in row order
    pub cells: Vec<Cell>,
}

impl FrameColumn {
    fn mismatch(&self, cell: &Cell) -> FrameError {
        FrameError::TypeMismatch {
            column: self.name.clone(),
            kind: self.kind,
            value: cell.type_name(),
        }
    }
}

/// Declared column used to start a [`FrameBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Declared kind, or the fallback kind when `inferred` is set
    pub kind: ColumnKind,
    /// Whether the exact kind is taken from the first non-null value
    pub inferred: bool,
}

impl ColumnSpec {
    /// A column whose kind is known from metadata.
    pub fn exact(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inferred: false,
        }
    }

    /// A column whose kind is refined from its data; `fallback` is used
    /// when every value is NULL.
    pub fn inferred(name: impl Into<String>, fallback: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind: fallback,
            inferred: true,
        }
    }
}

/// In-memory snapshot of one query result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableFrame {
    columns: Vec<FrameColumn>,
    row_count: usize,
}

impl TableFrame {
    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Columns in projection order.
    pub fn columns(&self) -> &[FrameColumn] {
        &self.columns
    }

    /// Mutable access to the columns, used by the transform step.
    pub fn columns_mut(&mut self) -> &mut [FrameColumn] {
        &mut self.columns
    }

    /// The explicit schema: ordered (name, kind) pairs.
    pub fn schema(&self) -> Vec<(&str, ColumnKind)> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.kind))
            .collect()
    }

    /// Arrow schema matching [`TableFrame::to_record_batch`].
    pub fn arrow_schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(&c.name, c.kind.arrow_type(), true))
                .collect::<Vec<_>>(),
        )
    }

    /// Converts the frame into a single Arrow record batch.
    ///
    /// # Errors
    /// Fails when a value does not match its column kind, or a temporal
    /// value cannot be represented at its column's precision.
    pub fn to_record_batch(&self) -> Result<RecordBatch, FrameError> {
        let arrays = self
            .columns
            .iter()
            .map(|column| build_array(column, self.row_count))
            .collect::<Result<Vec<_>, _>>()?;

        let options = RecordBatchOptions::new().with_row_count(Some(self.row_count));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(self.arrow_schema()),
            arrays,
            &options,
        )?)
    }
}

/// Accumulates rows into a [`TableFrame`].
#[derive(Debug)]
pub struct FrameBuilder {
    columns: Vec<FrameColumn>,
    pending: Vec<bool>,
    row_count: usize,
}

impl FrameBuilder {
    /// Starts a frame with the given column specs.
    pub fn new(specs: Vec<ColumnSpec>) -> Self {
        let pending = specs.iter().map(|s| s.inferred).collect();
        let columns = specs
            .into_iter()
            .map(|spec| FrameColumn {
                name: spec.name,
                kind: spec.kind,
                cells: Vec::new(),
            })
            .collect();
        Self {
            columns,
            pending,
            row_count: 0,
        }
    }

    /// Appends one row.
    ///
    /// # Errors
    /// Fails if the row width differs from the schema or a value does not
    /// fit its column.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), FrameError> {
        if row.len() != self.columns.len() {
            return Err(FrameError::RowWidth {
                row: self.row_count,
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        for ((column, pending), cell) in self.columns.iter_mut().zip(&mut self.pending).zip(row) {
            if *pending && cell != Cell::Null {
                column.kind = refine_kind(column.kind, &cell);
                *pending = false;
            }
            if !column.kind.accepts(&cell) {
                return Err(column.mismatch(&cell));
            }
            column.cells.push(cell);
        }

        self.row_count += 1;
        Ok(())
    }

    /// Finishes the frame.
    pub fn finish(self) -> TableFrame {
        TableFrame {
            columns: self.columns,
            row_count: self.row_count,
        }
    }
}

// Inferred temporal columns keep the declared precision, everything else
// takes the value's own kind.
fn refine_kind(declared: ColumnKind, cell: &Cell) -> ColumnKind {
    let natural = cell.natural_kind();
    match (declared.time_unit(), natural.is_temporal()) {
        (Some(unit), true) => natural.with_time_unit(unit),
        _ => natural,
    }
}

fn build_array(column: &FrameColumn, row_count: usize) -> Result<ArrayRef, FrameError> {
    let array: ArrayRef = match column.kind {
        ColumnKind::Null => Arc::new(NullArray::new(row_count)),
        ColumnKind::Boolean => Arc::new(BooleanArray::from(values(column, |c| match c {
            Cell::Bool(v) => Some(*v),
            _ => None,
        })?)),
        ColumnKind::UInt8 => Arc::new(UInt8Array::from(values(column, |c| match c {
            Cell::U8(v) => Some(*v),
            _ => None,
        })?)),
        ColumnKind::Int16 => Arc::new(Int16Array::from(values(column, |c| match c {
            Cell::I16(v) => Some(*v),
            _ => None,
        })?)),
        ColumnKind::Int32 => Arc::new(Int32Array::from(values(column, |c| match c {
            Cell::I32(v) => Some(*v),
            _ => None,
        })?)),
        ColumnKind::Int64 => Arc::new(Int64Array::from(values(column, |c| match c {
            Cell::I64(v) => Some(*v),
            _ => None,
        })?)),
        ColumnKind::Float32 => Arc::new(Float32Array::from(values(column, |c| match c {
            Cell::F32(v) => Some(*v),
            _ => None,
        })?)),
        ColumnKind::Float64 => Arc::new(Float64Array::from(values(column, |c| match c {
            Cell::F64(v) => Some(*v),
            _ => None,
        })?)),
        ColumnKind::Decimal { precision, scale } => {
            let unscaled = decimal_values(column, scale)?;
            Arc::new(
                Decimal128Array::from(unscaled).with_precision_and_scale(precision, scale as i8)?,
            )
        }
        ColumnKind::Utf8 => Arc::new(StringArray::from(values(column, |c| match c {
            Cell::Text(v) => Some(v.as_str()),
            _ => None,
        })?)),
        ColumnKind::Binary => Arc::new(BinaryArray::from(values(column, |c| match c {
            Cell::Binary(v) => Some(v.as_slice()),
            _ => None,
        })?)),
        ColumnKind::Date => Arc::new(Date32Array::from(values(column, |c| match c {
            Cell::Date(d) => Some(days_since_epoch(*d)),
            _ => None,
        })?)),
        ColumnKind::Time(unit) => time_array(column, unit)?,
        ColumnKind::Timestamp(unit) => timestamp_array(column, unit, None)?,
        ColumnKind::TimestampTz(unit) => timestamp_array(column, unit, Some(UTC_TIMEZONE))?,
    };
    Ok(array)
}

fn values<'a, T>(
    column: &'a FrameColumn,
    extract: impl Fn(&'a Cell) -> Option<T>,
) -> Result<Vec<Option<T>>, FrameError> {
    column
        .cells
        .iter()
        .map(|cell| match cell {
            Cell::Null => Ok(None),
            other => extract(other)
                .map(Some)
                .ok_or_else(|| column.mismatch(other)),
        })
        .collect()
}

fn decimal_values(column: &FrameColumn, target_scale: u8) -> Result<Vec<Option<i128>>, FrameError> {
    column
        .cells
        .iter()
        .map(|cell| match cell {
            Cell::Null => Ok(None),
            Cell::Decimal { value, scale } => rescale(*value, *scale, target_scale)
                .map(Some)
                .ok_or_else(|| FrameError::DecimalScale {
                    column: column.name.clone(),
                    from: *scale,
                    to: target_scale,
                }),
            other => Err(column.mismatch(other)),
        })
        .collect()
}

fn rescale(value: i128, from: u8, to: u8) -> Option<i128> {
    match from.cmp(&to) {
        std::cmp::Ordering::Equal => Some(value),
        std::cmp::Ordering::Less => 10_i128
            .checked_pow(u32::from(to - from))
            .and_then(|factor| value.checked_mul(factor)),
        // Dropping digits would lose data.
        std::cmp::Ordering::Greater => {
            let factor = 10_i128.checked_pow(u32::from(from - to))?;
            (value % factor == 0).then(|| value / factor)
        }
    }
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    // SQL Server dates span years 1..=9999, well inside i32 days.
    i32::try_from(date.signed_duration_since(epoch).num_days()).unwrap_or(i32::MIN)
}

fn time_array(column: &FrameColumn, unit: TimeUnit) -> Result<ArrayRef, FrameError> {
    let ticks = values(column, |c| match c {
        Cell::Time(t) => Some(time_ticks(*t, unit)),
        _ => None,
    })?;

    // Ticks of a single day fit in i32 for second and millisecond units.
    let narrow = |ticks: Vec<Option<i64>>| -> Vec<Option<i32>> {
        ticks
            .into_iter()
            .map(|t| t.and_then(|v| i32::try_from(v).ok()))
            .collect()
    };

    Ok(match unit {
        TimeUnit::Second => Arc::new(Time32SecondArray::from(narrow(ticks))),
        TimeUnit::Millisecond => Arc::new(Time32MillisecondArray::from(narrow(ticks))),
        TimeUnit::Microsecond => Arc::new(Time64MicrosecondArray::from(ticks)),
        TimeUnit::Nanosecond => Arc::new(Time64NanosecondArray::from(ticks)),
    })
}

fn time_ticks(time: NaiveTime, unit: TimeUnit) -> i64 {
    let seconds = i64::from(time.num_seconds_from_midnight());
    let nanos = i64::from(time.nanosecond());
    match unit {
        TimeUnit::Second => seconds,
        TimeUnit::Millisecond => seconds * 1_000 + nanos / 1_000_000,
        TimeUnit::Microsecond => seconds * 1_000_000 + nanos / 1_000,
        TimeUnit::Nanosecond => seconds * 1_000_000_000 + nanos,
    }
}

fn timestamp_array(
    column: &FrameColumn,
    unit: TimeUnit,
    timezone: Option<&str>,
) -> Result<ArrayRef, FrameError> {
    let ticks = column
        .cells
        .iter()
        .map(|cell| {
            let utc = match cell {
                Cell::Null => return Ok(None),
                Cell::DateTime(dt) if timezone.is_none() => dt.and_utc(),
                Cell::DateTimeTz(dt) if timezone.is_some() => dt.with_timezone(&Utc),
                other => return Err(column.mismatch(other)),
            };
            timestamp_ticks(utc, unit)
                .map(Some)
                .ok_or_else(|| FrameError::OutOfRange {
                    column: column.name.clone(),
                    value: utc.to_rfc3339(),
                    unit,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match (unit, timezone) {
        (TimeUnit::Second, None) => Arc::new(TimestampSecondArray::from(ticks)),
        (TimeUnit::Second, Some(tz)) => {
            Arc::new(TimestampSecondArray::from(ticks).with_timezone(tz))
        }
        (TimeUnit::Millisecond, None) => Arc::new(TimestampMillisecondArray::from(ticks)),
        (TimeUnit::Millisecond, Some(tz)) => {
            Arc::new(TimestampMillisecondArray::from(ticks).with_timezone(tz))
        }
        (TimeUnit::Microsecond, None) => Arc::new(TimestampMicrosecondArray::from(ticks)),
        (TimeUnit::Microsecond, Some(tz)) => {
            Arc::new(TimestampMicrosecondArray::from(ticks).with_timezone(tz))
        }
        (TimeUnit::Nanosecond, None) => Arc::new(TimestampNanosecondArray::from(ticks)),
        (TimeUnit::Nanosecond, Some(tz)) => {
            Arc::new(TimestampNanosecondArray::from(ticks).with_timezone(tz))
        }
    })
}

// Sub-unit digits are dropped toward the earlier instant, the same way
// `timestamp_micros` treats the fractional second.
fn timestamp_ticks(utc: DateTime<Utc>, unit: TimeUnit) -> Option<i64> {
    match unit {
        TimeUnit::Second => Some(utc.timestamp()),
        TimeUnit::Millisecond => Some(utc.timestamp_millis()),
        TimeUnit::Microsecond => Some(utc.timestamp_micros()),
        TimeUnit::Nanosecond => utc.timestamp_nanos_opt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_builder_infers_kind_from_first_non_null() {
        let mut builder = FrameBuilder::new(vec![
            ColumnSpec::inferred("id", ColumnKind::Int64),
            ColumnSpec::exact("name", ColumnKind::Utf8),
        ]);
        builder.push_row(vec![Cell::Null, Cell::Null]).unwrap();
        builder
            .push_row(vec![Cell::I32(7), Cell::Text("a".into())])
            .unwrap();

        let frame = builder.finish();
        assert_eq!(frame.row_count(), 2);
        assert_eq!(
            frame.schema(),
            vec![("id", ColumnKind::Int32), ("name", ColumnKind::Utf8)]
        );
    }

    #[test]
    fn test_builder_keeps_fallback_for_all_null_column() {
        let mut builder = FrameBuilder::new(vec![ColumnSpec::inferred("n", ColumnKind::Float64)]);
        builder.push_row(vec![Cell::Null]).unwrap();

        let frame = builder.finish();
        assert_eq!(frame.columns()[0].kind, ColumnKind::Float64);
    }

    #[test]
    fn test_builder_rejects_mismatched_value() {
        let mut builder = FrameBuilder::new(vec![ColumnSpec::exact("flag", ColumnKind::Boolean)]);
        let err = builder.push_row(vec![Cell::I32(1)]).unwrap_err();
        assert!(matches!(err, FrameError::TypeMismatch { ref column, .. } if column == "flag"));
    }

    #[test]
    fn test_builder_rejects_wrong_width() {
        let mut builder = FrameBuilder::new(vec![ColumnSpec::exact("a", ColumnKind::Int32)]);
        let err = builder.push_row(vec![Cell::I32(1), Cell::I32(2)]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::RowWidth {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_inferred_temporal_keeps_declared_unit() {
        let mut builder = FrameBuilder::new(vec![ColumnSpec::inferred(
            "modified",
            ColumnKind::Timestamp(TimeUnit::Millisecond),
        )]);
        builder
            .push_row(vec![Cell::DateTime(ts("2024-01-02 03:04:05.123"))])
            .unwrap();

        let frame = builder.finish();
        assert_eq!(
            frame.columns()[0].kind,
            ColumnKind::Timestamp(TimeUnit::Millisecond)
        );
    }

    #[test]
    fn test_record_batch_preserves_order_and_types() {
        let mut builder = FrameBuilder::new(vec![
            ColumnSpec::exact("id", ColumnKind::Int32),
            ColumnSpec::exact("price", ColumnKind::Decimal { precision: 19, scale: 4 }),
            ColumnSpec::exact("modified", ColumnKind::Timestamp(TimeUnit::Microsecond)),
            ColumnSpec::exact("day", ColumnKind::Date),
        ]);
        builder
            .push_row(vec![
                Cell::I32(1),
                Cell::Decimal { value: 12_345, scale: 4 },
                Cell::DateTime(ts("2024-01-02 03:04:05.123456")),
                Cell::Date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()),
            ])
            .unwrap();
        builder
            .push_row(vec![
                Cell::I32(2),
                // Lower scale values are widened to the column scale.
                Cell::Decimal { value: 5, scale: 0 },
                Cell::Null,
                Cell::Null,
            ])
            .unwrap();

        let batch = builder.finish().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);

        let names: Vec<_> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["id", "price", "modified", "day"]);

        let price = batch
            .column(1)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(price.value(0), 12_345);
        assert_eq!(price.value(1), 50_000);

        let modified = batch
            .column(2)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(
            modified.value(0),
            ts("2024-01-02 03:04:05.123456").and_utc().timestamp_micros()
        );
        assert!(modified.is_null(1));

        let day = batch.column(3).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(day.value(0), 1);
    }

    #[test]
    fn test_empty_frame_keeps_schema() {
        let frame = FrameBuilder::new(vec![
            ColumnSpec::exact("a", ColumnKind::Utf8),
            ColumnSpec::inferred("b", ColumnKind::Int64),
        ])
        .finish();

        let batch = frame.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Int64);
    }

    #[test]
    fn test_offset_timestamps_are_stored_as_utc() {
        let local = DateTime::parse_from_rfc3339("2024-06-01T12:00:00+02:00").unwrap();
        let mut builder = FrameBuilder::new(vec![ColumnSpec::exact(
            "at",
            ColumnKind::TimestampTz(TimeUnit::Microsecond),
        )]);
        builder.push_row(vec![Cell::DateTimeTz(local)]).unwrap();

        let batch = builder.finish().to_record_batch().unwrap();
        let at = batch
            .column(0)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(
            at.value(0),
            DateTime::parse_from_rfc3339("2024-06-01T10:00:00Z")
                .unwrap()
                .timestamp_micros()
        );
        assert_eq!(
            batch.schema().field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, Some(UTC_TIMEZONE.into()))
        );
    }

    #[test]
    fn test_nanosecond_timestamp_out_of_range() {
        let mut builder = FrameBuilder::new(vec![ColumnSpec::exact(
            "ancient",
            ColumnKind::Timestamp(TimeUnit::Nanosecond),
        )]);
        builder
            .push_row(vec![Cell::DateTime(ts("0001-01-01 00:00:00.0"))])
            .unwrap();

        let err = builder.finish().to_record_batch().unwrap_err();
        assert!(matches!(err, FrameError::OutOfRange { .. }));
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(5, 0, 2), Some(500));
        assert_eq!(rescale(500, 2, 0), Some(5));
        assert_eq!(rescale(505, 2, 0), None);
        assert_eq!(rescale(1, 0, 0), Some(1));
    }

    #[test]
    fn test_time_ticks() {
        let t = NaiveTime::from_hms_nano_opt(1, 2, 3, 456_789_123).unwrap();
        assert_eq!(time_ticks(t, TimeUnit::Second), 3_723);
        assert_eq!(time_ticks(t, TimeUnit::Millisecond), 3_723_456);
        assert_eq!(time_ticks(t, TimeUnit::Microsecond), 3_723_456_789);
        assert_eq!(time_ticks(t, TimeUnit::Nanosecond), 3_723_456_789_123);
    }
}
