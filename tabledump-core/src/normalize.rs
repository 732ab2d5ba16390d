//! Datetime normalization applied to every frame before it is written.
//!
//! Parquet readers disagree on nanosecond timestamps, and SQL Server
//! `datetime2` values outside 1677–2262 do not fit in 64-bit nanoseconds at
//! all. Every time-of-day and timestamp column is therefore lowered (or
//! raised, for `smalldatetime`/`datetime`) to microsecond precision.
//! Sub-microsecond digits are truncated, never rounded.

use crate::frame::{Cell, TableFrame};
use arrow::datatypes::TimeUnit;
use chrono::SubsecRound;

/// Precision every temporal column is written at.
pub const TARGET_UNIT: TimeUnit = TimeUnit::Microsecond;

/// Number of fractional-second digits kept by [`TARGET_UNIT`].
const TARGET_DIGITS: u16 = 6;

/// Normalizes all temporal columns of `frame` to microsecond precision.
///
/// Returns the names of the columns whose kind changed.
pub fn normalize_datetimes(frame: &mut TableFrame) -> Vec<String> {
    let mut changed = Vec::new();

    for column in frame.columns_mut() {
        if !column.kind.is_temporal() {
            continue;
        }

        for cell in &mut column.cells {
            truncate_cell(cell);
        }

        if column.kind.time_unit() != Some(TARGET_UNIT) {
            tracing::trace!(
                column = %column.name,
                from = %column.kind,
                "normalizing column to microsecond precision"
            );
            column.kind = column.kind.with_time_unit(TARGET_UNIT);
            changed.push(column.name.clone());
        }
    }

    changed
}

fn truncate_cell(cell: &mut Cell) {
    match cell {
        Cell::Time(t) => *t = t.trunc_subsecs(TARGET_DIGITS),
        Cell::DateTime(dt) => *dt = dt.trunc_subsecs(TARGET_DIGITS),
        Cell::DateTimeTz(dt) => *dt = dt.trunc_subsecs(TARGET_DIGITS),
        _ => {}
    }
}

/// Returns true when every temporal column of `frame` is at microsecond
/// precision.
pub fn is_normalized(frame: &TableFrame) -> bool {
    frame
        .columns()
        .iter()
        .filter_map(|c| c.kind.time_unit())
        .all(|unit| unit == TARGET_UNIT)
}
