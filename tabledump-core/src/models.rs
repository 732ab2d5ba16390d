//! Data models shared by the adapters, the exporter and the runner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// File extension of every exported table.
pub const PARQUET_EXTENSION: &str = "parquet";

/// Identifies one base table in the source database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Schema the table belongs to (e.g. `Sales`)
    pub schema: String,
    /// Table name (e.g. `Customer`)
    pub name: String,
}

impl TableRef {
    /// Creates a new table reference.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the bracket-quoted two-part name, e.g. `[Sales].[Customer]`.
    ///
    /// Closing brackets inside identifiers are doubled so the result is
    /// always a single well-formed identifier pair.
    pub fn quoted_name(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }

    /// Returns the output file name, `{schema}_{table}.parquet`.
    ///
    /// Path separators and NUL characters cannot appear in a file name and
    /// are replaced by `_`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            sanitize_file_component(&self.schema),
            sanitize_file_component(&self.name),
            PARQUET_EXTENSION
        )
    }

    /// Returns the output path of this table inside `output_dir`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.file_name())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Quotes a SQL Server identifier with brackets.
pub fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

fn sanitize_file_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}

/// Outcome of exporting a single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportResult {
    /// The table was written to `path`
    Success {
        /// Number of rows written
        rows: u64,
        /// Final location of the Parquet file
        path: PathBuf,
    },
    /// The table could not be read or written
    Failure {
        /// Human-readable failure reason
        message: String,
    },
}

impl ExportResult {
    /// Returns true for a successful export.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A table together with the outcome of its export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    /// Table that was attempted
    pub table: TableRef,
    /// What happened
    #[serde(flatten)]
    pub result: ExportResult,
}

/// Final tally of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of base tables found in the catalog
    pub tables_found: usize,
    /// Number of tables exported successfully
    pub succeeded: usize,
    /// Number of tables that failed
    pub failed: usize,
    /// Directory the files were written to
    pub output_dir: PathBuf,
    /// One entry per attempted table, in catalog order
    pub outcomes: Vec<TableOutcome>,
}

impl RunSummary {
    /// Creates an empty summary for a run writing to `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Records one table outcome and updates the counters.
    pub fn record(&mut self, outcome: TableOutcome) {
        if outcome.result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Total rows written across all successful tables.
    pub fn total_rows(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| match o.result {
                ExportResult::Success { rows, .. } => Some(rows),
                ExportResult::Failure { .. } => None,
            })
            .sum()
    }

    /// Iterates the failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &TableOutcome> {
        self.outcomes.iter().filter(|o| !o.result.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_file_name() {
        let table = TableRef::new("Sales", "Customer");
        assert_eq!(table.file_name(), "Sales_Customer.parquet");
        assert_eq!(
            table.output_path(Path::new("/data/out")),
            PathBuf::from("/data/out/Sales_Customer.parquet")
        );
    }

    #[test]
    fn test_file_name_replaces_path_separators() {
        let table = TableRef::new("dbo", "a/b\\c");
        assert_eq!(table.file_name(), "dbo_a_b_c.parquet");
    }

    #[test]
    fn test_quoted_name_escapes_brackets() {
        assert_eq!(
            TableRef::new("Person", "Address").quoted_name(),
            "[Person].[Address]"
        );
        assert_eq!(
            TableRef::new("odd]schema", "t").quoted_name(),
            "[odd]]schema].[t]"
        );
    }

    #[test]
    fn test_summary_record() {
        let mut summary = RunSummary::new("/out");
        summary.record(TableOutcome {
            table: TableRef::new("Sales", "Customer"),
            result: ExportResult::Success {
                rows: 10,
                path: PathBuf::from("/out/Sales_Customer.parquet"),
            },
        });
        summary.record(TableOutcome {
            table: TableRef::new("Person", "BadTable"),
            result: ExportResult::Failure {
                message: "boom".to_string(),
            },
        });

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_rows(), 10);
        assert_eq!(summary.failures().count(), 1);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = TableOutcome {
            table: TableRef::new("Person", "BadTable"),
            result: ExportResult::Failure {
                message: "boom".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["table"]["schema"], "Person");
        assert_eq!(json["message"], "boom");
    }

    proptest! {
        #[test]
        fn prop_file_name_is_schema_underscore_table(
            schema in "[A-Za-z][A-Za-z0-9]{0,15}",
            name in "[A-Za-z][A-Za-z0-9_]{0,15}",
        ) {
            let table = TableRef::new(schema.clone(), name.clone());
            prop_assert_eq!(table.file_name(), format!("{schema}_{name}.parquet"));
        }

        #[test]
        fn prop_file_name_never_contains_separators(schema in ".*", name in ".*") {
            let file_name = TableRef::new(schema, name).file_name();
            prop_assert!(!file_name.contains('/'));
            prop_assert!(!file_name.contains('\\'));
        }
    }
}
