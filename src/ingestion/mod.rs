//! Ingestion Module - Moves CSV rows into extract tables
//!
//! Two strategies share one entry point:
//! - bulk: a single store-native load per file (`bulk`)
//! - row-wise: lazy record stream with per-cell coercion (`row_ingestor`)
//!
//! `orchestrator` drives a whole run: compile, create-or-open, fetch and
//! ingest each file in order, close.

pub mod bulk;
pub mod coercion;
pub mod orchestrator;
pub mod row_ingestor;

pub use bulk::{BulkIngestor, LoadCommand};
pub use coercion::{CellCoercer, CellValue, Coerced};
pub use orchestrator::{ExtractPipeline, RunSummary};
pub use row_ingestor::RowIngestor;

use crate::config::Strategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Non-fatal conditions met while ingesting a file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IngestionWarning {
    /// The column type has no row-wise conversion; the cell was left NULL
    UnknownColumnType {
        row: u64,
        column: String,
        type_code: String,
    },
    /// The record had more cells than the table has columns
    ColumnCountMismatch { row: u64, expected: usize, found: usize },
}

impl fmt::Display for IngestionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionWarning::UnknownColumnType { row, column, type_code } => write!(
                f,
                "row {}: column '{}' has type {} which cannot be converted, value left empty",
                row, column, type_code
            ),
            IngestionWarning::ColumnCountMismatch { row, expected, found } => write!(
                f,
                "row {}: {} cells for {} columns, extra cells dropped",
                row, found, expected
            ),
        }
    }
}

/// Per-file ingestion state.
#[derive(Debug)]
pub struct IngestionRun {
    pub run_id: String,
    pub source: String,
    /// 1-based index of the last record read, header excluded
    pub record_index: u64,
    pub skipped: u64,
    pub rows: u64,
    pub warnings: Vec<IngestionWarning>,
}

impl IngestionRun {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            source: source.into(),
            record_index: 0,
            skipped: 0,
            rows: 0,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, warning: IngestionWarning) {
        tracing::warn!("{}: {}", self.source, warning);
        self.warnings.push(warning);
    }

    pub fn into_report(self, table: impl Into<String>, strategy: Strategy) -> IngestionReport {
        IngestionReport {
            run_id: self.run_id,
            source: self.source,
            table: table.into(),
            strategy,
            rows_ingested: self.rows,
            rows_skipped: self.skipped,
            warnings: self.warnings,
        }
    }
}

/// Outcome of ingesting one file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_id: String,
    pub source: String,
    pub table: String,
    pub strategy: Strategy,
    pub rows_ingested: u64,
    pub rows_skipped: u64,
    pub warnings: Vec<IngestionWarning>,
}

impl IngestionReport {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}
