//! Bulk strategy - one store-native load per file
//!
//! With staging enabled the file lands in an all-text table first and is
//! then copied into the typed table with `INSERT ... SELECT`, leaving type
//! conversion to the store engine.

use crate::config::{LoadOptions, Strategy};
use crate::error::Result;
use crate::ingestion::{IngestionReport, IngestionRun};
use crate::schema::TableDefinition;
use crate::store::{TableHandle, TableStore};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A COPY-style load of one delimited file into one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadCommand {
    pub table: String,
    pub path: PathBuf,
    pub delimiter: u8,
    /// First record is a header and is not loaded
    pub header: bool,
}

impl LoadCommand {
    pub fn new(table: impl Into<String>, path: impl Into<PathBuf>, delimiter: u8, header: bool) -> Self {
        Self {
            table: table.into(),
            path: path.into(),
            delimiter,
            header,
        }
    }

    /// Statement form of the command, as logged before execution.
    pub fn to_sql(&self) -> String {
        let delimiter = match self.delimiter {
            b'\t' => "E'\\t'".to_string(),
            b'\'' => "''''".to_string(),
            other => format!("'{}'", other as char),
        };
        let mut sql = format!(
            "COPY \"{}\" FROM '{}' WITH (FORMAT CSV, DELIMITER {}",
            self.table.replace('"', "\"\""),
            self.path.display().to_string().replace('\'', "''"),
            delimiter
        );
        if self.header {
            sql.push_str(", HEADER");
        }
        sql.push(')');
        sql
    }
}

pub struct BulkIngestor {
    delimiter: u8,
    has_header: bool,
}

impl BulkIngestor {
    pub fn new(options: &LoadOptions) -> Result<Self> {
        Ok(Self {
            delimiter: options.delimiter_byte()?,
            has_header: options.has_header,
        })
    }

    /// Load `path` into `table` in one atomic operation.
    pub fn ingest<S: TableStore + ?Sized>(
        &self,
        store: &mut S,
        table: &TableHandle,
        path: &Path,
    ) -> Result<IngestionReport> {
        let mut run = IngestionRun::new(path.display().to_string());
        let command = LoadCommand::new(table.name(), path, self.delimiter, self.has_header);
        info!("{}", command.to_sql());

        run.rows = store.bulk_load(&command)?;
        info!("Loaded {} rows into {}", run.rows, table.name());
        Ok(run.into_report(table.name(), Strategy::Bulk))
    }

    /// Load `path` into a fresh staging table, copy it into `table` and drop
    /// the staging table. The staging table is dropped on failure too.
    pub fn ingest_staged<S: TableStore + ?Sized>(
        &self,
        store: &mut S,
        table: &TableHandle,
        staging: &TableDefinition,
        path: &Path,
    ) -> Result<IngestionReport> {
        if store.table_exists(&staging.name)? {
            warn!("Dropping leftover staging table {}", staging.name);
            store.drop_table(&staging.name)?;
        }
        store.create_table(staging)?;

        let result = self.load_through_staging(store, table, &staging.name, path);
        let cleanup = store.drop_table(&staging.name);
        let report = result?;
        cleanup?;
        Ok(report)
    }

    fn load_through_staging<S: TableStore + ?Sized>(
        &self,
        store: &mut S,
        table: &TableHandle,
        staging: &str,
        path: &Path,
    ) -> Result<IngestionReport> {
        let staging = store.open_table(staging)?;
        let staged = self.ingest(store, &staging, path)?;

        info!("Copying {} into {}", staging.name(), table.name());
        let copied = store.insert_select(table, &staging)?;
        info!("Copied {} of {} staged rows into {}", copied, staged.rows_ingested, table.name());

        Ok(IngestionReport {
            table: table.name().to_string(),
            rows_ingested: copied,
            ..staged
        })
    }
}
