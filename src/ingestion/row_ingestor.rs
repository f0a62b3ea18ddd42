//! Row-wise strategy - per-record coercion and single-row inserts

use crate::config::{LoadOptions, Strategy, TemporalFormats};
use crate::error::{LoaderError, Result};
use crate::ingestion::coercion::{CellCoercer, CellValue, Coerced};
use crate::ingestion::{IngestionReport, IngestionRun, IngestionWarning};
use crate::schema::TableDefinition;
use crate::store::{TableHandle, TableStore};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

pub struct RowIngestor {
    delimiter: u8,
    has_header: bool,
    skip: u64,
    formats: TemporalFormats,
}

impl RowIngestor {
    pub fn new(options: &LoadOptions) -> Result<Self> {
        Ok(Self {
            delimiter: options.delimiter_byte()?,
            has_header: options.has_header,
            skip: options.skip,
            formats: options.formats.clone(),
        })
    }

    pub fn ingest<S: TableStore + ?Sized>(
        &self,
        store: &mut S,
        table: &TableHandle,
        path: &Path,
    ) -> Result<IngestionReport> {
        let file = File::open(path)?;
        self.ingest_reader(store, table, file, &path.display().to_string())
    }

    /// Stream records from `reader` into `table`.
    ///
    /// The header (if any) is consumed first, then `skip` data records are
    /// discarded. Rows appended before a coercion error stay in the table.
    pub fn ingest_reader<S: TableStore + ?Sized, R: Read>(
        &self,
        store: &mut S,
        table: &TableHandle,
        reader: R,
        source: &str,
    ) -> Result<IngestionReport> {
        let coercer = CellCoercer::new(&self.formats);
        coercer.check_formats(&table.definition)?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(reader);
        let mut records = reader.records();
        let mut run = IngestionRun::new(source);
        info!("Ingesting {} into {} row by row", source, table.name());

        if self.has_header {
            if let Some(header) = records.next() {
                debug!("Header: {:?}", header?);
            }
        }

        for result in records {
            let record = result?;
            run.record_index += 1;
            if run.record_index <= self.skip {
                run.skipped += 1;
                continue;
            }

            let row = build_row(&coercer, &table.definition, &record, &mut run)?;
            store.insert_row(table, &row)?;
            run.rows += 1;
        }

        info!(
            "Ingested {} rows from {} ({} skipped, {} warnings)",
            run.rows,
            source,
            run.skipped,
            run.warnings.len()
        );
        Ok(run.into_report(table.name(), Strategy::RowWise))
    }
}

/// Map a record positionally onto the table's columns. Missing trailing
/// cells are NULL; extra cells are dropped with a warning.
fn build_row(
    coercer: &CellCoercer<'_>,
    definition: &TableDefinition,
    record: &StringRecord,
    run: &mut IngestionRun,
) -> Result<Vec<CellValue>> {
    let row_index = run.record_index;
    let expected = definition.column_count();
    if record.len() > expected {
        run.warn(IngestionWarning::ColumnCountMismatch {
            row: row_index,
            expected,
            found: record.len(),
        });
    }

    let mut row = Vec::with_capacity(expected);
    for (idx, column) in definition.columns.iter().enumerate() {
        let Some(raw) = record.get(idx) else {
            row.push(CellValue::Null);
            continue;
        };
        let value = match coercer.coerce(&column.sql_type, raw) {
            Ok(Coerced::Value(value)) => value,
            Ok(Coerced::Unsupported) => {
                run.warn(IngestionWarning::UnknownColumnType {
                    row: row_index,
                    column: column.name.clone(),
                    type_code: column.sql_type.sql_name(),
                });
                CellValue::Null
            }
            Err(reason) => {
                return Err(LoaderError::Coercion {
                    file: run.source.clone(),
                    row: row_index,
                    column: column.name.clone(),
                    value: raw.to_string(),
                    reason,
                })
            }
        };
        row.push(value);
    }
    Ok(row)
}
