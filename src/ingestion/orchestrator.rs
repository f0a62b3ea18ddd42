//! Extract Pipeline - Main ingestion coordinator
//!
//! compile schema -> fetch sources -> open store -> create-or-open table ->
//! ingest each file in declaration order -> flush/close

use crate::config::{LoadOptions, Strategy};
use crate::error::Result;
use crate::fetch::{FetchRequest, Fetcher, SourceLocation};
use crate::ingestion::{BulkIngestor, IngestionReport, RowIngestor};
use crate::schema::{SchemaCompiler, SchemaDocument, TableDefinition};
use crate::store::{StoreSession, TableHandle, TableStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Outcome of a whole run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub table: String,
    /// The table did not exist and was created by this run
    pub created: bool,
    pub reports: Vec<IngestionReport>,
}

impl RunSummary {
    pub fn rows_ingested(&self) -> u64 {
        self.reports.iter().map(|r| r.rows_ingested).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.reports.iter().map(IngestionReport::warning_count).sum()
    }
}

pub struct ExtractPipeline {
    options: LoadOptions,
    compiler: SchemaCompiler,
}

impl ExtractPipeline {
    pub fn new(options: LoadOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            compiler: SchemaCompiler::new(),
        })
    }

    pub fn compile(&self, doc: &SchemaDocument) -> Result<TableDefinition> {
        self.compiler.compile(doc)
    }

    /// Create the table unless the store already has one of that name, in
    /// which case the stored definition wins. Returns the handle and whether
    /// the table was created.
    pub fn prepare_table<S: TableStore + ?Sized>(
        &self,
        store: &mut S,
        definition: &TableDefinition,
    ) -> Result<(TableHandle, bool)> {
        if store.table_exists(&definition.name)? {
            let handle = store.open_table(&definition.name)?;
            info!("Table {} already exists, appending to it", definition.name);
            if handle.definition.columns != definition.columns {
                warn!(
                    "Stored definition of {} differs from the schema document; using the stored one",
                    definition.name
                );
            }
            return Ok((handle, false));
        }

        info!("Creating table {}", definition.name);
        store.create_table(definition)?;
        Ok((store.open_table(&definition.name)?, true))
    }

    /// Ingest one local file with the configured strategy. A store without
    /// native bulk loading gets row-wise ingestion instead.
    pub fn ingest_file<S: TableStore + ?Sized>(
        &self,
        store: &mut S,
        table: &TableHandle,
        path: &Path,
    ) -> Result<IngestionReport> {
        let strategy = match self.options.strategy {
            Strategy::Bulk if !store.supports_bulk_load() => {
                warn!("Store has no bulk load, ingesting {} row by row", path.display());
                Strategy::RowWise
            }
            strategy => strategy,
        };

        match strategy {
            Strategy::Bulk if self.options.staging => {
                let staging = self.compiler.staging_definition(&table.definition);
                BulkIngestor::new(&self.options)?.ingest_staged(store, table, &staging, path)
            }
            Strategy::Bulk => BulkIngestor::new(&self.options)?.ingest(store, table, path),
            Strategy::RowWise => RowIngestor::new(&self.options)?.ingest(store, table, path),
        }
    }

    /// Run the whole pipeline for `files`.
    ///
    /// The schema is compiled and every source fetched before the store is
    /// opened, so validation and fetch failures leave the artifact untouched.
    /// Once opened, the store is closed exactly once on every path.
    pub async fn run<S, F>(
        &self,
        doc: &SchemaDocument,
        files: &[String],
        location: &SourceLocation,
        fetcher: &dyn Fetcher,
        open_store: F,
    ) -> Result<RunSummary>
    where
        S: TableStore,
        F: FnOnce() -> Result<S>,
    {
        let definition = self.compile(doc)?;

        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            let request = FetchRequest::new(location, file.as_str());
            info!("Fetching {} ({})", request.location(), fetcher.kind());
            sources.push(fetcher.fetch(&request).await?);
        }

        let mut session = StoreSession::new(open_store()?);
        let (table, created) = self.prepare_table(&mut *session, &definition)?;

        let mut reports = Vec::with_capacity(sources.len());
        for source in &sources {
            let report = self.ingest_file(&mut *session, &table, source)?;
            reports.push(report);
        }
        session.finish()?;

        let summary = RunSummary {
            table: table.name().to_string(),
            created,
            reports,
        };
        info!(
            "Run finished: {} rows into {} from {} files ({} warnings)",
            summary.rows_ingested(),
            summary.table,
            summary.reports.len(),
            summary.warning_count()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoaderError;
    use crate::schema::{Collation, SqlType};
    use crate::store::SqliteStore;

    #[test]
    fn test_new_validates_options() {
        let options = LoadOptions {
            skip: 1,
            ..Default::default()
        };
        assert!(matches!(ExtractPipeline::new(options), Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_existing_definition_is_authoritative() {
        let pipeline = ExtractPipeline::new(LoadOptions::default()).unwrap();
        let mut store = SqliteStore::open_in_memory().unwrap();

        let mut original = TableDefinition::new("t", Collation::Binary);
        original.add_column("a", SqlType::Int, None);
        let (_, created) = pipeline.prepare_table(&mut store, &original).unwrap();
        assert!(created);

        let mut drifted = TableDefinition::new("t", Collation::Binary);
        drifted.add_column("a", SqlType::Text, None);
        drifted.add_column("b", SqlType::Text, None);
        let (handle, created) = pipeline.prepare_table(&mut store, &drifted).unwrap();
        assert!(!created);
        assert_eq!(handle.definition, original);
    }
}
