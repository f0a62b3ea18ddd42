//! extract-loader: loads CSV files into a single-file extract database,
//! driven by a JSON schema document.

pub mod config;
pub mod error;
pub mod fetch;
pub mod ingestion;
pub mod schema;
pub mod service;
pub mod store;

pub use config::{LoadOptions, S3Settings, Strategy, TemporalFormats};
pub use error::{LoaderError, Result};
pub use fetch::{FetchError, FetchRequest, Fetcher, LocalFetcher, S3Fetcher, SourceLocation};
pub use ingestion::{ExtractPipeline, IngestionReport, IngestionWarning, RunSummary};
pub use schema::{SchemaCompiler, SchemaDocument, TableDefinition};
pub use store::{CreateMode, SqliteStore, StoreSession, TableStore};
