//! Store Module - Append-only table store behind the extract file
//!
//! The pipeline only talks to [`TableStore`]; [`SqliteStore`] is the
//! implementation writing single-file extracts. [`StoreSession`] owns the
//! store for one run and guarantees it is flushed and closed exactly once.

pub mod sqlite;

pub use sqlite::{CreateMode, SqliteStore};

use crate::error::Result;
use crate::ingestion::{CellValue, LoadCommand};
use crate::schema::TableDefinition;
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// An opened table. The definition is the one persisted in the store, which
/// may differ from a freshly compiled schema when the table already existed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableHandle {
    pub definition: TableDefinition,
}

impl TableHandle {
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

pub trait TableStore {
    fn table_exists(&self, name: &str) -> Result<bool>;

    fn create_table(&mut self, definition: &TableDefinition) -> Result<()>;

    fn open_table(&self, name: &str) -> Result<TableHandle>;

    /// Whether [`TableStore::bulk_load`] is native to this store.
    fn supports_bulk_load(&self) -> bool {
        false
    }

    /// Load a whole delimited file in one atomic operation. Returns the
    /// number of rows loaded.
    fn bulk_load(&mut self, command: &LoadCommand) -> Result<u64>;

    /// Append one row. `row` holds one value per column, in column order.
    fn insert_row(&mut self, table: &TableHandle, row: &[CellValue]) -> Result<()>;

    /// Typed copy of every row of `source` into `target`, matching columns
    /// by position. Returns the number of rows copied.
    fn insert_select(&mut self, target: &TableHandle, source: &TableHandle) -> Result<u64>;

    fn drop_table(&mut self, name: &str) -> Result<()>;

    fn flush_and_close(&mut self) -> Result<()>;
}

/// Scoped ownership of a store for one run.
///
/// `finish` closes the store and reports close errors; if the session is
/// dropped on an error path instead, the store is still flushed and closed
/// and a close failure is logged.
pub struct StoreSession<S: TableStore> {
    store: S,
    closed: bool,
}

impl<S: TableStore> StoreSession<S> {
    pub fn new(store: S) -> Self {
        debug!("Store session opened");
        Self { store, closed: false }
    }

    pub fn finish(mut self) -> Result<()> {
        self.closed = true;
        self.store.flush_and_close()
    }
}

impl<S: TableStore> Deref for StoreSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.store
    }
}

impl<S: TableStore> DerefMut for StoreSession<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

impl<S: TableStore> Drop for StoreSession<S> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.store.flush_and_close() {
                warn!("Failed to close store after an aborted run: {}", e);
            }
        }
    }
}
