//! SQLite-backed extract store
//!
//! Besides the data tables, every extract file carries a small catalog
//! (`_extract_tables`, `_extract_columns`) holding the resolved definition of
//! each table, so reopening a file recovers exact types and collations.

use crate::config::TemporalFormats;
use crate::error::{LoaderError, Result};
use crate::ingestion::{CellCoercer, CellValue, Coerced, LoadCommand};
use crate::schema::{Collation, SqlType, TableDefinition};
use crate::store::{TableHandle, TableStore};
use csv::ReaderBuilder;
use itertools::Itertools;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// What to do with an existing extract file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// Open the file if it exists, create it otherwise
    Create,
    /// Delete an existing file first
    CreateAndReplace,
}

pub struct SqliteStore {
    conn: Option<Connection>,
    /// A row-insert transaction is open
    in_batch: bool,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, mode: CreateMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if mode == CreateMode::CreateAndReplace && path.exists() {
            info!("Overwriting existing {}", path.display());
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| LoaderError::Store(format!("Failed to open {}: {}", path.display(), e)))?;
        let store = Self {
            conn: Some(conn),
            in_batch: false,
        };
        store.init_catalog()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Some(Connection::open_in_memory()?),
            in_batch: false,
        };
        store.init_catalog()?;
        Ok(store)
    }

    fn init_catalog(&self) -> Result<()> {
        self.conn()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS _extract_tables (
                name TEXT PRIMARY KEY,
                collation TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS _extract_columns (
                table_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                sql_type TEXT NOT NULL,
                collation TEXT,
                PRIMARY KEY (table_name, position)
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| LoaderError::Store("store is closed".to_string()))
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| LoaderError::Store("store is closed".to_string()))
    }

    fn begin_batch(&mut self) -> Result<()> {
        if !self.in_batch {
            self.conn()?.execute_batch("BEGIN")?;
            self.in_batch = true;
        }
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<()> {
        if self.in_batch {
            self.conn()?.execute_batch("COMMIT")?;
            self.in_batch = false;
        }
        Ok(())
    }

    /// All rows of a table in insertion order.
    pub fn read_rows(&self, table: &str) -> Result<Vec<Vec<Value>>> {
        let handle = self.open_table(table)?;
        let width = handle.definition.column_count();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            handle.definition.columns.iter().map(|c| quote_ident(&c.name)).join(", "),
            quote_ident(table)
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| (0..width).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<Value>>>())?
            .collect::<std::result::Result<Vec<Vec<Value>>, _>>()?;
        Ok(rows)
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = self.conn()?.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Reject the first staged value the typed copy would mangle. SQLite
    /// `CAST` never fails, so every cell is checked against the target type
    /// before anything is copied.
    fn check_staged_values(&self, target: &TableDefinition, source: &TableHandle) -> Result<()> {
        let formats = TemporalFormats::iso();
        let coercer = CellCoercer::new(&formats);
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            source.definition.columns.iter().map(|c| quote_ident(&c.name)).join(", "),
            quote_ident(source.name())
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, column) in target.columns.iter().enumerate() {
                let Some(cell) = row.get::<_, Option<String>>(i)? else {
                    continue;
                };
                if cell.trim().is_empty() {
                    continue;
                }
                if let Err(reason) = coercer.coerce(&column.sql_type, &cell) {
                    return Err(LoaderError::Store(format!(
                        "staged value {:?} in column '{}' is not a valid {}: {}",
                        cell, column.name, column.sql_type, reason
                    )));
                }
            }
        }
        Ok(())
    }

    fn load_catalog_definition(&self, name: &str) -> Result<Option<TableDefinition>> {
        let conn = self.conn()?;
        let collation: Option<String> = conn
            .query_row(
                "SELECT collation FROM _extract_tables WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(collation) = collation else {
            return Ok(None);
        };

        let mut table = TableDefinition::new(name, Collation::from_code(&collation).unwrap_or_default());
        let mut stmt = conn.prepare(
            "SELECT name, sql_type, collation FROM _extract_columns WHERE table_name = ?1 ORDER BY position",
        )?;
        let columns = stmt
            .query_map([name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (column, sql_type, collation) in columns {
            let sql_type = SqlType::parse_sql_name(&sql_type).ok_or_else(|| {
                LoaderError::Store(format!(
                    "catalog entry for {}.{} has unknown type {}",
                    name, column, sql_type
                ))
            })?;
            table.add_column(column, sql_type, collation.as_deref().and_then(Collation::from_code));
        }
        Ok(Some(table))
    }

    /// Definition of a table created outside this tool, from its declared
    /// column types. Unknown declared types are read as text.
    fn load_declared_definition(&self, name: &str) -> Result<TableDefinition> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([name], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut table = TableDefinition::new(name, Collation::Binary);
        for (column, declared) in columns {
            let sql_type = SqlType::parse_sql_name(&declared).unwrap_or(SqlType::Text);
            table.add_column(column, sql_type, None);
        }
        Ok(table)
    }
}

impl TableStore for SqliteStore {
    fn table_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_table(&mut self, definition: &TableDefinition) -> Result<()> {
        self.commit_batch()?;
        let ddl = create_table_sql(definition);
        debug!("DDL: {}", ddl);

        let tx = self.conn_mut()?.transaction()?;
        tx.execute(&ddl, [])
            .map_err(|e| LoaderError::Store(format!("Failed to create table {}: {}", definition.name, e)))?;
        tx.execute(
            "INSERT OR REPLACE INTO _extract_tables (name, collation) VALUES (?1, ?2)",
            params![definition.name, definition.default_collation.code()],
        )?;
        for (position, column) in definition.columns.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO _extract_columns (table_name, position, name, sql_type, collation) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    definition.name,
                    position as i64,
                    column.name,
                    column.sql_type.sql_name(),
                    column.collation.map(Collation::code),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn open_table(&self, name: &str) -> Result<TableHandle> {
        if !self.table_exists(name)? {
            return Err(LoaderError::Store(format!("table '{}' does not exist", name)));
        }
        let definition = match self.load_catalog_definition(name)? {
            Some(definition) => definition,
            None => self.load_declared_definition(name)?,
        };
        Ok(TableHandle { definition })
    }

    fn supports_bulk_load(&self) -> bool {
        true
    }

    fn bulk_load(&mut self, command: &LoadCommand) -> Result<u64> {
        self.commit_batch()?;
        let handle = self.open_table(&command.table)?;
        let width = handle.definition.column_count();
        let insert = insert_sql(&handle.definition);

        let file = File::open(&command.path).map_err(|e| {
            LoaderError::Store(format!("COPY {}: cannot open {}: {}", command.table, command.path.display(), e))
        })?;
        let mut reader = ReaderBuilder::new()
            .delimiter(command.delimiter)
            .has_headers(command.header)
            .flexible(true)
            .from_reader(file);

        // the store only understands ISO temporal text
        let formats = TemporalFormats::iso();
        let coercer = CellCoercer::new(&formats);

        let tx = self.conn_mut()?.transaction()?;
        let mut loaded = 0u64;
        {
            let mut stmt = tx.prepare(&insert)?;
            for result in reader.records() {
                let record = result.map_err(|e| LoaderError::Store(format!("COPY {}: {}", command.table, e)))?;
                if record.len() != width {
                    return Err(LoaderError::Store(format!(
                        "COPY {}: record {} has {} fields, expected {}",
                        command.table,
                        loaded + 1,
                        record.len(),
                        width
                    )));
                }
                let mut values = Vec::with_capacity(width);
                for (column, cell) in handle.definition.columns.iter().zip(record.iter()) {
                    if cell.is_empty() {
                        values.push(Value::Null);
                        continue;
                    }
                    match coercer.coerce(&column.sql_type, cell) {
                        Ok(Coerced::Value(value)) => values.push(to_sqlite_value(&value)),
                        Ok(Coerced::Unsupported) => values.push(Value::Text(cell.to_string())),
                        Err(reason) => {
                            return Err(LoaderError::Store(format!(
                                "COPY {}: record {} column '{}': cannot convert {:?}: {}",
                                command.table,
                                loaded + 1,
                                column.name,
                                cell,
                                reason
                            )))
                        }
                    }
                }
                stmt.execute(params_from_iter(values))?;
                loaded += 1;
            }
        }
        tx.commit()?;
        Ok(loaded)
    }

    fn insert_row(&mut self, table: &TableHandle, row: &[CellValue]) -> Result<()> {
        if row.len() != table.definition.column_count() {
            return Err(LoaderError::Store(format!(
                "row for {} has {} values, expected {}",
                table.name(),
                row.len(),
                table.definition.column_count()
            )));
        }
        self.begin_batch()?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&insert_sql(&table.definition))?;
        stmt.execute(params_from_iter(row.iter().map(to_sqlite_value)))?;
        Ok(())
    }

    fn insert_select(&mut self, target: &TableHandle, source: &TableHandle) -> Result<u64> {
        self.commit_batch()?;
        let target_def = &target.definition;
        let source_def = &source.definition;
        if target_def.column_count() != source_def.column_count() {
            return Err(LoaderError::Store(format!(
                "cannot copy {} ({} columns) into {} ({} columns)",
                source.name(),
                source_def.column_count(),
                target.name(),
                target_def.column_count()
            )));
        }

        self.check_staged_values(target_def, source)?;

        let sql = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} ORDER BY rowid",
            quote_ident(target.name()),
            target_def.columns.iter().map(|c| quote_ident(&c.name)).join(", "),
            target_def
                .columns
                .iter()
                .zip(&source_def.columns)
                .map(|(t, s)| cast_expression(&t.sql_type, &quote_ident(&s.name)))
                .join(", "),
            quote_ident(source.name())
        );
        debug!("SQL: {}", sql);
        let copied = self.conn()?.execute(&sql, [])?;
        Ok(copied as u64)
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        self.commit_batch()?;
        let tx = self.conn_mut()?.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
        tx.execute("DELETE FROM _extract_columns WHERE table_name = ?1", [name])?;
        tx.execute("DELETE FROM _extract_tables WHERE name = ?1", [name])?;
        tx.commit()?;
        Ok(())
    }

    fn flush_and_close(&mut self) -> Result<()> {
        if self.conn.is_none() {
            return Ok(());
        }
        self.commit_batch()?;
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| LoaderError::Store(format!("Failed to close extract: {}", e)))?;
        }
        debug!("Store closed");
        Ok(())
    }
}

/// SQLite representation of a coerced cell.
pub fn to_sqlite_value(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Integer(*b as i64),
        CellValue::Int(i) => Value::Integer(*i),
        CellValue::Double(d) => Value::Real(*d),
        CellValue::Numeric(n) => Value::Text(n.clone()),
        CellValue::Text(s) => Value::Text(s.clone()),
        CellValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        CellValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
        CellValue::Timestamp(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        CellValue::TimestampTz(ts) => Value::Text(ts.to_rfc3339()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(definition: &TableDefinition) -> String {
    let columns = definition
        .columns
        .iter()
        .map(|column| {
            let mut sql = format!("{} {}", quote_ident(&column.name), column.sql_type.sql_name());
            if column.sql_type.is_character() {
                sql.push_str(" COLLATE ");
                sql.push_str(definition.effective_collation(column).sqlite_collation());
            }
            sql
        })
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(&definition.name), columns)
}

fn insert_sql(definition: &TableDefinition) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&definition.name),
        definition.columns.iter().map(|c| quote_ident(&c.name)).join(", "),
        (1..=definition.column_count()).map(|i| format!("?{}", i)).join(", ")
    )
}

const TRUE_WORDS: &str = "('true', 't', 'yes', 'y', '1')";
const FALSE_WORDS: &str = "('false', 'f', 'no', 'n', '0')";

/// Expression converting a staged text column into the target type.
fn cast_expression(target: &SqlType, column: &str) -> String {
    let cell = format!("NULLIF(TRIM({}), '')", column);
    match target {
        _ if target.is_character() => column.to_string(),
        SqlType::Bool => format!(
            "CASE WHEN LOWER({cell}) IN {TRUE_WORDS} THEN 1 WHEN LOWER({cell}) IN {FALSE_WORDS} THEN 0 END"
        ),
        _ => format!("CAST({} AS {})", cell, target.cast_target()),
    }
}
