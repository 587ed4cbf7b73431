//! # redb-backed Output Storage
//!
//! An `OutputSink` that persists record rows and the cutflow summary into a
//! redb embedded database. Each batch is written in one ACID transaction,
//! so an interrupted run keeps every batch that committed.
//!
//! Layout:
//! - `rows`: row number -> postcard row
//! - `blobs`: `"columns"` -> postcard column schema, `"summary"` -> summary
//!   bytes in the persistence format
//! - `metadata`: `"next_row"` -> next row number

use crate::formats::{summary_from_bytes, summary_to_bytes};
use crate::sink::OutputSink;
use crate::{Column, CutflowError, CutflowSummary, RecordTable, Row};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for rows: row number -> serialized row bytes
const ROWS: TableDefinition<u64, &[u8]> = TableDefinition::new("rows");

/// Table for schema and summary blobs.
const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const COLUMNS_KEY: &str = "columns";
const SUMMARY_KEY: &str = "summary";
const NEXT_ROW_KEY: &str = "next_row";

fn storage_error(e: impl std::fmt::Display) -> CutflowError {
    CutflowError::StorageError(e.to_string())
}

/// A disk-backed output sink using redb.
pub struct RedbSink {
    db: Database,
    next_row: u64,
}

impl std::fmt::Debug for RedbSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbSink")
            .field("next_row", &self.next_row)
            .finish_non_exhaustive()
    }
}

impl RedbSink {
    /// Open or create an output database at the given path.
    ///
    /// Reopening an existing database appends after its last row.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CutflowError> {
        let db = Database::create(path.as_ref()).map_err(storage_error)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_error)?;
            let _ = write_txn.open_table(ROWS).map_err(storage_error)?;
            let _ = write_txn.open_table(BLOBS).map_err(storage_error)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_error)?;
            write_txn.commit().map_err(storage_error)?;
        }

        let next_row = {
            let read_txn = db.begin_read().map_err(storage_error)?;
            let table = read_txn.open_table(METADATA).map_err(storage_error)?;
            table
                .get(NEXT_ROW_KEY)
                .map_err(storage_error)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, next_row })
    }

    /// Stored column schema, if any batch was written.
    pub fn read_columns(&self) -> Result<Option<Vec<Column>>, CutflowError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(BLOBS).map_err(storage_error)?;
        table
            .get(COLUMNS_KEY)
            .map_err(storage_error)?
            .map(|data| {
                postcard::from_bytes::<Vec<Column>>(data.value())
                    .map_err(|e| CutflowError::DeserializationError(e.to_string()))
            })
            .transpose()
    }

    /// All stored rows in insertion order.
    pub fn read_rows(&self) -> Result<Vec<Row>, CutflowError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(ROWS).map_err(storage_error)?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(storage_error)? {
            let (_, value) = entry.map_err(storage_error)?;
            let row = postcard::from_bytes::<Row>(value.value())
                .map_err(|e| CutflowError::DeserializationError(e.to_string()))?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Schema and rows as one table.
    pub fn read_table(&self) -> Result<RecordTable, CutflowError> {
        Ok(RecordTable {
            columns: self.read_columns()?.unwrap_or_default(),
            rows: self.read_rows()?,
            finalized: true,
        })
    }

    /// Stored summary, if one was written.
    pub fn read_summary(&self) -> Result<Option<CutflowSummary>, CutflowError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(BLOBS).map_err(storage_error)?;
        table
            .get(SUMMARY_KEY)
            .map_err(storage_error)?
            .map(|data| summary_from_bytes(data.value()))
            .transpose()
    }

    /// Number of stored rows.
    pub fn row_count(&self) -> Result<u64, CutflowError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(ROWS).map_err(storage_error)?;
        table.len().map_err(storage_error)
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), CutflowError> {
        self.db.compact().map_err(storage_error)?;
        Ok(())
    }
}

impl OutputSink for RedbSink {
    fn write_table(&mut self, table: &RecordTable) -> Result<(), CutflowError> {
        let mut next_row = self.next_row;
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut blobs = write_txn.open_table(BLOBS).map_err(storage_error)?;
            let stored: Option<Vec<Column>> = blobs
                .get(COLUMNS_KEY)
                .map_err(storage_error)?
                .map(|data| {
                    postcard::from_bytes(data.value())
                        .map_err(|e| CutflowError::DeserializationError(e.to_string()))
                })
                .transpose()?;
            match stored {
                Some(columns) if columns != table.columns => {
                    return Err(CutflowError::StorageError(
                        "Record batch columns differ from the stored schema".to_string(),
                    ));
                }
                Some(_) => {}
                None => {
                    let bytes = postcard::to_allocvec(&table.columns)
                        .map_err(|e| CutflowError::SerializationError(e.to_string()))?;
                    blobs
                        .insert(COLUMNS_KEY, bytes.as_slice())
                        .map_err(storage_error)?;
                }
            }

            let mut rows = write_txn.open_table(ROWS).map_err(storage_error)?;
            for row in &table.rows {
                let bytes = postcard::to_allocvec(row)
                    .map_err(|e| CutflowError::SerializationError(e.to_string()))?;
                rows.insert(next_row, bytes.as_slice())
                    .map_err(storage_error)?;
                next_row = next_row.saturating_add(1);
            }

            let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
            meta.insert(NEXT_ROW_KEY, next_row).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;

        self.next_row = next_row;
        tracing::debug!(rows = table.len(), next_row, "batch committed to redb");
        Ok(())
    }

    fn write_summary(&mut self, summary: &CutflowSummary) -> Result<(), CutflowError> {
        let bytes = summary_to_bytes(summary)?;
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut blobs = write_txn.open_table(BLOBS).map_err(storage_error)?;
            blobs
                .insert(SUMMARY_KEY, bytes.as_slice())
                .map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        Ok(())
    }
}
