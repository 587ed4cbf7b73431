//! # Output Sinks
//!
//! Destinations for finalized record tables and cutflow summaries. The
//! event loop hands rows over in batches and the summary once, then calls
//! `finish`.
//!
//! - `MemorySink` keeps everything in memory (tests, embedding).
//! - `FileSink` writes a directory of `table.bin` (a row stream, appended
//!   per batch), `cutflow.cflow` and `cutflow.bin`.
//! - `RedbSink` (in `storage`) writes into a redb database.

use crate::formats::{row_frame, row_stream_start, summary_to_bytes};
use crate::{Column, CutflowError, CutflowSummary, RecordTable};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the binary record table inside a `FileSink` directory.
pub const TABLE_FILE: &str = "table.bin";
/// File name of the `.cflow` text summary.
pub const CFLOW_FILE: &str = "cutflow.cflow";
/// File name of the binary summary.
pub const SUMMARY_FILE: &str = "cutflow.bin";

/// Where an event loop sends its results.
pub trait OutputSink {
    /// Accept one batch of rows. Batches share the first batch's columns.
    fn write_table(&mut self, table: &RecordTable) -> Result<(), CutflowError>;

    /// Accept the final cutflow summary.
    fn write_summary(&mut self, summary: &CutflowSummary) -> Result<(), CutflowError>;

    /// Flush anything buffered. Called once after the last write.
    fn finish(&mut self) -> Result<(), CutflowError> {
        Ok(())
    }
}

/// Append `batch` to `target`, adopting its schema on the first call.
fn append_batch(target: &mut Option<RecordTable>, batch: &RecordTable) -> Result<(), CutflowError> {
    match target {
        None => {
            *target = Some(batch.clone());
        }
        Some(existing) => {
            if existing.columns != batch.columns {
                return Err(CutflowError::StorageError(
                    "Record batch columns differ from the first batch".to_string(),
                ));
            }
            existing.rows.extend(batch.rows.iter().cloned());
            existing.finalized = batch.finalized;
        }
    }
    Ok(())
}

// =============================================================================
// MEMORY SINK
// =============================================================================

/// Collects all output in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    table: Option<RecordTable>,
    summary: Option<CutflowSummary>,
    batches: usize,
    finished: bool,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows received so far, concatenated.
    #[must_use]
    pub fn table(&self) -> Option<&RecordTable> {
        self.table.as_ref()
    }

    #[must_use]
    pub fn summary(&self) -> Option<&CutflowSummary> {
        self.summary.as_ref()
    }

    /// Number of `write_table` calls received.
    #[must_use]
    pub fn batches(&self) -> usize {
        self.batches
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl OutputSink for MemorySink {
    fn write_table(&mut self, table: &RecordTable) -> Result<(), CutflowError> {
        append_batch(&mut self.table, table)?;
        self.batches = self.batches.saturating_add(1);
        Ok(())
    }

    fn write_summary(&mut self, summary: &CutflowSummary) -> Result<(), CutflowError> {
        self.summary = Some(summary.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CutflowError> {
        self.finished = true;
        Ok(())
    }
}

// =============================================================================
// FILE SINK
// =============================================================================

/// The open `table.bin` row stream of a `FileSink`.
#[derive(Debug)]
struct TableFile {
    writer: BufWriter<File>,
    columns: Vec<Column>,
    rows: u64,
}

impl TableFile {
    fn create(path: &Path, columns: &[Column]) -> Result<Self, CutflowError> {
        let file = File::create(path)
            .map_err(|e| CutflowError::IoError(format!("{}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&row_stream_start(columns)?)
            .map_err(|e| CutflowError::IoError(e.to_string()))?;
        Ok(Self {
            writer,
            columns: columns.to_vec(),
            rows: 0,
        })
    }

    /// Append a batch and push it to disk.
    fn append(&mut self, batch: &RecordTable) -> Result<(), CutflowError> {
        if self.columns != batch.columns {
            return Err(CutflowError::StorageError(
                "Record batch columns differ from the first batch".to_string(),
            ));
        }
        for row in &batch.rows {
            self.writer
                .write_all(&row_frame(row)?)
                .map_err(|e| CutflowError::IoError(e.to_string()))?;
        }
        self.writer
            .flush()
            .map_err(|e| CutflowError::IoError(e.to_string()))?;
        self.rows = self.rows.saturating_add(batch.rows.len() as u64);
        Ok(())
    }
}

/// Writes results into a directory.
///
/// `table.bin` is a row stream opened by the first batch; every batch is
/// flushed to it as it arrives, so memory use does not grow with the run.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    table: Option<TableFile>,
}

impl FileSink {
    /// Create the output directory if needed.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, CutflowError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| CutflowError::IoError(e.to_string()))?;
        Ok(Self { dir, table: None })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rows written to `table.bin` so far.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.table.as_ref().map_or(0, |table| table.rows)
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<(), CutflowError> {
        let path = self.dir.join(name);
        std::fs::write(&path, data)
            .map_err(|e| CutflowError::IoError(format!("{}: {}", path.display(), e)))
    }
}

impl OutputSink for FileSink {
    fn write_table(&mut self, table: &RecordTable) -> Result<(), CutflowError> {
        let file = match self.table.take() {
            Some(file) => file,
            None => TableFile::create(&self.dir.join(TABLE_FILE), &table.columns)?,
        };
        self.table.insert(file).append(table)
    }

    fn write_summary(&mut self, summary: &CutflowSummary) -> Result<(), CutflowError> {
        self.write_file(CFLOW_FILE, summary.to_cflow()?.as_bytes())?;
        self.write_file(SUMMARY_FILE, &summary_to_bytes(summary)?)
    }

    fn finish(&mut self) -> Result<(), CutflowError> {
        let mut table = match self.table.take() {
            Some(table) => table,
            None => TableFile::create(&self.dir.join(TABLE_FILE), &[])?,
        };
        table
            .writer
            .flush()
            .map_err(|e| CutflowError::IoError(e.to_string()))?;
        tracing::debug!(dir = %self.dir.display(), rows = table.rows, "file sink written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{summary_from_bytes, table_from_bytes};
    use crate::{Value, ValueKind};

    fn batch(rows: &[f64]) -> RecordTable {
        RecordTable {
            columns: vec![Column {
                name: "ht".to_string(),
                kind: ValueKind::Float,
                default: Value::Float(0.0),
            }],
            rows: rows.iter().map(|v| vec![Value::Float(*v)]).collect(),
            finalized: false,
        }
    }

    #[test]
    fn memory_sink_concatenates_batches() {
        let mut sink = MemorySink::new();
        sink.write_table(&batch(&[1.0, 2.0])).expect("first");
        sink.write_table(&batch(&[3.0])).expect("second");
        sink.finish().expect("finish");

        let table = sink.table().expect("table");
        assert_eq!(table.len(), 3);
        assert_eq!(sink.batches(), 2);
        assert!(sink.is_finished());
    }

    #[test]
    fn mismatched_batch_schema_rejected() {
        let mut sink = MemorySink::new();
        sink.write_table(&batch(&[1.0])).expect("first");

        let mut other = batch(&[2.0]);
        other.columns[0].name = "met".to_string();
        assert!(matches!(
            sink.write_table(&other),
            Err(CutflowError::StorageError(_))
        ));
    }

    #[test]
    fn file_sink_writes_three_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("run");
        let mut sink = FileSink::create(&out).expect("create");

        let summary = CutflowSummary::from_cflow("Bookkeeping,4,4,0,0,null,null,null\n")
            .expect("summary");
        sink.write_table(&batch(&[1.5])).expect("table");
        sink.write_summary(&summary).expect("summary");
        sink.finish().expect("finish");

        let table = table_from_bytes(&std::fs::read(out.join(TABLE_FILE)).expect("read table"))
            .expect("decode table");
        assert_eq!(table.rows, vec![vec![Value::Float(1.5)]]);

        let text = std::fs::read_to_string(out.join(CFLOW_FILE)).expect("read cflow");
        assert_eq!(CutflowSummary::from_cflow(&text).expect("parse"), summary);

        let restored = summary_from_bytes(&std::fs::read(out.join(SUMMARY_FILE)).expect("read"))
            .expect("decode summary");
        assert_eq!(restored, summary);
    }

    #[test]
    fn file_sink_rows_on_disk_before_finish() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = FileSink::create(dir.path()).expect("create");
        sink.write_table(&batch(&[1.0, 2.0])).expect("first");
        sink.write_table(&batch(&[3.0])).expect("second");

        let on_disk = table_from_bytes(&std::fs::read(dir.path().join(TABLE_FILE)).expect("read"))
            .expect("decode");
        assert_eq!(on_disk.len(), 3);
        assert_eq!(sink.rows_written(), 3);

        let mut other = batch(&[4.0]);
        other.columns[0].kind = ValueKind::Int;
        assert!(matches!(
            sink.write_table(&other),
            Err(CutflowError::StorageError(_))
        ));
        sink.finish().expect("finish");
    }

    #[test]
    fn file_sink_finish_without_rows_writes_empty_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = FileSink::create(dir.path()).expect("create");
        sink.finish().expect("finish");

        let table = table_from_bytes(&std::fs::read(dir.path().join(TABLE_FILE)).expect("read"))
            .expect("decode");
        assert!(table.columns.is_empty());
        assert!(table.is_empty());
    }
}
