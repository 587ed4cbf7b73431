//! Record store: output columns and the table of accepted rows.

use super::SlotTable;
use crate::{CutflowError, SlotType, Value, ValueKind};
use serde::{Deserialize, Serialize};

/// One finalized output row, values in column registration order.
pub type Row = Vec<Value>;

/// Schema entry for one output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ValueKind,
    /// Value written when a row is flushed before any cut filled the column.
    pub default: Value,
}

/// The append-only output table.
///
/// Rows are appended only by `RecordStore::flush_row`. Once finalized the
/// table accepts no further rows and is ready for an `OutputSink`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub finalized: bool,
}

impl RecordTable {
    /// Number of rows held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, CutflowError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| CutflowError::NotFound(name.to_string()))?;
        Ok(self.rows.iter().filter_map(|row| row.get(index)).collect())
    }
}

/// Typed output columns with per-event reset and row flushing.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    slots: SlotTable,
    table: RecordTable,
    /// Rows handed out by `drain_table`; keeps the schema frozen after a batch.
    drained: u64,
}

impl RecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an output column. Its type is the type of `default`.
    pub fn register<T: SlotType>(&mut self, name: &str, default: T) -> Result<(), CutflowError> {
        self.register_value(name, default.into_value())
    }

    /// Register an output column from a dynamically typed default.
    ///
    /// Fails with `SchemaFrozen` once any row has been flushed.
    pub fn register_value(&mut self, name: &str, default: Value) -> Result<(), CutflowError> {
        if !self.table.rows.is_empty() || self.drained > 0 {
            return Err(CutflowError::SchemaFrozen(name.to_string()));
        }
        self.slots.register(name, default.clone())?;
        self.table.columns.push(Column {
            name: name.to_string(),
            kind: default.kind(),
            default,
        });
        Ok(())
    }

    /// Read a column's current value as `T`.
    pub fn get<T: SlotType>(&self, name: &str) -> Result<T, CutflowError> {
        self.slots.get(name)
    }

    /// Borrow a column's current value.
    pub fn get_value(&self, name: &str) -> Result<&Value, CutflowError> {
        self.slots.get_value(name)
    }

    /// Fill a column for the current event.
    pub fn set<T: SlotType>(&mut self, name: &str, value: T) -> Result<(), CutflowError> {
        self.slots.set_value(name, value.into_value())
    }

    /// Fill a column from a dynamically typed value.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), CutflowError> {
        self.slots.set_value(name, value)
    }

    /// Restore every column to its default.
    pub fn reset_all(&mut self) {
        self.slots.reset_all();
    }

    /// Append the current column values as a new row.
    pub fn flush_row(&mut self) -> Result<(), CutflowError> {
        if self.table.finalized {
            return Err(CutflowError::TableFinalized);
        }
        self.table.rows.push(self.slots.values().to_vec());
        Ok(())
    }

    /// Close the table for appends. Idempotent.
    pub fn finalize(&mut self) -> &RecordTable {
        self.table.finalized = true;
        &self.table
    }

    /// Hand out the rows accumulated so far, keeping the schema.
    ///
    /// Used for batched writes: the returned table carries the current
    /// `finalized` flag and the store keeps an empty row buffer.
    pub fn drain_table(&mut self) -> RecordTable {
        let rows = std::mem::take(&mut self.table.rows);
        self.drained = self.drained.saturating_add(rows.len() as u64);
        RecordTable {
            columns: self.table.columns.clone(),
            rows,
            finalized: self.table.finalized,
        }
    }

    /// The table as accumulated since the last drain.
    #[must_use]
    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    /// Rows waiting to be drained.
    #[must_use]
    pub fn pending_rows(&self) -> usize {
        self.table.rows.len()
    }

    /// Rows flushed over the store's lifetime, drained or not.
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.drained.saturating_add(self.table.rows.len() as u64)
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.table.finalized
    }

    /// Registered kind of a column.
    pub fn kind(&self, name: &str) -> Result<ValueKind, CutflowError> {
        self.slots.kind(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains(name)
    }

    /// Column names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        self.slots.names()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lepton_columns() -> RecordStore {
        let mut records = RecordStore::new();
        records.register("lep_pt", -999.0).expect("register");
        records.register("lep_pdgID", -999i64).expect("register");
        records.register("passes_bveto", false).expect("register");
        records
    }

    #[test]
    fn flush_appends_current_values_in_registration_order() {
        let mut records = lepton_columns();
        records.set("lep_pdgID", 13i64).expect("set");
        records.set("lep_pt", 41.5).expect("set");
        records.flush_row().expect("flush");

        assert_eq!(
            records.table().rows,
            vec![vec![Value::Float(41.5), Value::Int(13), Value::Bool(false)]]
        );
    }

    #[test]
    fn unfilled_columns_flush_their_defaults() {
        let mut records = lepton_columns();
        records.set("lep_pt", 50.0).expect("set");
        records.reset_all();
        records.flush_row().expect("flush");

        let row = &records.table().rows[0];
        assert_eq!(row[0], Value::Float(-999.0));
        assert_eq!(row[1], Value::Int(-999));
    }

    #[test]
    fn finalized_table_rejects_rows() {
        let mut records = lepton_columns();
        records.flush_row().expect("flush");
        let table = records.finalize();
        assert!(table.finalized);
        assert_eq!(table.len(), 1);

        assert!(matches!(
            records.flush_row(),
            Err(CutflowError::TableFinalized)
        ));
        assert_eq!(records.pending_rows(), 1);
    }

    #[test]
    fn schema_frozen_after_first_row() {
        let mut records = lepton_columns();
        records.flush_row().expect("flush");
        let _ = records.drain_table();

        let result = records.register("late", 0.0);
        assert!(matches!(result, Err(CutflowError::SchemaFrozen(name)) if name == "late"));
    }

    #[test]
    fn drain_hands_out_batches() {
        let mut records = lepton_columns();
        for pt in [10.0, 20.0, 30.0] {
            records.reset_all();
            records.set("lep_pt", pt).expect("set");
            records.flush_row().expect("flush");
        }

        let batch = records.drain_table();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.columns.len(), 3);
        assert_eq!(records.pending_rows(), 0);
        assert_eq!(records.total_rows(), 3);

        let pts: Vec<_> = batch.column("lep_pt").expect("column");
        assert_eq!(pts, vec![&Value::Float(10.0), &Value::Float(20.0), &Value::Float(30.0)]);
    }
}
