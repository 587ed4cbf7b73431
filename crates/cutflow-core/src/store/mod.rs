//! # Per-Event Stores
//!
//! Two typed, name-keyed registries share one slot implementation:
//! - `VariableStore`: values published by upstream cuts for downstream cuts
//! - `RecordStore`: output columns, plus the append-only table of accepted rows
//!
//! Both are reset to their registered defaults before every event, so a read
//! before the producing cut ran yields the default, never a stale value.

mod records;
mod variables;

pub use records::{Column, RecordStore, RecordTable, Row};
pub use variables::VariableStore;

use crate::{CutflowError, SlotType, Value, ValueKind};
use std::collections::BTreeMap;

// =============================================================================
// SLOT TABLE
// =============================================================================

/// Registration-ordered typed slots with a name index.
///
/// The kind of each slot is the kind of its default and never changes.
#[derive(Debug, Clone, Default)]
pub(crate) struct SlotTable {
    /// Name -> position
    index: BTreeMap<String, usize>,
    /// Names in registration order.
    names: Vec<String>,
    defaults: Vec<Value>,
    values: Vec<Value>,
}

impl SlotTable {
    pub(crate) fn register(&mut self, name: &str, default: Value) -> Result<usize, CutflowError> {
        if self.index.contains_key(name) {
            return Err(CutflowError::DuplicateName(name.to_string()));
        }
        let position = self.names.len();
        self.index.insert(name.to_string(), position);
        self.names.push(name.to_string());
        self.values.push(default.clone());
        self.defaults.push(default);
        Ok(position)
    }

    pub(crate) fn position(&self, name: &str) -> Result<usize, CutflowError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CutflowError::NotFound(name.to_string()))
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn kind(&self, name: &str) -> Result<ValueKind, CutflowError> {
        let position = self.position(name)?;
        Ok(self.defaults[position].kind())
    }

    pub(crate) fn default_of(&self, name: &str) -> Result<&Value, CutflowError> {
        let position = self.position(name)?;
        Ok(&self.defaults[position])
    }

    pub(crate) fn get_value(&self, name: &str) -> Result<&Value, CutflowError> {
        let position = self.position(name)?;
        Ok(&self.values[position])
    }

    pub(crate) fn get<T: SlotType>(&self, name: &str) -> Result<T, CutflowError> {
        let value = self.get_value(name)?;
        T::from_value(value).ok_or_else(|| CutflowError::TypeMismatch {
            name: name.to_string(),
            expected: value.kind(),
            found: T::KIND,
        })
    }

    /// Overwrite a slot. On a kind mismatch the slot is left untouched.
    pub(crate) fn set_value(&mut self, name: &str, value: Value) -> Result<(), CutflowError> {
        let position = self.position(name)?;
        let expected = self.defaults[position].kind();
        if value.kind() != expected {
            return Err(CutflowError::TypeMismatch {
                name: name.to_string(),
                expected,
                found: value.kind(),
            });
        }
        self.values[position] = value;
        Ok(())
    }

    pub(crate) fn reset_all(&mut self) {
        self.values.clone_from(&self.defaults);
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
