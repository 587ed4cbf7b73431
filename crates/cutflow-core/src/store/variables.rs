//! Variable store: values cuts publish for cuts further down the same path.

use super::SlotTable;
use crate::{CutflowError, SlotType, Value, ValueKind};

/// Typed, per-event scoped variables.
///
/// Variables are registered once at configuration time. Every event starts
/// from the registered defaults; `Looper` calls `reset_all` before each
/// traversal.
///
/// # Example
/// ```
/// use cutflow_core::VariableStore;
///
/// let mut vars = VariableStore::new();
/// vars.register("n_jets", 0i64).expect("register");
/// vars.set("n_jets", 3i64).expect("set");
/// assert_eq!(vars.get::<i64>("n_jets").expect("get"), 3);
///
/// vars.reset_all();
/// assert_eq!(vars.get::<i64>("n_jets").expect("get"), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    slots: SlotTable,
}

impl VariableStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable. Its type is the type of `default`.
    pub fn register<T: SlotType>(&mut self, name: &str, default: T) -> Result<(), CutflowError> {
        self.register_value(name, default.into_value())
    }

    /// Register a variable from a dynamically typed default.
    pub fn register_value(&mut self, name: &str, default: Value) -> Result<(), CutflowError> {
        self.slots.register(name, default)?;
        Ok(())
    }

    /// Read a variable as `T`.
    pub fn get<T: SlotType>(&self, name: &str) -> Result<T, CutflowError> {
        self.slots.get(name)
    }

    /// Borrow the current value without cloning.
    pub fn get_value(&self, name: &str) -> Result<&Value, CutflowError> {
        self.slots.get_value(name)
    }

    /// Overwrite a variable. Fails without touching the slot on a type mismatch.
    pub fn set<T: SlotType>(&mut self, name: &str, value: T) -> Result<(), CutflowError> {
        self.slots.set_value(name, value.into_value())
    }

    /// Overwrite a variable from a dynamically typed value.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<(), CutflowError> {
        self.slots.set_value(name, value)
    }

    /// Restore every variable to its registered default.
    pub fn reset_all(&mut self) {
        self.slots.reset_all();
    }

    /// Registered kind of a variable.
    pub fn kind(&self, name: &str) -> Result<ValueKind, CutflowError> {
        self.slots.kind(name)
    }

    /// Registered default of a variable.
    pub fn default_of(&self, name: &str) -> Result<&Value, CutflowError> {
        self.slots.default_of(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains(name)
    }

    /// Variable names in registration order.
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
