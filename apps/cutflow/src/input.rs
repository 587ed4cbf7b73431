//! # Event Input
//!
//! Events arrive as JSON lines, one object per event:
//!
//! ```text
//! {"n_leps": 1, "jets_pt": [52.1, 33.0], "mc_weight": 0.8}
//! ```
//!
//! Fields named like a registered variable are converted to its kind and
//! published into the `VariableStore`. Unknown fields and `null` values are
//! ignored, so the variable keeps its reset default.

use cutflow_core::{CutflowError, FourVector, RecordStore, Value, ValueKind, VariableStore};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// One decoded event.
pub type Event = serde_json::Map<String, serde_json::Value>;

/// Iterator over the events of a JSON-lines stream. Blank lines are skipped.
#[derive(Debug)]
pub struct JsonLines<R> {
    lines: Lines<R>,
    line_no: u64,
}

impl<R: BufRead> JsonLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl JsonLines<BufReader<File>> {
    /// Open a JSON-lines file.
    pub fn open(path: &Path) -> Result<Self, CutflowError> {
        let file = File::open(path)
            .map_err(|e| CutflowError::IoError(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for JsonLines<R> {
    type Item = Result<Event, CutflowError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(CutflowError::IoError(e.to_string()))),
            };
            self.line_no = self.line_no.saturating_add(1);
            if line.trim().is_empty() {
                continue;
            }
            let line_no = self.line_no;
            return Some(
                serde_json::from_str::<Event>(&line).map_err(|e| {
                    CutflowError::DeserializationError(format!("line {}: {}", line_no, e))
                }),
            );
        }
    }
}

/// Publish an event's fields into the variable store.
pub fn load_event(
    event: &Event,
    vars: &mut VariableStore,
    _records: &mut RecordStore,
) -> Result<(), CutflowError> {
    for (name, json) in event {
        if json.is_null() || !vars.contains(name) {
            continue;
        }
        let value = json_to_value(name, vars.kind(name)?, json)?;
        vars.set_value(name, value)?;
    }
    Ok(())
}

/// Convert a JSON value into a slot value of `kind`.
///
/// Integers are accepted where floats are expected. Four-vectors are
/// objects `{"px", "py", "pz", "e"}` or arrays `[px, py, pz, e]`.
pub fn json_to_value(
    name: &str,
    kind: ValueKind,
    json: &serde_json::Value,
) -> Result<Value, CutflowError> {
    let converted = match kind {
        ValueKind::Bool => json.as_bool().map(Value::Bool),
        ValueKind::Int => json.as_i64().map(Value::Int),
        ValueKind::Float => json.as_f64().map(Value::Float),
        ValueKind::Ints => json
            .as_array()
            .and_then(|items| items.iter().map(|v| v.as_i64()).collect::<Option<Vec<_>>>())
            .map(Value::Ints),
        ValueKind::Floats => json
            .as_array()
            .and_then(|items| items.iter().map(|v| v.as_f64()).collect::<Option<Vec<_>>>())
            .map(Value::Floats),
        ValueKind::FourVector => serde_json::from_value::<FourVector>(json.clone())
            .ok()
            .map(Value::FourVector),
        ValueKind::FourVectors => serde_json::from_value::<Vec<FourVector>>(json.clone())
            .ok()
            .map(Value::FourVectors),
        ValueKind::Text => json.as_str().map(|s| Value::Text(s.to_string())),
    };
    converted.ok_or_else(|| {
        CutflowError::DeserializationError(format!(
            "field '{}': expected {}, found {}",
            name, kind, json
        ))
    })
}
