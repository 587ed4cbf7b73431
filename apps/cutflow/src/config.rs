//! # Analysis Configuration
//!
//! A TOML file describing one analysis: the per-event variables, the output
//! columns, and the tree of cuts. Cuts are declared parent-first; each one
//! names its parent and the edge it hangs from.
//!
//! ```toml
//! entry = "Bookkeeping"
//!
//! [[variables]]
//! name = "n_leps"
//! kind = "int"
//!
//! [[variables]]
//! name = "mc_weight"
//! kind = "float"
//! default = 1.0
//!
//! [[columns]]
//! name = "n_leps"
//! kind = "int"
//! default = -1
//!
//! [[cuts]]
//! name = "Bookkeeping"
//! weight = "mc_weight"
//!
//! [[cuts]]
//! name = "Has1Lep"
//! parent = "Bookkeeping"
//! require = [{ var = "n_leps", op = "==", value = 1 }]
//! record = ["n_leps"]
//!
//! [[cuts]]
//! name = "Has2Leps"
//! parent = "Has1Lep"
//! edge = "fail"
//! require = [{ var = "n_leps", op = "==", value = 2 }]
//! ```
//!
//! Conditions compare a scalar variable, or the length of a vector
//! variable, against a number. All conditions of a cut must hold for it to
//! pass; a cut without conditions always passes.

use crate::input::json_to_value;
use cutflow_core::{
    Analysis, Cut, CutflowError, Cutflow, Edge, LooperConfig, RecordStore, Value, ValueKind,
    VariableStore,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// CONFIGURATION TYPES
// =============================================================================

/// A whole analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Cut every traversal starts from.
    pub entry: String,
    #[serde(default)]
    pub variables: Vec<SlotConfig>,
    #[serde(default)]
    pub columns: Vec<SlotConfig>,
    pub cuts: Vec<CutConfig>,
    #[serde(default)]
    pub looper: LoopSettings,
}

/// A variable or column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotConfig {
    pub name: String,
    pub kind: ValueKind,
    /// Reset value; the kind's zero when omitted.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// One cut of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CutConfig {
    pub name: String,
    /// Parent cut; `None` makes this cut a root.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "default_edge")]
    pub edge: Edge,
    #[serde(default)]
    pub require: Vec<Condition>,
    /// Float variable multiplied into the event weight on pass.
    #[serde(default)]
    pub weight: Option<String>,
    /// Variables copied into same-named columns on pass.
    #[serde(default)]
    pub record: Vec<String>,
}

fn default_edge() -> Edge {
    Edge::Pass
}

/// `var op value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub var: String,
    pub op: CompareOp,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

/// Optional event loop settings; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopSettings {
    #[serde(default)]
    pub max_events: Option<u64>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub progress_every: Option<u64>,
    #[serde(default)]
    pub skip_unreadable: bool,
}

// =============================================================================
// COMPARABLE VIEW
// =============================================================================

/// Number a condition compares: the scalar itself, or a vector's length.
fn observe(value: &Value) -> Option<f64> {
    match value {
        Value::Ints(v) => Some(v.len() as f64),
        Value::Floats(v) => Some(v.len() as f64),
        Value::FourVectors(v) => Some(v.len() as f64),
        other => other.as_f64(),
    }
}

fn comparable(kind: ValueKind) -> bool {
    !matches!(kind, ValueKind::FourVector | ValueKind::Text)
}

// =============================================================================
// LOADING AND BUILDING
// =============================================================================

impl AnalysisConfig {
    /// Parse a TOML analysis.
    pub fn from_toml_str(text: &str) -> Result<Self, CutflowError> {
        toml::from_str(text).map_err(|e| CutflowError::DeserializationError(e.to_string()))
    }

    /// Read and parse a TOML analysis file.
    pub fn from_file(path: &Path) -> Result<Self, CutflowError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CutflowError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Event loop settings with the config's overrides applied.
    pub fn looper_config(&self) -> LooperConfig {
        let mut config = LooperConfig::new(self.entry.clone());
        config.max_events = self.looper.max_events;
        if let Some(batch_size) = self.looper.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(progress_every) = self.looper.progress_every {
            config.progress_every = progress_every;
        }
        config.skip_unreadable = self.looper.skip_unreadable;
        config
    }

    /// Register the stores and wire the cut tree.
    ///
    /// Every reference is checked here, so a successful build cannot fail
    /// later on an unknown name or an incomparable variable.
    pub fn build(&self) -> Result<Analysis, CutflowError> {
        let mut variables = VariableStore::new();
        for slot in &self.variables {
            variables.register_value(&slot.name, slot.default_value()?)?;
        }
        let mut records = RecordStore::new();
        for slot in &self.columns {
            records.register_value(&slot.name, slot.default_value()?)?;
        }

        let mut cutflow = Cutflow::new();
        for cut in &self.cuts {
            cut.check(&variables, &records)?;
            let built = cut.to_cut();
            match &cut.parent {
                None => cutflow.set_root(built)?,
                Some(parent) => cutflow.insert(parent, built, cut.edge)?,
            };
        }
        cutflow.id(&self.entry)?;

        tracing::debug!(
            cuts = cutflow.len(),
            variables = variables.len(),
            columns = records.len(),
            "analysis built"
        );
        Ok(Analysis::new(cutflow, variables, records))
    }
}

impl SlotConfig {
    fn default_value(&self) -> Result<Value, CutflowError> {
        match &self.default {
            Some(json) => json_to_value(&self.name, self.kind, json),
            None => Ok(self.kind.zero()),
        }
    }
}

impl CutConfig {
    fn check(&self, variables: &VariableStore, records: &RecordStore) -> Result<(), CutflowError> {
        for condition in &self.require {
            let kind = variables.kind(&condition.var)?;
            if !comparable(kind) {
                return Err(CutflowError::TypeMismatch {
                    name: condition.var.clone(),
                    expected: ValueKind::Float,
                    found: kind,
                });
            }
        }
        if let Some(weight) = &self.weight {
            let kind = variables.kind(weight)?;
            if !matches!(kind, ValueKind::Float | ValueKind::Int) {
                return Err(CutflowError::TypeMismatch {
                    name: weight.clone(),
                    expected: ValueKind::Float,
                    found: kind,
                });
            }
        }
        for name in &self.record {
            let (expected, found) = (records.kind(name)?, variables.kind(name)?);
            if expected != found {
                return Err(CutflowError::TypeMismatch {
                    name: name.clone(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    fn to_cut(&self) -> Cut {
        let name = self.name.clone();
        let require = self.require.clone();
        let mut cut = Cut::new(self.name.clone(), move |vars, _| {
            for condition in &require {
                let value = vars.get_value(&condition.var)?;
                let observed = observe(value).ok_or_else(|| {
                    CutflowError::fault(&name, format!("'{}' is not comparable", condition.var))
                })?;
                if !condition.op.holds(observed, condition.value) {
                    return Ok(false);
                }
            }
            Ok(true)
        });

        if let Some(weight) = self.weight.clone() {
            let name = self.name.clone();
            cut = cut.with_weight(move |vars, _| {
                vars.get_value(&weight)?.as_f64().ok_or_else(|| {
                    CutflowError::fault(&name, format!("weight '{}' is not numeric", weight))
                })
            });
        }

        if !self.record.is_empty() {
            let record = self.record.clone();
            cut = cut.on_pass(move |vars, records| {
                for name in &record {
                    records.set_value(name, vars.get_value(name)?.clone())?;
                }
                Ok(())
            });
        }
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANALYSIS: &str = r#"
entry = "Bookkeeping"

[[variables]]
name = "n_jets"
kind = "int"

[[variables]]
name = "jets_pt"
kind = "floats"

[[variables]]
name = "mc_weight"
kind = "float"
default = 1.0

[[columns]]
name = "n_jets"
kind = "int"
default = -1

[[cuts]]
name = "Bookkeeping"
weight = "mc_weight"

[[cuts]]
name = "TwoJets"
parent = "Bookkeeping"
require = [{ var = "jets_pt", op = ">=", value = 2 }]
record = ["n_jets"]
"#;

    #[test]
    fn vector_conditions_compare_length() {
        let mut analysis = AnalysisConfig::from_toml_str(ANALYSIS)
            .expect("parse")
            .build()
            .expect("build");
        analysis
            .variables
            .set("jets_pt", vec![40.0, 30.0])
            .expect("set");
        analysis.variables.set("n_jets", 2i64).expect("set");
        analysis.variables.set("mc_weight", 0.5).expect("set");

        let outcome = analysis.process("Bookkeeping").expect("process");
        assert!(outcome.is_accepted());
        assert_eq!(outcome.weight, 0.5);
        assert_eq!(analysis.records.table().rows, vec![vec![Value::Int(2)]]);
    }

    #[test]
    fn compare_ops() {
        assert!(CompareOp::Lt.holds(1.0, 2.0));
        assert!(CompareOp::Ge.holds(2.0, 2.0));
        assert!(!CompareOp::Ne.holds(2.0, 2.0));
    }
}
