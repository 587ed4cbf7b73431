//! Tests for analysis configuration parsing and building.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use cutflow::AnalysisConfig;
use cutflow::config::{CompareOp, Condition};
use cutflow_core::{CutflowError, Edge, FailRoute, Value, ValueKind};

const DILEPTON: &str = r#"
entry = "Bookkeeping"

[[variables]]
name = "n_leps"
kind = "int"

[[variables]]
name = "met"
kind = "float"

[[variables]]
name = "mc_weight"
kind = "float"
default = 1.0

[[columns]]
name = "met"
kind = "float"
default = -999.0

[[cuts]]
name = "Bookkeeping"
weight = "mc_weight"

[[cuts]]
name = "Has3Leps"
parent = "Bookkeeping"
require = [{ var = "n_leps", op = "==", value = 3 }]

[[cuts]]
name = "Has2Leps"
parent = "Has3Leps"
edge = "fail"
require = [{ var = "n_leps", op = "==", value = 2 }]

[[cuts]]
name = "HighMet"
parent = "Has2Leps"
require = [{ var = "met", op = ">", value = 50.0 }]
record = ["met"]

[looper]
max_events = 1000
"#;

// =============================================================================
// PARSING TESTS
// =============================================================================

#[test]
fn test_config_parses_cuts_and_defaults() {
    let config = AnalysisConfig::from_toml_str(DILEPTON).unwrap();

    assert_eq!(config.entry, "Bookkeeping");
    assert_eq!(config.variables.len(), 3);
    assert_eq!(config.variables[0].kind, ValueKind::Int);
    assert_eq!(config.cuts[1].edge, Edge::Pass);
    assert_eq!(config.cuts[2].edge, Edge::Fail);
    assert_eq!(
        config.cuts[3].require,
        vec![Condition {
            var: "met".to_string(),
            op: CompareOp::Gt,
            value: 50.0,
        }]
    );
    assert_eq!(config.looper_config().max_events, Some(1000));
}

#[test]
fn test_unknown_field_rejected() {
    let text = DILEPTON.replace("weight = \"mc_weight\"", "wieght = \"mc_weight\"");
    let result = AnalysisConfig::from_toml_str(&text);
    assert!(matches!(result, Err(CutflowError::DeserializationError(_))));
}

#[test]
fn test_unknown_kind_rejected() {
    let text = DILEPTON.replace("kind = \"int\"", "kind = \"integer\"");
    assert!(AnalysisConfig::from_toml_str(&text).is_err());
}

// =============================================================================
// BUILD TESTS
// =============================================================================

#[test]
fn test_build_wires_fail_branch() {
    let analysis = AnalysisConfig::from_toml_str(DILEPTON)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(analysis.cutflow.len(), 4);
    assert_eq!(
        analysis.cutflow.fail_route("Has3Leps").unwrap(),
        FailRoute::Branch
    );
    assert_eq!(
        analysis.cutflow.fail_route("HighMet").unwrap(),
        FailRoute::Reject
    );
    assert_eq!(
        analysis.records.get_value("met").unwrap(),
        &Value::Float(-999.0)
    );
    assert_eq!(analysis.variables.get::<i64>("n_leps").unwrap(), 0);
}

#[test]
fn test_build_routes_events() {
    let mut analysis = AnalysisConfig::from_toml_str(DILEPTON)
        .unwrap()
        .build()
        .unwrap();

    analysis.reset();
    analysis.variables.set("n_leps", 2i64).unwrap();
    analysis.variables.set("met", 80.0).unwrap();
    analysis.variables.set("mc_weight", 0.25).unwrap();
    let outcome = analysis.process("Bookkeeping").unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(outcome.weight, 0.25);

    analysis.reset();
    analysis.variables.set("n_leps", 3i64).unwrap();
    let outcome = analysis.process("Bookkeeping").unwrap();
    assert!(outcome.is_accepted());

    analysis.reset();
    analysis.variables.set("n_leps", 2i64).unwrap();
    analysis.variables.set("met", 10.0).unwrap();
    assert!(!analysis.process("Bookkeeping").unwrap().is_accepted());

    // The three-lepton event is accepted without filling the column.
    let table = analysis.records.table();
    assert_eq!(
        table.rows,
        vec![vec![Value::Float(80.0)], vec![Value::Float(-999.0)]]
    );
    let high_met = analysis.cutflow.counters("HighMet").unwrap();
    assert_eq!((high_met.visits, high_met.passes), (2, 1));
}

#[test]
fn test_unknown_parent_fails_build() {
    let text = DILEPTON.replace("parent = \"Has2Leps\"", "parent = \"Has4Leps\"");
    let result = AnalysisConfig::from_toml_str(&text).unwrap().build();
    assert!(matches!(result, Err(CutflowError::NotFound(_))));
}

#[test]
fn test_unknown_entry_fails_build() {
    let text = DILEPTON.replace("entry = \"Bookkeeping\"", "entry = \"Start\"");
    let result = AnalysisConfig::from_toml_str(&text).unwrap().build();
    assert!(matches!(result, Err(CutflowError::NotFound(_))));
}

#[test]
fn test_record_kind_mismatch_fails_build() {
    let text = DILEPTON.replace("record = [\"met\"]", "record = [\"n_leps\"]");
    let text = text.replace(
        "[[columns]]\nname = \"met\"",
        "[[columns]]\nname = \"n_leps\"",
    );
    let result = AnalysisConfig::from_toml_str(&text).unwrap().build();
    assert!(matches!(result, Err(CutflowError::TypeMismatch { .. })));
}

#[test]
fn test_bad_default_rejected() {
    let text = DILEPTON.replace("default = -999.0", "default = \"none\"");
    let result = AnalysisConfig::from_toml_str(&text).unwrap().build();
    assert!(matches!(result, Err(CutflowError::DeserializationError(_))));
}

#[test]
fn test_condition_on_text_variable_fails_build() {
    let text = DILEPTON.replace(
        "[[variables]]\nname = \"met\"\nkind = \"float\"",
        "[[variables]]\nname = \"met\"\nkind = \"text\"",
    );
    let text = text.replace("record = [\"met\"]", "");
    let result = AnalysisConfig::from_toml_str(&text).unwrap().build();
    assert!(matches!(
        result,
        Err(CutflowError::TypeMismatch { name, found: ValueKind::Text, .. }) if name == "met"
    ));
}

#[test]
fn test_unwritable_cut_name_fails_build() {
    let text = DILEPTON.replace("name = \"HighMet\"", "name = \"met>50,loose\"");
    let result = AnalysisConfig::from_toml_str(&text).unwrap().build();
    assert!(matches!(result, Err(CutflowError::InvalidName(_))));
}
