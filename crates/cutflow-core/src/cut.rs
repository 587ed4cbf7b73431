//! # Cuts
//!
//! A `Cut` is one named decision: a predicate over the per-event stores, an
//! optional weight evaluated when the predicate passes, and optional side
//! effects run on pass or fail. Analysis code supplies all four as closures;
//! there is one `Cut` type, not one type per rule.
//!
//! Callables must be `Send + Sync` so a configured `Cutflow` can be shared by
//! workers that each own their stores and `Tally`.

use crate::{CutflowError, RecordStore, VariableStore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicate callable: decides pass (`true`) or fail (`false`).
pub type Predicate = Box<
    dyn Fn(&mut VariableStore, &mut RecordStore) -> Result<bool, CutflowError> + Send + Sync,
>;

/// Weight callable: evaluated only after the predicate passed.
pub type WeightFn =
    Box<dyn Fn(&mut VariableStore, &mut RecordStore) -> Result<f64, CutflowError> + Send + Sync>;

/// Side-effect callable: run after a pass or a fail.
pub type SideEffect =
    Box<dyn Fn(&mut VariableStore, &mut RecordStore) -> Result<(), CutflowError> + Send + Sync>;

// =============================================================================
// CUT
// =============================================================================

/// A named predicate-plus-weight unit of a `Cutflow`.
pub struct Cut {
    name: String,
    predicate: Predicate,
    weight: Option<WeightFn>,
    on_pass: Option<SideEffect>,
    on_fail: Option<SideEffect>,
}

impl fmt::Debug for Cut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cut")
            .field("name", &self.name)
            .field("weighted", &self.weight.is_some())
            .field("on_pass", &self.on_pass.is_some())
            .field("on_fail", &self.on_fail.is_some())
            .finish_non_exhaustive()
    }
}

impl Cut {
    /// Create a cut from a name and a predicate.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&mut VariableStore, &mut RecordStore) -> Result<bool, CutflowError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            weight: None,
            on_pass: None,
            on_fail: None,
        }
    }

    /// A cut that every event passes (bookkeeping roots, pure weight nodes).
    pub fn always(name: impl Into<String>) -> Self {
        Self::new(name, |_, _| Ok(true))
    }

    /// Attach a weight. Without one the cut weighs 1.0.
    #[must_use]
    pub fn with_weight<F>(mut self, weight: F) -> Self
    where
        F: Fn(&mut VariableStore, &mut RecordStore) -> Result<f64, CutflowError>
            + Send
            + Sync
            + 'static,
    {
        self.weight = Some(Box::new(weight));
        self
    }

    /// Run `effect` whenever the predicate passes, after the weight.
    #[must_use]
    pub fn on_pass<F>(mut self, effect: F) -> Self
    where
        F: Fn(&mut VariableStore, &mut RecordStore) -> Result<(), CutflowError>
            + Send
            + Sync
            + 'static,
    {
        self.on_pass = Some(Box::new(effect));
        self
    }

    /// Run `effect` whenever the predicate fails.
    #[must_use]
    pub fn on_fail<F>(mut self, effect: F) -> Self
    where
        F: Fn(&mut VariableStore, &mut RecordStore) -> Result<(), CutflowError>
            + Send
            + Sync
            + 'static,
    {
        self.on_fail = Some(Box::new(effect));
        self
    }

    /// The cut's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the cut carries its own weight.
    #[must_use]
    pub fn is_weighted(&self) -> bool {
        self.weight.is_some()
    }

    pub(crate) fn evaluate(
        &self,
        vars: &mut VariableStore,
        records: &mut RecordStore,
    ) -> Result<bool, CutflowError> {
        (self.predicate)(vars, records)
    }

    pub(crate) fn weight(
        &self,
        vars: &mut VariableStore,
        records: &mut RecordStore,
    ) -> Result<f64, CutflowError> {
        match &self.weight {
            Some(weight) => weight(vars, records),
            None => Ok(1.0),
        }
    }

    pub(crate) fn after(
        &self,
        passed: bool,
        vars: &mut VariableStore,
        records: &mut RecordStore,
    ) -> Result<(), CutflowError> {
        let effect = if passed { &self.on_pass } else { &self.on_fail };
        match effect {
            Some(effect) => effect(vars, records),
            None => Ok(()),
        }
    }
}

// =============================================================================
// COUNTERS
// =============================================================================

/// Cumulative bookkeeping for one cut.
///
/// Counters are never reset per event. `weighted_passes` sums the cut's own
/// weight over passing visits. `weighted_fails` sums the event weight that
/// reached the cut on failing visits: the product of the weights of every
/// cut passed before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CutCounters {
    /// Times the cut was reached.
    pub visits: u64,
    /// Times the predicate returned true.
    pub passes: u64,
    /// Times the predicate returned false. A visit whose predicate faulted
    /// is in neither `passes` nor `fails`.
    pub fails: u64,
    pub weighted_passes: f64,
    pub weighted_fails: f64,
}

impl CutCounters {
    /// Weighted pass fraction. `None` when nothing was counted.
    #[must_use]
    pub fn efficiency(&self) -> Option<f64> {
        let total = self.weighted_passes + self.weighted_fails;
        if total == 0.0 {
            return None;
        }
        Some(self.weighted_passes / total)
    }

    /// Add another counter set (per-worker merge).
    pub fn merge(&mut self, other: &Self) {
        self.visits = self.visits.saturating_add(other.visits);
        self.passes = self.passes.saturating_add(other.passes);
        self.fails = self.fails.saturating_add(other.fails);
        self.weighted_passes += other.weighted_passes;
        self.weighted_fails += other.weighted_fails;
    }

    pub(crate) fn record_visit(&mut self) {
        self.visits = self.visits.saturating_add(1);
    }

    pub(crate) fn record_pass(&mut self) {
        self.passes = self.passes.saturating_add(1);
    }

    pub(crate) fn add_pass_weight(&mut self, cut_weight: f64) {
        self.weighted_passes += cut_weight;
    }

    pub(crate) fn record_fail(&mut self, event_weight: f64) {
        self.fails = self.fails.saturating_add(1);
        self.weighted_fails += event_weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unweighted_cut_weighs_one() {
        let cut = Cut::always("Bookkeeping");
        let mut vars = VariableStore::new();
        let mut records = RecordStore::new();

        assert!(!cut.is_weighted());
        assert!(cut.evaluate(&mut vars, &mut records).expect("evaluate"));
        assert_eq!(cut.weight(&mut vars, &mut records).expect("weight"), 1.0);
    }

    #[test]
    fn side_effects_follow_the_outcome() {
        let cut = Cut::new("HasLepton", |vars, _| Ok(vars.get::<i64>("n_leps")? == 1))
            .on_pass(|vars, _| vars.set("tag", 1i64))
            .on_fail(|vars, _| vars.set("tag", -1i64));
        let mut vars = VariableStore::new();
        vars.register("n_leps", 0i64).expect("register");
        vars.register("tag", 0i64).expect("register");
        let mut records = RecordStore::new();

        let passed = cut.evaluate(&mut vars, &mut records).expect("evaluate");
        cut.after(passed, &mut vars, &mut records).expect("after");
        assert_eq!(vars.get::<i64>("tag").expect("get"), -1);

        vars.set("n_leps", 1i64).expect("set");
        let passed = cut.evaluate(&mut vars, &mut records).expect("evaluate");
        cut.after(passed, &mut vars, &mut records).expect("after");
        assert_eq!(vars.get::<i64>("tag").expect("get"), 1);
    }

    fn pass(counters: &mut CutCounters, cut_weight: f64) {
        counters.record_visit();
        counters.record_pass();
        counters.add_pass_weight(cut_weight);
    }

    fn fail(counters: &mut CutCounters, event_weight: f64) {
        counters.record_visit();
        counters.record_fail(event_weight);
    }

    #[test]
    fn counters_track_fails_and_efficiency() {
        let mut counters = CutCounters::default();
        assert_eq!(counters.efficiency(), None);

        pass(&mut counters, 0.5);
        pass(&mut counters, 0.5);
        fail(&mut counters, 1.0);

        assert_eq!(counters.visits, 3);
        assert_eq!(counters.fails, 1);
        assert_eq!(counters.efficiency(), Some(0.5));
    }

    #[test]
    fn counters_merge_by_summation() {
        let mut a = CutCounters::default();
        pass(&mut a, 2.0);
        let mut b = CutCounters::default();
        fail(&mut b, 1.5);

        a.merge(&b);
        assert_eq!(a.visits, 2);
        assert_eq!(a.passes, 1);
        assert_eq!(a.weighted_passes, 2.0);
        assert_eq!(a.weighted_fails, 1.5);
    }
}
