//! # Cutflow Graph
//!
//! The decision graph of the engine. Cuts are owned by the `Cutflow` and
//! addressed by name. Every cut has at most two children, one per `Edge`, and
//! at most one parent, so the graph is a forest of binary trees. Any cut can be
//! a traversal entry point.
//!
//! Structure and counters are kept apart: the structure is immutable once
//! configured, the counters live in a `Tally`. `Cutflow::run` uses the
//! built-in tally; `Cutflow::run_with` takes an external one so workers can
//! share one `&Cutflow` and merge their tallies afterwards.

use crate::summary::{CutSummary, CutflowSummary, is_cflow_safe};
use crate::{
    Cut, CutCounters, CutId, CutflowError, Edge, FailRoute, RecordStore, VariableStore, Verdict,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// TRAVERSAL RESULTS
// =============================================================================

/// Result of one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub verdict: Verdict,
    /// Product of the weights of every passed cut on the path.
    pub weight: f64,
    /// The last cut visited.
    pub terminal: CutId,
}

impl Outcome {
    /// Check if the event was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }
}

/// One row of a cutflow table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutflowRow {
    pub name: String,
    pub visits: u64,
    pub passes: u64,
    pub weighted_passes: f64,
    pub fails: u64,
    pub weighted_fails: f64,
}

// =============================================================================
// TALLY
// =============================================================================

/// Counter slots for every cut of one `Cutflow`, indexed by `CutId`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    counters: Vec<CutCounters>,
}

impl Tally {
    /// Create zeroed counters for `len` cuts.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self {
            counters: vec![CutCounters::default(); len],
        }
    }

    /// Counters of one cut.
    #[must_use]
    pub fn get(&self, id: CutId) -> Option<&CutCounters> {
        self.counters.get(id.index())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Sum another tally of the same cutflow into this one.
    pub fn merge(&mut self, other: &Tally) -> Result<(), CutflowError> {
        if self.counters.len() != other.counters.len() {
            return Err(CutflowError::InconsistentCutflows(format!(
                "tally sizes differ: {} vs {}",
                self.counters.len(),
                other.counters.len()
            )));
        }
        for (mine, theirs) in self.counters.iter_mut().zip(&other.counters) {
            mine.merge(theirs);
        }
        Ok(())
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        self.counters.fill(CutCounters::default());
    }

    /// Grow to cover cuts added after the tally was sized.
    fn ensure_len(&mut self, len: usize) {
        if self.counters.len() < len {
            self.counters.resize(len, CutCounters::default());
        }
    }

    fn slot(&mut self, id: CutId) -> &mut CutCounters {
        self.ensure_len(id.index().saturating_add(1));
        &mut self.counters[id.index()]
    }
}

// =============================================================================
// CUTFLOW
// =============================================================================

/// A cut together with its links.
#[derive(Debug)]
struct CutNode {
    cut: Cut,
    parent: Option<CutId>,
    pass: Option<CutId>,
    fail: Option<CutId>,
}

/// The decision graph.
///
/// Built by `set_root` and `insert` at configuration time. Any construction
/// error poisons the graph: later calls to `run` fail with `GraphPoisoned`
/// instead of traversing a half-built structure.
#[derive(Debug, Default)]
pub struct Cutflow {
    /// Cut storage, indexed by `CutId`.
    nodes: Vec<CutNode>,
    /// Name -> CutId
    by_name: BTreeMap<String, CutId>,
    /// Cuts registered through `set_root`, in registration order.
    roots: Vec<CutId>,
    tally: Tally,
    poisoned: bool,
}

impl Cutflow {
    /// Create an empty cutflow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Register `cut` as a parentless entry point.
    pub fn set_root(&mut self, cut: Cut) -> Result<CutId, CutflowError> {
        let result = self.attach(cut, None);
        if let Ok(id) = result {
            self.roots.push(id);
        }
        result
    }

    /// Attach `cut` below `parent` on `edge`.
    ///
    /// Fails with `NotFound` if the parent is unknown, `EdgeOccupied` if the
    /// parent already has a child there, `InvalidName` if the name cannot be
    /// written to a summary, or `DuplicateName` if it is taken.
    pub fn insert(&mut self, parent: &str, cut: Cut, edge: Edge) -> Result<CutId, CutflowError> {
        let parent_id = match self.by_name.get(parent) {
            Some(&id) => id,
            None => {
                self.poisoned = true;
                return Err(CutflowError::NotFound(parent.to_string()));
            }
        };
        if self.child(parent_id, edge).is_some() {
            self.poisoned = true;
            return Err(CutflowError::EdgeOccupied {
                parent: parent.to_string(),
                edge,
            });
        }
        let id = self.attach(cut, Some(parent_id))?;
        let node = &mut self.nodes[parent_id.index()];
        match edge {
            Edge::Pass => node.pass = Some(id),
            Edge::Fail => node.fail = Some(id),
        }
        Ok(id)
    }

    fn attach(&mut self, cut: Cut, parent: Option<CutId>) -> Result<CutId, CutflowError> {
        if !is_cflow_safe(cut.name()) {
            self.poisoned = true;
            return Err(CutflowError::InvalidName(cut.name().to_string()));
        }
        if self.by_name.contains_key(cut.name()) {
            self.poisoned = true;
            return Err(CutflowError::DuplicateName(cut.name().to_string()));
        }
        let id = CutId(self.nodes.len());
        tracing::debug!(cut = cut.name(), id = id.index(), "registered cut");
        self.by_name.insert(cut.name().to_string(), id);
        self.nodes.push(CutNode {
            cut,
            parent,
            pass: None,
            fail: None,
        });
        self.tally.ensure_len(self.nodes.len());
        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Resolve a cut name.
    pub fn id(&self, name: &str) -> Result<CutId, CutflowError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CutflowError::NotFound(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Borrow a cut by id.
    #[must_use]
    pub fn cut(&self, id: CutId) -> Option<&Cut> {
        self.nodes.get(id.index()).map(|n| &n.cut)
    }

    /// Name of a cut by id.
    #[must_use]
    pub fn name_of(&self, id: CutId) -> Option<&str> {
        self.cut(id).map(Cut::name)
    }

    /// Child of a cut on the given edge.
    #[must_use]
    pub fn child(&self, id: CutId, edge: Edge) -> Option<CutId> {
        let node = self.nodes.get(id.index())?;
        match edge {
            Edge::Pass => node.pass,
            Edge::Fail => node.fail,
        }
    }

    /// Parent of a cut; `None` for roots.
    #[must_use]
    pub fn parent(&self, id: CutId) -> Option<CutId> {
        self.nodes.get(id.index())?.parent
    }

    /// What failing the named cut does to an event.
    pub fn fail_route(&self, name: &str) -> Result<FailRoute, CutflowError> {
        let id = self.id(name)?;
        Ok(match self.child(id, Edge::Fail) {
            Some(_) => FailRoute::Branch,
            None => FailRoute::Reject,
        })
    }

    /// Entry points registered with `set_root`.
    #[must_use]
    pub fn roots(&self) -> &[CutId] {
        &self.roots
    }

    /// Number of cuts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if a construction error occurred.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Fail unless the graph is usable for traversal.
    pub fn ensure_runnable(&self) -> Result<(), CutflowError> {
        if self.poisoned {
            return Err(CutflowError::GraphPoisoned);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Traversal
    // -------------------------------------------------------------------------

    /// Run one event from `start`, counting into the built-in tally.
    pub fn run(
        &mut self,
        start: &str,
        vars: &mut VariableStore,
        records: &mut RecordStore,
    ) -> Result<Outcome, CutflowError> {
        let mut tally = std::mem::take(&mut self.tally);
        let result = self.walk(start, vars, records, &mut tally, None);
        self.tally = tally;
        result
    }

    /// Like `run`, additionally returning the visited cuts in order.
    pub fn run_traced(
        &mut self,
        start: &str,
        vars: &mut VariableStore,
        records: &mut RecordStore,
    ) -> Result<(Outcome, Vec<CutId>), CutflowError> {
        let mut tally = std::mem::take(&mut self.tally);
        let mut path = Vec::new();
        let result = self.walk(start, vars, records, &mut tally, Some(&mut path));
        self.tally = tally;
        result.map(|outcome| (outcome, path))
    }

    /// Run one event from `start`, counting into an external tally.
    ///
    /// The graph is only read, so several workers may call this concurrently
    /// on a shared `&Cutflow`, each with its own stores and tally.
    pub fn run_with(
        &self,
        start: &str,
        vars: &mut VariableStore,
        records: &mut RecordStore,
        tally: &mut Tally,
    ) -> Result<Outcome, CutflowError> {
        self.walk(start, vars, records, tally, None)
    }

    fn walk(
        &self,
        start: &str,
        vars: &mut VariableStore,
        records: &mut RecordStore,
        tally: &mut Tally,
        mut path: Option<&mut Vec<CutId>>,
    ) -> Result<Outcome, CutflowError> {
        self.ensure_runnable()?;
        let mut current = self.id(start)?;
        let mut weight = 1.0;

        // Each step moves to a child, and children are created fresh by
        // `insert`, so the walk visits at most `len()` cuts.
        loop {
            let node = &self.nodes[current.index()];
            if let Some(path) = path.as_deref_mut() {
                path.push(current);
            }

            // Visit and pass are counted before the callable that may fault.
            tally.slot(current).record_visit();
            let passed = node.cut.evaluate(vars, records)?;
            let next = if passed {
                tally.slot(current).record_pass();
                let cut_weight = node.cut.weight(vars, records)?;
                weight *= cut_weight;
                tally.slot(current).add_pass_weight(cut_weight);
                node.cut.after(true, vars, records)?;
                node.pass
            } else {
                tally.slot(current).record_fail(weight);
                node.cut.after(false, vars, records)?;
                node.fail
            };

            match next {
                Some(child) => current = child,
                None => {
                    let verdict = if passed {
                        Verdict::Accepted
                    } else {
                        Verdict::Rejected
                    };
                    return Ok(Outcome {
                        verdict,
                        weight,
                        terminal: current,
                    });
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Bookkeeping
    // -------------------------------------------------------------------------

    /// The built-in tally.
    #[must_use]
    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// A zeroed tally sized for this cutflow, for use with `run_with`.
    #[must_use]
    pub fn new_tally(&self) -> Tally {
        Tally::with_len(self.nodes.len())
    }

    /// Sum a worker tally into the built-in one.
    pub fn merge_tally(&mut self, other: &Tally) -> Result<(), CutflowError> {
        self.tally.merge(other)
    }

    /// Zero the built-in tally (process start).
    pub fn reset_counters(&mut self) {
        self.tally.reset();
    }

    /// Counters of the named cut.
    pub fn counters(&self, name: &str) -> Result<CutCounters, CutflowError> {
        let id = self.id(name)?;
        Ok(self.tally.get(id).copied().unwrap_or_default())
    }

    /// Cutflow table reachable from `start`, pre-order, pass subtree first.
    pub fn report(&self, start: &str) -> Result<Vec<CutflowRow>, CutflowError> {
        let start = self.id(start)?;
        let mut rows = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.index()];
            let counters = self.tally.get(id).copied().unwrap_or_default();
            rows.push(CutflowRow {
                name: node.cut.name().to_string(),
                visits: counters.visits,
                passes: counters.passes,
                weighted_passes: counters.weighted_passes,
                fails: counters.fails,
                weighted_fails: counters.weighted_fails,
            });
            if let Some(fail) = node.fail {
                stack.push(fail);
            }
            if let Some(pass) = node.pass {
                stack.push(pass);
            }
        }
        Ok(rows)
    }

    /// Path from the root of `name`'s tree down to `name`, inclusive.
    pub fn lineage(&self, name: &str) -> Result<Vec<CutId>, CutflowError> {
        let mut current = Some(self.id(name)?);
        let mut lineage = Vec::new();
        while let Some(id) = current {
            lineage.push(id);
            current = self.parent(id);
        }
        lineage.reverse();
        Ok(lineage)
    }

    /// Detached snapshot of names, network and counters.
    #[must_use]
    pub fn summary(&self) -> CutflowSummary {
        let name = |id: Option<CutId>| id.and_then(|id| self.name_of(id)).map(str::to_string);
        let cuts = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                let counters = self.tally.get(CutId(index)).copied().unwrap_or_default();
                CutSummary {
                    name: node.cut.name().to_string(),
                    passes: counters.passes,
                    weighted_passes: counters.weighted_passes,
                    fails: counters.fails,
                    weighted_fails: counters.weighted_fails,
                    parent: name(node.parent),
                    fail: name(node.fail),
                    pass: name(node.pass),
                }
            })
            .collect();
        CutflowSummary::from_cuts_unchecked(cuts)
    }
}

// =============================================================================
// TESTS
// =============================================================================
