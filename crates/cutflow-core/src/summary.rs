//! # Cutflow Summaries
//!
//! A `CutflowSummary` is the detached, serialisable result of a run: every
//! cut's counters plus its links, keyed by name. Summaries outlive the
//! closures of the `Cutflow` they came from, so they are what sinks persist,
//! what gets merged across workers or input files, and what gets rendered.
//!
//! ## Text Format (`.cflow`)
//!
//! One line per cut, comma separated:
//!
//! ```text
//! name,passes,weighted_passes,fails,weighted_fails,parent,fail,pass
//! ```
//!
//! Missing links are written as `null`. Floats use Rust's shortest
//! round-trip representation, so write -> read is exact.

use crate::{CutflowError, primitives};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters and links of one cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutSummary {
    pub name: String,
    pub passes: u64,
    pub weighted_passes: f64,
    pub fails: u64,
    pub weighted_fails: f64,
    pub parent: Option<String>,
    pub fail: Option<String>,
    pub pass: Option<String>,
}

impl CutSummary {
    /// Weighted pass fraction. `None` when nothing was counted.
    #[must_use]
    pub fn efficiency(&self) -> Option<f64> {
        let total = self.weighted_passes + self.weighted_fails;
        if total == 0.0 {
            return None;
        }
        Some(self.weighted_passes / total)
    }

    fn links(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.parent.as_deref(),
            self.fail.as_deref(),
            self.pass.as_deref(),
        )
    }
}

/// A validated cutflow snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CutSummary>", into = "Vec<CutSummary>")]
pub struct CutflowSummary {
    /// Cuts in registration order.
    cuts: Vec<CutSummary>,
    /// Name -> position in `cuts`
    index: BTreeMap<String, usize>,
}

impl TryFrom<Vec<CutSummary>> for CutflowSummary {
    type Error = CutflowError;

    fn try_from(cuts: Vec<CutSummary>) -> Result<Self, Self::Error> {
        Self::from_cuts(cuts)
    }
}

impl From<CutflowSummary> for Vec<CutSummary> {
    fn from(summary: CutflowSummary) -> Self {
        summary.cuts
    }
}

impl CutflowSummary {
    /// Build a summary, checking that the network is a forest with
    /// consistent parent/child links.
    pub fn from_cuts(cuts: Vec<CutSummary>) -> Result<Self, CutflowError> {
        let mut index = BTreeMap::new();
        for (position, cut) in cuts.iter().enumerate() {
            if index.insert(cut.name.clone(), position).is_some() {
                return Err(CutflowError::InvalidSummary(format!(
                    "duplicate cut '{}'",
                    cut.name
                )));
            }
        }
        let summary = Self { cuts, index };
        summary.validate()?;
        Ok(summary)
    }

    /// Build from cuts already known to be consistent.
    pub(crate) fn from_cuts_unchecked(cuts: Vec<CutSummary>) -> Self {
        let index = cuts
            .iter()
            .enumerate()
            .map(|(position, cut)| (cut.name.clone(), position))
            .collect();
        Self { cuts, index }
    }

    fn validate(&self) -> Result<(), CutflowError> {
        for cut in &self.cuts {
            if let Some(parent) = &cut.parent {
                let parent = self.lookup(parent)?;
                let parent_links = parent.fail.as_deref() == Some(cut.name.as_str())
                    || parent.pass.as_deref() == Some(cut.name.as_str());
                if !parent_links {
                    return Err(CutflowError::InvalidSummary(format!(
                        "'{}' names parent '{}' which does not link back",
                        cut.name, parent.name
                    )));
                }
            }
            for child in [&cut.fail, &cut.pass].into_iter().flatten() {
                let child = self.lookup(child)?;
                if child.parent.as_deref() != Some(cut.name.as_str()) {
                    return Err(CutflowError::InvalidSummary(format!(
                        "'{}' links to '{}' which has a different parent",
                        cut.name, child.name
                    )));
                }
            }
            if cut.fail.is_some() && cut.fail == cut.pass {
                return Err(CutflowError::InvalidSummary(format!(
                    "'{}' has the same child on both edges",
                    cut.name
                )));
            }
        }
        // Consistent links with a parent cycle would leave a component with
        // no root; every lineage must terminate within `len` steps.
        for cut in &self.cuts {
            let mut current = cut;
            let mut steps = 0usize;
            while let Some(parent) = &current.parent {
                steps = steps.saturating_add(1);
                if steps > self.cuts.len() {
                    return Err(CutflowError::InvalidSummary(format!(
                        "cycle through '{}'",
                        cut.name
                    )));
                }
                current = self.lookup(parent)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<&CutSummary, CutflowError> {
        self.get(name)
            .ok_or_else(|| CutflowError::InvalidSummary(format!("unknown cut '{}'", name)))
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// Cuts in registration order.
    #[must_use]
    pub fn cuts(&self) -> &[CutSummary] {
        &self.cuts
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CutSummary> {
        self.index.get(name).map(|&position| &self.cuts[position])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Parentless cuts, in registration order.
    #[must_use]
    pub fn roots(&self) -> Vec<&CutSummary> {
        self.cuts.iter().filter(|c| c.parent.is_none()).collect()
    }

    /// Childless cuts below `from`, pass subtree first.
    pub fn terminals(&self, from: &str) -> Result<Vec<&str>, CutflowError> {
        let mut terminals = Vec::new();
        let mut stack = vec![self.require(from)?];
        while let Some(cut) = stack.pop() {
            if cut.pass.is_none() && cut.fail.is_none() {
                terminals.push(cut.name.as_str());
            }
            for child in [&cut.fail, &cut.pass].into_iter().flatten() {
                stack.push(self.require(child)?);
            }
        }
        Ok(terminals)
    }

    /// Cuts from the root of `name`'s tree down to `name`, inclusive.
    pub fn lineage(&self, name: &str) -> Result<Vec<&CutSummary>, CutflowError> {
        let mut lineage = vec![self.require(name)?];
        while let Some(parent) = lineage.last().and_then(|c| c.parent.as_deref()) {
            lineage.push(self.require(parent)?);
        }
        lineage.reverse();
        Ok(lineage)
    }

    fn require(&self, name: &str) -> Result<&CutSummary, CutflowError> {
        self.get(name)
            .ok_or_else(|| CutflowError::NotFound(name.to_string()))
    }

    // -------------------------------------------------------------------------
    // Merging
    // -------------------------------------------------------------------------

    /// Check that both summaries describe the same cuts and links.
    #[must_use]
    pub fn same_network(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.cuts.iter().all(|cut| {
                other
                    .get(&cut.name)
                    .is_some_and(|theirs| theirs.links() == cut.links())
            })
    }

    /// Sum the counters of two summaries of the same network.
    ///
    /// An empty summary is the identity.
    pub fn merge(&self, other: &Self) -> Result<Self, CutflowError> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if !self.same_network(other) {
            return Err(CutflowError::InconsistentCutflows(
                "cut networks differ".to_string(),
            ));
        }
        let mut merged = self.clone();
        for cut in &mut merged.cuts {
            if let Some(theirs) = other.get(&cut.name) {
                cut.passes = cut.passes.saturating_add(theirs.passes);
                cut.fails = cut.fails.saturating_add(theirs.fails);
                cut.weighted_passes += theirs.weighted_passes;
                cut.weighted_fails += theirs.weighted_fails;
            }
        }
        Ok(merged)
    }

    /// Remove the counts of `other` from a summary of the same network,
    /// e.g. a control sample from a total.
    ///
    /// Subtracting an empty summary is the identity. Raw counts cannot go
    /// below zero; weighted counts may.
    pub fn subtract(&self, other: &Self) -> Result<Self, CutflowError> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if !self.same_network(other) {
            return Err(CutflowError::InconsistentCutflows(
                "cut networks differ".to_string(),
            ));
        }
        let mut diff = self.clone();
        for cut in &mut diff.cuts {
            if let Some(theirs) = other.get(&cut.name) {
                let name = cut.name.clone();
                let underflow = || {
                    CutflowError::InconsistentCutflows(format!(
                        "'{}' has fewer events than the summary subtracted from it",
                        name
                    ))
                };
                cut.passes = cut.passes.checked_sub(theirs.passes).ok_or_else(underflow)?;
                cut.fails = cut.fails.checked_sub(theirs.fails).ok_or_else(underflow)?;
                cut.weighted_passes -= theirs.weighted_passes;
                cut.weighted_fails -= theirs.weighted_fails;
            }
        }
        Ok(diff)
    }

    // -------------------------------------------------------------------------
    // Text format
    // -------------------------------------------------------------------------

    /// Render the `.cflow` text form.
    pub fn to_cflow(&self) -> Result<String, CutflowError> {
        let mut out = String::new();
        for cut in &self.cuts {
            if !is_cflow_safe(&cut.name) {
                return Err(CutflowError::SerializationError(format!(
                    "cut name '{}' cannot be written as cflow",
                    cut.name
                )));
            }
            let link = |l: &Option<String>| l.as_deref().unwrap_or(primitives::CFLOW_NULL).to_string();
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                cut.name,
                cut.passes,
                cut.weighted_passes,
                cut.fails,
                cut.weighted_fails,
                link(&cut.parent),
                link(&cut.fail),
                link(&cut.pass),
            ));
        }
        Ok(out)
    }

    /// Parse the `.cflow` text form.
    pub fn from_cflow(text: &str) -> Result<Self, CutflowError> {
        let mut cuts = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let invalid = |what: &str| {
                CutflowError::InvalidSummary(format!("line {}: {}", line_no + 1, what))
            };
            let fields: Vec<&str> = line.split(primitives::CFLOW_DELIMITER).collect();
            if fields.len() != 8 {
                return Err(invalid(&format!("expected 8 fields, found {}", fields.len())));
            }
            let link = |field: &str| {
                (field != primitives::CFLOW_NULL).then(|| field.to_string())
            };
            cuts.push(CutSummary {
                name: fields[0].to_string(),
                passes: fields[1].parse().map_err(|_| invalid("bad pass count"))?,
                weighted_passes: fields[2].parse().map_err(|_| invalid("bad pass weight"))?,
                fails: fields[3].parse().map_err(|_| invalid("bad fail count"))?,
                weighted_fails: fields[4].parse().map_err(|_| invalid("bad fail weight"))?,
                parent: link(fields[5]),
                fail: link(fields[6]),
                pass: link(fields[7]),
            });
        }
        Self::from_cuts(cuts)
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// `(cut, raw, weighted)` along the path from the root down to
    /// `terminal`.
    ///
    /// Each cut reports the counts of the edge the path takes out of it; the
    /// terminal itself reports its passes.
    pub fn yields(&self, terminal: &str) -> Result<Vec<(&str, u64, f64)>, CutflowError> {
        let lineage = self.lineage(terminal)?;
        let mut rows = Vec::with_capacity(lineage.len());
        for (i, cut) in lineage.iter().enumerate() {
            let leaves_via_fail = lineage
                .get(i + 1)
                .is_some_and(|next| cut.fail.as_deref() == Some(next.name.as_str()));
            let (raw, weighted) = if leaves_via_fail {
                (cut.fails, cut.weighted_fails)
            } else {
                (cut.passes, cut.weighted_passes)
            };
            rows.push((cut.name.as_str(), raw, weighted));
        }
        Ok(rows)
    }

    /// Yield table along the path from the root down to `terminal`, as CSV.
    pub fn csv(&self, terminal: &str) -> Result<String, CutflowError> {
        let mut out = String::from("cut,raw_events,weighted_events\n");
        for (name, raw, weighted) in self.yields(terminal)? {
            out.push_str(&format!("{},{},{:.2}\n", name, raw, weighted));
        }
        Ok(out)
    }

    /// Mermaid flowchart of the tree rooted at `root`.
    pub fn mermaid(&self, root: &str, orientation: &str) -> Result<String, CutflowError> {
        let mut out = format!("graph {}\n", orientation);
        let mut stack = vec![self.require(root)?];
        while let Some(cut) = stack.pop() {
            let name = &cut.name;
            match cut.parent.as_deref().map(|p| self.require(p)).transpose()? {
                None => out.push_str(&format!("    {name}([\"{name} <br/> (root node)\"])\n")),
                Some(parent) if parent.fail.as_deref() == Some(name.as_str()) => {
                    out.push_str(&format!("    {}Fail --> {name}{{{name}}}\n", parent.name));
                }
                Some(parent) => {
                    out.push_str(&format!("    {}Pass --> {name}{{{name}}}\n", parent.name));
                }
            }
            out.push_str(&format!(
                "    {name} -- Fail --> {name}Fail[/{} raw <br/> {:.2} wgt/]\n",
                cut.fails, cut.weighted_fails
            ));
            out.push_str(&format!(
                "    {name} -- Pass --> {name}Pass[/{} raw <br/> {:.2} wgt/]\n",
                cut.passes, cut.weighted_passes
            ));
            for child in [&cut.pass, &cut.fail].into_iter().flatten() {
                stack.push(self.require(child)?);
            }
        }
        Ok(out)
    }

    /// Indented tree of the cuts below `root`, fail branch first.
    ///
    /// Fail children are marked `☒`, pass children `☑`. The pass child is
    /// drawn last so its `└` closes each box; this is the reverse of the
    /// pass-first row order of `Cutflow::report` and `terminals`.
    pub fn tree(&self, root: &str) -> Result<String, CutflowError> {
        let mut out = String::new();
        let mut stack = vec![(self.require(root)?, String::new(), String::new())];
        while let Some((cut, prefix, tabs)) = stack.pop() {
            out.push_str(&format!("{prefix}{}\n", cut.name));
            out.push_str(&format!(
                "{tabs}pass: {} (raw) {:.2} (wgt)\n",
                cut.passes, cut.weighted_passes
            ));
            out.push_str(&format!(
                "{tabs}fail: {} (raw) {:.2} (wgt)\n",
                cut.fails, cut.weighted_fails
            ));
            if let Some(pass) = &cut.pass {
                stack.push((
                    self.require(pass)?,
                    format!("{tabs}\u{2514}\u{2611}\u{2500}"),
                    format!("{tabs}    "),
                ));
            }
            if let Some(fail) = &cut.fail {
                let (branch, indent) = if cut.pass.is_some() {
                    ("\u{251C}", "\u{2502}   ")
                } else {
                    ("\u{2514}", "    ")
                };
                stack.push((
                    self.require(fail)?,
                    format!("{tabs}{branch}\u{2612}\u{2500}"),
                    format!("{tabs}{indent}"),
                ));
            }
        }
        Ok(out)
    }
}

/// Whether `name` survives a `.cflow` round trip.
pub(crate) fn is_cflow_safe(name: &str) -> bool {
    !name.is_empty()
        && name != primitives::CFLOW_NULL
        && !name.contains(primitives::CFLOW_DELIMITER)
        && !name.contains(['\n', '\r'])
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cut(name: &str, passes: u64, fails: u64, links: [Option<&str>; 3]) -> CutSummary {
        let [parent, fail, pass] = links.map(|l| l.map(str::to_string));
        CutSummary {
            name: name.to_string(),
            passes,
            weighted_passes: passes as f64 * 0.5,
            fails,
            weighted_fails: fails as f64 * 0.5,
            parent,
            fail,
            pass,
        }
    }

    /// Bookkeeping -pass-> Has1Lep -pass-> Geq1FatJet
    ///                       -fail-> Has2Leps
    fn sample() -> CutflowSummary {
        CutflowSummary::from_cuts(vec![
            cut("Bookkeeping", 100, 0, [None, None, Some("Has1Lep")]),
            cut(
                "Has1Lep",
                40,
                60,
                [Some("Bookkeeping"), Some("Has2Leps"), Some("Geq1FatJet")],
            ),
            cut("Geq1FatJet", 10, 30, [Some("Has1Lep"), None, None]),
            cut("Has2Leps", 20, 40, [Some("Has1Lep"), None, None]),
        ])
        .expect("valid summary")
    }

    #[test]
    fn cflow_text_roundtrip() {
        let summary = sample();
        let text = summary.to_cflow().expect("write");
        assert!(text.starts_with("Bookkeeping,100,50,0,0,null,null,Has1Lep\n"));

        let parsed = CutflowSummary::from_cflow(&text).expect("parse");
        assert_eq!(parsed, summary);
    }

    #[test]
    fn malformed_cflow_rejected() {
        let result = CutflowSummary::from_cflow("A,1,1.0,0\n");
        assert!(matches!(result, Err(CutflowError::InvalidSummary(msg)) if msg.contains("line 1")));

        let dangling = "A,1,1,0,0,null,null,B\n";
        assert!(CutflowSummary::from_cflow(dangling).is_err());
    }

    #[test]
    fn inconsistent_links_rejected() {
        let result = CutflowSummary::from_cuts(vec![
            cut("A", 1, 0, [None, None, Some("B")]),
            cut("B", 1, 0, [None, None, None]),
        ]);
        assert!(matches!(result, Err(CutflowError::InvalidSummary(_))));
    }

    #[test]
    fn parent_cycle_rejected() {
        let result = CutflowSummary::from_cuts(vec![
            cut("A", 1, 0, [Some("B"), None, Some("B")]),
            cut("B", 1, 0, [Some("A"), None, Some("A")]),
        ]);
        assert!(matches!(result, Err(CutflowError::InvalidSummary(msg)) if msg.contains("cycle")));
    }

    #[test]
    fn merge_sums_counters() {
        let summary = sample();
        let merged = summary.merge(&summary).expect("merge");
        let has1lep = merged.get("Has1Lep").expect("cut");
        assert_eq!(has1lep.passes, 80);
        assert_eq!(has1lep.fails, 120);
        assert_eq!(has1lep.weighted_passes, 40.0);

        let empty = CutflowSummary::default();
        assert_eq!(empty.merge(&summary).expect("merge"), summary);
    }

    #[test]
    fn merge_requires_same_network() {
        let other = CutflowSummary::from_cuts(vec![cut("Bookkeeping", 1, 0, [None, None, None])])
            .expect("valid");
        assert!(matches!(
            sample().merge(&other),
            Err(CutflowError::InconsistentCutflows(_))
        ));
    }

    #[test]
    fn subtract_removes_counts() {
        let total = sample().merge(&sample()).expect("merge");
        let diff = total.subtract(&sample()).expect("subtract");
        assert_eq!(diff, sample());

        assert_eq!(
            sample().subtract(&CutflowSummary::default()).expect("subtract"),
            sample()
        );
    }

    #[test]
    fn subtract_rejects_underflow_and_other_networks() {
        let total = sample().merge(&sample()).expect("merge");
        assert!(matches!(
            sample().subtract(&total),
            Err(CutflowError::InconsistentCutflows(msg)) if msg.contains("Bookkeeping")
        ));

        let other = CutflowSummary::from_cuts(vec![cut("Bookkeeping", 1, 0, [None, None, None])])
            .expect("valid");
        assert!(matches!(
            sample().subtract(&other),
            Err(CutflowError::InconsistentCutflows(_))
        ));
    }

    #[test]
    fn terminals_pass_first() {
        let summary = sample();
        assert_eq!(
            summary.terminals("Bookkeeping").expect("terminals"),
            ["Geq1FatJet", "Has2Leps"]
        );
    }

    #[test]
    fn csv_follows_path_edges() {
        let summary = sample();
        let csv = summary.csv("Has2Leps").expect("csv");
        assert_eq!(
            csv,
            "cut,raw_events,weighted_events\n\
             Bookkeeping,100,50.00\n\
             Has1Lep,60,30.00\n\
             Has2Leps,20,10.00\n"
        );
    }

    #[test]
    fn tree_marks_edges() {
        let tree = sample().tree("Bookkeeping").expect("tree");
        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(lines[0], "Bookkeeping");
        assert_eq!(lines[1], "pass: 100 (raw) 50.00 (wgt)");
        assert_eq!(lines[3], "\u{2514}\u{2611}\u{2500}Has1Lep");
        assert_eq!(lines[6], "    \u{251C}\u{2612}\u{2500}Has2Leps");
        assert_eq!(lines[9], "    \u{2514}\u{2611}\u{2500}Geq1FatJet");
    }

    #[test]
    fn mermaid_names_every_cut() {
        let chart = sample().mermaid("Bookkeeping", "TD").expect("mermaid");
        assert!(chart.starts_with("graph TD\n"));
        assert!(chart.contains("Bookkeeping([\"Bookkeeping <br/> (root node)\"])"));
        assert!(chart.contains("Has1LepFail --> Has2Leps{Has2Leps}"));
        assert!(chart.contains("BookkeepingPass --> Has1Lep{Has1Lep}"));
    }

    #[test]
    fn efficiency_uses_weights() {
        let summary = sample();
        let has1lep = summary.get("Has1Lep").expect("cut");
        assert_eq!(has1lep.efficiency(), Some(0.4));
    }
}
