//! # Cutflow Collections
//!
//! Named summaries of the same cut network, one per sample (signal, each
//! background, data). A collection keeps its samples in insertion order and
//! renders them side by side.

use crate::{CutflowError, CutflowSummary};

/// Summaries of one cut network, keyed by sample name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CutflowCollection {
    samples: Vec<(String, CutflowSummary)>,
}

impl CutflowCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection, checking every summary against the first.
    pub fn from_samples<I, S>(samples: I) -> Result<Self, CutflowError>
    where
        I: IntoIterator<Item = (S, CutflowSummary)>,
        S: Into<String>,
    {
        let mut collection = Self::new();
        for (name, summary) in samples {
            collection.insert(name, summary)?;
        }
        Ok(collection)
    }

    /// Add a sample.
    ///
    /// Fails with `DuplicateName` if the sample exists and with
    /// `InconsistentCutflows` if the network differs from the collection's.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        summary: CutflowSummary,
    ) -> Result<(), CutflowError> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(CutflowError::DuplicateName(name));
        }
        if let Some((first, existing)) = self.samples.first() {
            if !existing.same_network(&summary) {
                return Err(CutflowError::InconsistentCutflows(format!(
                    "sample '{}' differs from '{}'",
                    name, first
                )));
            }
        }
        self.samples.push((name, summary));
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|(sample, _)| sample == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CutflowSummary> {
        self.position(name).map(|i| &self.samples[i].1)
    }

    /// Sample names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.samples.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Take a sample out of the collection.
    pub fn remove(&mut self, name: &str) -> Option<CutflowSummary> {
        self.position(name).map(|i| self.samples.remove(i).1)
    }

    /// Sum of every sample.
    pub fn sum(&self) -> Result<CutflowSummary, CutflowError> {
        self.samples
            .iter()
            .try_fold(CutflowSummary::default(), |total, (_, summary)| {
                total.merge(summary)
            })
    }

    /// Combine two collections: samples present in both are summed, the
    /// rest are carried over, this collection's order first.
    pub fn merge(&self, other: &Self) -> Result<Self, CutflowError> {
        let mut merged = self.clone();
        for (name, theirs) in &other.samples {
            match merged.position(name) {
                Some(i) => {
                    let summed = merged.samples[i].1.merge(theirs)?;
                    merged.samples[i].1 = summed;
                }
                None => merged.insert(name.clone(), theirs.clone())?,
            }
        }
        Ok(merged)
    }

    /// Put the samples in the given order. `order` must name every sample
    /// exactly once.
    pub fn reorder(&mut self, order: &[&str]) -> Result<(), CutflowError> {
        if order.len() != self.samples.len() {
            return Err(CutflowError::InconsistentCutflows(format!(
                "order lists {} samples, collection has {}",
                order.len(),
                self.samples.len()
            )));
        }
        let mut remaining = std::mem::take(&mut self.samples);
        let mut ordered = Vec::with_capacity(remaining.len());
        for name in order {
            match remaining.iter().position(|(sample, _)| sample == name) {
                Some(i) => ordered.push(remaining.swap_remove(i)),
                None => {
                    // Restore what is left so a failed reorder loses nothing.
                    ordered.append(&mut remaining);
                    self.samples = ordered;
                    return Err(CutflowError::NotFound((*name).to_string()));
                }
            }
        }
        self.samples = ordered;
        Ok(())
    }

    /// Rename one sample in place.
    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> Result<(), CutflowError> {
        let to = to.into();
        let index = self
            .position(from)
            .ok_or_else(|| CutflowError::NotFound(from.to_string()))?;
        if from != to && self.position(&to).is_some() {
            return Err(CutflowError::DuplicateName(to));
        }
        self.samples[index].0 = to;
        Ok(())
    }

    /// Terminal cuts of the shared network, root by root.
    pub fn terminals(&self) -> Result<Vec<&str>, CutflowError> {
        let mut terminals = Vec::new();
        if let Some((_, first)) = self.samples.first() {
            for root in first.roots() {
                terminals.extend(first.terminals(&root.name)?);
            }
        }
        Ok(terminals)
    }

    /// Yield tables of every sample side by side, one column pair per
    /// sample, along the path down to `terminal`.
    ///
    /// ```text
    /// ,ttbar,,wjets,
    /// cut,raw_events,weighted_events,raw_events,weighted_events
    /// Bookkeeping,100,50.00,80,40.00
    /// ```
    pub fn csv(&self, terminal: &str) -> Result<String, CutflowError> {
        let mut columns = Vec::with_capacity(self.samples.len());
        for (name, summary) in &self.samples {
            columns.push((name, summary.yields(terminal)?));
        }
        let Some((_, first)) = columns.first() else {
            return Err(CutflowError::NotFound(terminal.to_string()));
        };

        let mut out = String::new();
        for (name, _) in &columns {
            out.push_str(&format!(",{},", name));
        }
        out.push_str("\ncut");
        for _ in &columns {
            out.push_str(",raw_events,weighted_events");
        }
        out.push('\n');

        // Same network, so every sample has the same path rows.
        for (row, (cut, _, _)) in first.iter().enumerate() {
            out.push_str(cut);
            for (_, yields) in &columns {
                if let Some((_, raw, weighted)) = yields.get(row) {
                    out.push_str(&format!(",{},{:.2}", raw, weighted));
                }
            }
            out.push('\n');
        }
        Ok(out)
    }
}
