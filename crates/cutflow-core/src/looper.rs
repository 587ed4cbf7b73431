//! # Event Loop
//!
//! Drives a configured `Cutflow` over a stream of events:
//!
//! 1. reset both stores,
//! 2. let the loader publish the event into the stores,
//! 3. traverse from the entry cut,
//! 4. flush a record row if the event was accepted.
//!
//! Accepted rows are handed to an `OutputSink` in batches; at the end the
//! table is finalized and the cutflow summary written. A traversal is never
//! interrupted: `max_events` is only checked between events.

use crate::sink::OutputSink;
use crate::{CutflowError, Cutflow, Outcome, RecordStore, VariableStore, primitives};
use serde::{Deserialize, Serialize};

// =============================================================================
// ANALYSIS
// =============================================================================

/// A cutflow together with the stores it runs on.
#[derive(Debug, Default)]
pub struct Analysis {
    pub cutflow: Cutflow,
    pub variables: VariableStore,
    pub records: RecordStore,
}

impl Analysis {
    #[must_use]
    pub fn new(cutflow: Cutflow, variables: VariableStore, records: RecordStore) -> Self {
        Self {
            cutflow,
            variables,
            records,
        }
    }

    /// Restore both stores to their defaults before the next event.
    pub fn reset(&mut self) {
        self.variables.reset_all();
        self.records.reset_all();
    }

    /// Traverse from `entry` and flush a row if the event is accepted.
    ///
    /// Assumes the stores were reset and loaded for this event.
    pub fn process(&mut self, entry: &str) -> Result<Outcome, CutflowError> {
        let outcome = self
            .cutflow
            .run(entry, &mut self.variables, &mut self.records)?;
        if outcome.is_accepted() {
            self.records.flush_row()?;
        }
        Ok(outcome)
    }
}

// =============================================================================
// LOOPER
// =============================================================================

/// Event loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LooperConfig {
    /// Name of the cut every traversal starts from.
    pub entry: String,
    /// Stop after this many events (debug runs).
    pub max_events: Option<u64>,
    /// Log progress every N events; 0 disables progress lines.
    pub progress_every: u64,
    /// Accepted rows buffered before a sink write.
    pub batch_size: usize,
    /// Skip events the input fails to produce instead of aborting.
    pub skip_unreadable: bool,
}

impl LooperConfig {
    #[must_use]
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            max_events: None,
            progress_every: primitives::DEFAULT_PROGRESS_EVERY,
            batch_size: primitives::DEFAULT_BATCH_SIZE,
            skip_unreadable: false,
        }
    }

    #[must_use]
    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_progress_every(mut self, progress_every: u64) -> Self {
        self.progress_every = progress_every;
        self
    }

    #[must_use]
    pub fn skipping_unreadable(mut self) -> Self {
        self.skip_unreadable = true;
        self
    }
}

/// Totals of one loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStats {
    /// Events traversed.
    pub processed: u64,
    pub accepted: u64,
    /// Sum of event weights over accepted events.
    pub accepted_weight: f64,
    /// Unreadable input records passed over.
    pub skipped: u64,
}

impl LoopStats {
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.processed.saturating_sub(self.accepted)
    }
}

/// Runs an `Analysis` over an event stream.
#[derive(Debug, Clone)]
pub struct Looper {
    config: LooperConfig,
}

impl Looper {
    #[must_use]
    pub fn new(config: LooperConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &LooperConfig {
        &self.config
    }

    /// Process `events`, then finalize the table and write everything to
    /// `sink`.
    ///
    /// `load` publishes one event into the freshly reset stores. Any error
    /// from loading, traversal or the sink aborts the run; input errors are
    /// skipped only when `skip_unreadable` is set.
    pub fn run<E, I, L>(
        &self,
        analysis: &mut Analysis,
        events: I,
        mut load: L,
        sink: &mut dyn OutputSink,
    ) -> Result<LoopStats, CutflowError>
    where
        I: IntoIterator<Item = Result<E, CutflowError>>,
        L: FnMut(&E, &mut VariableStore, &mut RecordStore) -> Result<(), CutflowError>,
    {
        let entry = self.config.entry.as_str();
        analysis.cutflow.ensure_runnable()?;
        analysis.cutflow.id(entry)?;

        let mut stats = LoopStats::default();
        let mut batches_written = 0usize;
        tracing::info!(entry, max_events = ?self.config.max_events, "event loop started");

        for event in events {
            if self
                .config
                .max_events
                .is_some_and(|max| stats.processed >= max)
            {
                tracing::info!(processed = stats.processed, "max events reached");
                break;
            }

            let event = match event {
                Ok(event) => event,
                Err(e) if self.config.skip_unreadable => {
                    tracing::warn!(error = %e, "skipping unreadable event");
                    stats.skipped = stats.skipped.saturating_add(1);
                    continue;
                }
                Err(e) => return Err(e),
            };

            analysis.reset();
            load(&event, &mut analysis.variables, &mut analysis.records)?;
            let outcome = analysis.process(entry)?;

            stats.processed = stats.processed.saturating_add(1);
            if outcome.is_accepted() {
                stats.accepted = stats.accepted.saturating_add(1);
                stats.accepted_weight += outcome.weight;
            }

            if self.config.batch_size > 0 && analysis.records.pending_rows() >= self.config.batch_size
            {
                sink.write_table(&analysis.records.drain_table())?;
                batches_written = batches_written.saturating_add(1);
            }

            if self.config.progress_every > 0 && stats.processed % self.config.progress_every == 0 {
                tracing::info!(
                    processed = stats.processed,
                    accepted = stats.accepted,
                    "progress"
                );
            }
        }

        analysis.records.finalize();
        let rest = analysis.records.drain_table();
        if !rest.is_empty() || batches_written == 0 {
            sink.write_table(&rest)?;
        }
        // The table is closed even when the summary cannot be written.
        let summary = sink.write_summary(&analysis.cutflow.summary());
        sink.finish()?;
        summary?;

        tracing::info!(
            processed = stats.processed,
            accepted = stats.accepted,
            skipped = stats.skipped,
            rows = analysis.records.total_rows(),
            "event loop finished"
        );
        Ok(stats)
    }
}

// =============================================================================
// TESTS
// =============================================================================
