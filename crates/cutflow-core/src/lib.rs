//! # cutflow-core
//!
//! The deterministic selection engine for Cutflow - THE LOGIC.
//!
//! This crate implements a decision graph ("cutflow") for event selection:
//! every event is routed along exactly one root-to-terminal path of named
//! cuts, accumulating a statistical weight, while each cut keeps cumulative
//! visit/pass counters for the final cutflow table.
//!
//! ## Layout
//!
//! - `types`: values, tags and the error enum
//! - `store`: per-event `VariableStore` and output `RecordStore`
//! - `cut` / `graph`: the decision nodes and the `Cutflow` that owns them
//! - `summary`: detached, mergeable cutflow snapshots and their renderings
//! - `collection`: per-sample summaries of one network, side by side
//! - `looper`: the event loop feeding events through an `Analysis`
//! - `formats`, `sink`, `storage`: persistence of tables and summaries
//!
//! ## Architectural Constraints
//!
//! - Per-event state lives only in the two stores, never in globals
//! - A graph whose construction failed is poisoned and refuses to run
//! - Faults propagate; they are never downgraded to "rejected"
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod collection;
pub mod cut;
pub mod formats;
pub mod graph;
pub mod looper;
pub mod primitives;
pub mod sink;
pub mod storage;
pub mod store;
pub mod summary;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CutId, CutflowError, Edge, FailRoute, FourVector, SlotType, Value, ValueKind, Verdict,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use collection::CutflowCollection;
pub use cut::{Cut, CutCounters, Predicate, SideEffect, WeightFn};
pub use graph::{Cutflow, CutflowRow, Outcome, Tally};
pub use looper::{Analysis, LoopStats, Looper, LooperConfig};
pub use store::{Column, RecordStore, RecordTable, Row, VariableStore};
pub use summary::{CutSummary, CutflowSummary};

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use formats::{
    PersistenceHeader, summary_from_bytes, summary_to_bytes, table_from_bytes, table_to_bytes,
};
pub use sink::{FileSink, MemorySink, OutputSink};
pub use storage::RedbSink;
