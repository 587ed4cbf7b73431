//! # Persistent Storage
//!
//! Disk-backed output sinks.

pub mod redb_sink;

pub use redb_sink::RedbSink;
