//! # Cutflow - Application Library
//!
//! The pieces of the `cutflow` binary that sit between the command line and
//! `cutflow-core`: the TOML analysis config, the JSON-lines event reader and
//! the CLI commands. Exposed as a library so they can be tested directly.

pub mod cli;
pub mod config;
pub mod input;

pub use config::AnalysisConfig;
pub use input::{Event, JsonLines, load_event};
