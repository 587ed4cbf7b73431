//! # Cutflow CLI Module
//!
//! This module implements the CLI interface for Cutflow.
//!
//! ## Available Commands
//!
//! - `run` - Run an analysis over a JSON-lines event file
//! - `check` - Validate an analysis config and print its cut tree
//! - `report` - Render a stored cutflow summary
//! - `merge` - Sum summaries of the same cut network, optionally subtracting some
//! - `hash` - Compute BLAKE3 cryptographic hash of a summary

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use cutflow_core::CutflowError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Cutflow - event selection runner
///
/// Routes every event through a tree of named cuts and reports how many
/// events, raw and weighted, survive each one.
#[derive(Parser, Debug)]
#[command(name = "cutflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Where `run` writes its table and summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// A directory with table.bin, cutflow.cflow and cutflow.bin
    Files,
    /// A redb database file
    Redb,
}

/// How `report` renders a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// One line per cut with counts and efficiency
    Table,
    /// Indented pass/fail tree
    Tree,
    /// Yield table along the path to a terminal cut
    Csv,
    /// Mermaid flowchart
    Mermaid,
    /// The summary as JSON
    Json,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an analysis over an event file
    Run {
        /// Path to the TOML analysis config
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the JSON-lines event file
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory (files) or database path (redb)
        #[arg(short, long)]
        output: PathBuf,

        /// Output sink
        #[arg(short, long, value_enum, default_value = "files")]
        sink: SinkKind,

        /// Stop after this many events
        #[arg(short = 'n', long)]
        max_events: Option<u64>,

        /// Accepted rows buffered before each sink write
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip input lines that cannot be parsed
        #[arg(long)]
        skip_unreadable: bool,
    },

    /// Validate an analysis config and print its cut tree
    Check {
        /// Path to the TOML analysis config
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Render stored summaries (.cflow, .bin, output directory or .redb)
    Report {
        /// Path to a summary; repeat for one csv column pair per sample
        #[arg(short, long, required = true)]
        summary: Vec<PathBuf>,

        /// Output format
        #[arg(short = 't', long, value_enum, default_value = "table")]
        format: ReportFormat,

        /// Root cut to render from (default: every root)
        #[arg(short, long)]
        root: Option<String>,

        /// Terminal cut for the csv format (default: every terminal)
        #[arg(long)]
        terminal: Option<String>,

        /// Mermaid orientation (TD, LR, ...)
        #[arg(long, default_value = "TD")]
        orientation: String,
    },

    /// Sum summaries of the same cut network
    Merge {
        /// Output path (.bin for binary, anything else for .cflow text)
        #[arg(short, long)]
        output: PathBuf,

        /// Summaries to subtract from the merged total
        #[arg(long)]
        subtract: Vec<PathBuf>,

        /// Summaries to merge
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Compute BLAKE3 cryptographic hash of a summary
    Hash {
        /// Path to the summary
        #[arg(short, long)]
        summary: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), CutflowError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Run {
            config,
            input,
            output,
            sink,
            max_events,
            batch_size,
            skip_unreadable,
        } => cmd_run(&RunOptions {
            config,
            input,
            output,
            sink,
            max_events,
            batch_size,
            skip_unreadable,
            json_mode,
        }),
        Commands::Check { config } => cmd_check(&config, json_mode),
        Commands::Report {
            summary,
            format,
            root,
            terminal,
            orientation,
        } => cmd_report(
            &summary,
            format,
            root.as_deref(),
            terminal.as_deref(),
            &orientation,
        ),
        Commands::Merge {
            output,
            subtract,
            inputs,
        } => cmd_merge(&inputs, &subtract, &output, json_mode),
        Commands::Hash { summary } => cmd_hash(&summary, json_mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "cutflow", "--json-mode", "run", "-c", "a.toml", "-i", "e.jsonl", "-o", "out",
            "--sink", "redb", "-n", "100",
        ])
        .expect("parse");

        assert!(cli.json_mode);
        match cli.command {
            Commands::Run {
                sink, max_events, ..
            } => {
                assert_eq!(sink, SinkKind::Redb);
                assert_eq!(max_events, Some(100));
            }
            other => unreachable!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn merge_requires_inputs() {
        assert!(Cli::try_parse_from(["cutflow", "merge", "-o", "all.cflow"]).is_err());
    }

    #[test]
    fn merge_takes_subtracted_summaries() {
        let cli = Cli::try_parse_from([
            "cutflow", "merge", "-o", "net.cflow", "--subtract", "bkg.cflow", "all.cflow",
        ])
        .expect("parse");

        match cli.command {
            Commands::Merge {
                subtract, inputs, ..
            } => {
                assert_eq!(subtract, [PathBuf::from("bkg.cflow")]);
                assert_eq!(inputs, [PathBuf::from("all.cflow")]);
            }
            other => unreachable!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn report_repeats_summary() {
        let cli = Cli::try_parse_from([
            "cutflow", "report", "-s", "ttbar.cflow", "-s", "wjets", "-t", "csv",
        ])
        .expect("parse");

        match cli.command {
            Commands::Report {
                summary, format, ..
            } => {
                assert_eq!(summary.len(), 2);
                assert_eq!(format, ReportFormat::Csv);
            }
            other => unreachable!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["cutflow", "report"]).is_err());
    }
}
