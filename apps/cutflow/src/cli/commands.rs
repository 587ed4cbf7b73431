//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::{ReportFormat, SinkKind};
use crate::config::AnalysisConfig;
use crate::input::{JsonLines, load_event};
use cutflow_core::formats::summary_crypto_hash;
use cutflow_core::primitives::MAGIC_BYTES;
use cutflow_core::sink::SUMMARY_FILE;
use cutflow_core::{
    CutflowCollection, CutflowError, CutflowSummary, FileSink, Looper, OutputSink, RedbSink, summary_from_bytes,
    summary_to_bytes,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of an analysis config (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum size of a summary file (100 MB).
///
/// Summaries hold one line per cut; anything larger is not a summary.
const MAX_SUMMARY_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CutflowError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CutflowError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(CutflowError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an existing input file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CutflowError> {
    let canonical = path.canonicalize().map_err(|e| {
        CutflowError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(CutflowError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn load_config(path: &Path) -> Result<AnalysisConfig, CutflowError> {
    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_CONFIG_FILE_SIZE)?;
    AnalysisConfig::from_file(&path)
}

/// Load a summary from a `.cflow` or `.bin` file, a `FileSink` directory,
/// or a `.redb` database.
pub fn load_summary(path: &Path) -> Result<CutflowSummary, CutflowError> {
    if path.is_dir() {
        return load_summary(&path.join(SUMMARY_FILE));
    }
    if path.extension().is_some_and(|ext| ext == "redb") {
        return RedbSink::open(path)?.read_summary()?.ok_or_else(|| {
            CutflowError::NotFound(format!("summary in {}", path.display()))
        });
    }

    let path = validate_file_path(path)?;
    validate_file_size(&path, MAX_SUMMARY_FILE_SIZE)?;
    let data = std::fs::read(&path)
        .map_err(|e| CutflowError::IoError(format!("Read file: {}", e)))?;

    if data.starts_with(MAGIC_BYTES) {
        summary_from_bytes(&data)
    } else {
        let text = String::from_utf8(data)
            .map_err(|e| CutflowError::DeserializationError(e.to_string()))?;
        CutflowSummary::from_cflow(&text)
    }
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Arguments of `cutflow run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub sink: SinkKind,
    pub max_events: Option<u64>,
    pub batch_size: Option<usize>,
    pub skip_unreadable: bool,
    pub json_mode: bool,
}

/// Run an analysis over an event file.
pub fn cmd_run(options: &RunOptions) -> Result<(), CutflowError> {
    let config = load_config(&options.config)?;
    let mut analysis = config.build()?;

    let mut looper_config = config.looper_config();
    if options.max_events.is_some() {
        looper_config.max_events = options.max_events;
    }
    if let Some(batch_size) = options.batch_size {
        looper_config.batch_size = batch_size;
    }
    looper_config.skip_unreadable |= options.skip_unreadable;

    tracing::info!("Running {:?} over {:?}", options.config, options.input);

    let input = validate_file_path(&options.input)?;
    let events = JsonLines::open(&input)?;
    let mut sink: Box<dyn OutputSink> = match options.sink {
        SinkKind::Files => Box::new(FileSink::create(&options.output)?),
        SinkKind::Redb => Box::new(RedbSink::open(&options.output)?),
    };

    let stats = Looper::new(looper_config).run(&mut analysis, events, load_event, sink.as_mut())?;

    if options.json_mode {
        print_json(&serde_json::json!({
            "output": options.output.to_string_lossy(),
            "processed": stats.processed,
            "accepted": stats.accepted,
            "rejected": stats.rejected(),
            "skipped": stats.skipped,
            "accepted_weight": stats.accepted_weight,
        }));
        return Ok(());
    }

    println!("Processed: {}", stats.processed);
    println!("Accepted:  {} (weight {:.4})", stats.accepted, stats.accepted_weight);
    println!("Rejected:  {}", stats.rejected());
    if stats.skipped > 0 {
        println!("Skipped:   {}", stats.skipped);
    }
    println!("Output:    {:?}", options.output);
    println!();
    print!("{}", analysis.cutflow.summary().tree(&config.entry)?);

    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Validate a config and show the cut tree it builds.
pub fn cmd_check(config_path: &Path, json_mode: bool) -> Result<(), CutflowError> {
    let config = load_config(config_path)?;
    let analysis = config.build()?;
    let summary = analysis.cutflow.summary();

    if json_mode {
        let cuts: Vec<_> = summary
            .cuts()
            .iter()
            .map(|cut| {
                serde_json::json!({
                    "name": cut.name,
                    "parent": cut.parent,
                    "pass": cut.pass,
                    "fail": cut.fail,
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "entry": config.entry,
            "variables": analysis.variables.names(),
            "columns": analysis.records.names(),
            "cuts": cuts,
        }));
        return Ok(());
    }

    println!("Entry:     {}", config.entry);
    println!("Variables: {}", analysis.variables.len());
    println!("Columns:   {}", analysis.records.len());
    println!("Cuts:      {}", analysis.cutflow.len());
    for root in summary.roots() {
        println!();
        print!("{}", summary.tree(&root.name)?);
    }
    Ok(())
}

// =============================================================================
// REPORT COMMAND
// =============================================================================

/// Render summaries in the requested format.
///
/// Several summaries are summed, except for `csv`, which puts them side by
/// side with one column pair per sample.
pub fn cmd_report(
    summary_paths: &[PathBuf],
    format: ReportFormat,
    root: Option<&str>,
    terminal: Option<&str>,
    orientation: &str,
) -> Result<(), CutflowError> {
    let collection = load_collection(summary_paths)?;
    let summary = collection.sum()?;
    let roots: Vec<String> = match root {
        Some(root) => vec![root.to_string()],
        None => summary.roots().iter().map(|cut| cut.name.clone()).collect(),
    };

    match format {
        ReportFormat::Table => {
            println!(
                "{:<24} {:>10} {:>14} {:>10} {:>14} {:>8}",
                "cut", "passes", "w_passes", "fails", "w_fails", "eff"
            );
            for cut in summary.cuts() {
                let efficiency = cut
                    .efficiency()
                    .map(|e| format!("{:.4}", e))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<24} {:>10} {:>14.2} {:>10} {:>14.2} {:>8}",
                    cut.name,
                    cut.passes,
                    cut.weighted_passes,
                    cut.fails,
                    cut.weighted_fails,
                    efficiency
                );
            }
        }
        ReportFormat::Tree => {
            for root in &roots {
                print!("{}", summary.tree(root)?);
            }
        }
        ReportFormat::Csv => {
            let terminals: Vec<String> = match terminal {
                Some(terminal) => vec![terminal.to_string()],
                None => {
                    let mut all = Vec::new();
                    for root in &roots {
                        all.extend(summary.terminals(root)?.into_iter().map(str::to_string));
                    }
                    all
                }
            };
            for (i, terminal) in terminals.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                if collection.len() > 1 {
                    print!("{}", collection.csv(terminal)?);
                } else {
                    print!("{}", summary.csv(terminal)?);
                }
            }
        }
        ReportFormat::Mermaid => {
            for root in &roots {
                print!("{}", summary.mermaid(root, orientation)?);
            }
        }
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| CutflowError::SerializationError(e.to_string()))?;
            println!("{}", json);
        }
    }
    Ok(())
}

// =============================================================================
// MERGE COMMAND
// =============================================================================

/// Sample name of a summary path: the directory name for an output
/// directory, the file stem otherwise.
#[must_use]
pub fn sample_name(path: &Path) -> String {
    let name = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load summaries as a collection named by [`sample_name`].
pub fn load_collection(paths: &[PathBuf]) -> Result<CutflowCollection, CutflowError> {
    let mut collection = CutflowCollection::new();
    for path in paths {
        let summary = load_summary(path)?;
        collection
            .insert(sample_name(path), summary)
            .map_err(|e| with_path(path, e))?;
    }
    Ok(collection)
}

fn with_path(path: &Path, error: CutflowError) -> CutflowError {
    match error {
        CutflowError::InconsistentCutflows(reason) => {
            CutflowError::InconsistentCutflows(format!("{}: {}", path.display(), reason))
        }
        other => other,
    }
}

/// Merge summaries, take away the `subtract` ones, and write the result.
pub fn cmd_merge(
    inputs: &[PathBuf],
    subtract: &[PathBuf],
    output: &Path,
    json_mode: bool,
) -> Result<(), CutflowError> {
    let mut merged = CutflowSummary::default();
    for input in inputs {
        let summary = load_summary(input)?;
        merged = merged.merge(&summary).map_err(|e| with_path(input, e))?;
        tracing::debug!("Merged {:?}", input);
    }
    for path in subtract {
        let summary = load_summary(path)?;
        merged = merged.subtract(&summary).map_err(|e| with_path(path, e))?;
        tracing::debug!("Subtracted {:?}", path);
    }

    let data = if output.extension().is_some_and(|ext| ext == "bin") {
        summary_to_bytes(&merged)?
    } else {
        merged.to_cflow()?.into_bytes()
    };
    std::fs::write(output, &data)
        .map_err(|e| CutflowError::IoError(format!("Write file: {}", e)))?;

    if json_mode {
        print_json(&serde_json::json!({
            "inputs": inputs.len(),
            "subtracted": subtract.len(),
            "cuts": merged.len(),
            "output": output.to_string_lossy(),
        }));
    } else {
        println!(
            "Merged {} summaries ({} cuts) into {:?}",
            inputs.len(),
            merged.len(),
            output
        );
        if !subtract.is_empty() {
            println!("Subtracted {} summaries", subtract.len());
        }
    }
    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Compute BLAKE3 hash of a summary's persisted form.
pub fn cmd_hash(summary_path: &Path, json_mode: bool) -> Result<(), CutflowError> {
    let summary = load_summary(summary_path)?;
    let hash = summary_crypto_hash(&summary)?;

    if json_mode {
        print_json(&serde_json::json!({
            "hash": hash,
            "algorithm": "BLAKE3",
            "cuts": summary.len(),
        }));
    } else {
        println!("BLAKE3 Hash: {}", hash);
        println!("Cuts: {}", summary.len());
    }
    Ok(())
}
