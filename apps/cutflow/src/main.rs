//! # Cutflow - Event Selection Runner
//!
//! The main binary for the Cutflow decision-graph engine.
//!
//! ## Usage
//!
//! ```bash
//! # Validate a config and show its cut tree
//! cutflow check -c analysis.toml
//!
//! # Run over events, writing table + summary into out/
//! cutflow run -c analysis.toml -i events.jsonl -o out
//!
//! # Render and combine summaries
//! cutflow report -s out -t tree
//! cutflow merge -o total.cflow out1/cutflow.cflow out2/cutflow.cflow
//! ```

use clap::Parser;
use cutflow::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // CUTFLOW_LOG_FORMAT=json switches to JSON log lines.
    let log_format = std::env::var("CUTFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "cutflow=debug,cutflow_core=debug"
    } else {
        "cutflow=info,cutflow_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("CUTFLOW_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so reports on stdout stay pipeable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Cutflow startup banner.
fn print_banner() {
    eprintln!(
        "cutflow v{} - deterministic event selection",
        env!("CARGO_PKG_VERSION")
    );
}
