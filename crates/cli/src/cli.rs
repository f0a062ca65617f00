use std::path::PathBuf;

use clap::Parser;

/// Run a demo ingest -> hash -> sink pipeline on the wiring framework.
///
/// Pumps a stream of numbered records through three schedulers, waits for
/// them to drain and prints a JSON report with the wiring graph and the
/// collected scheduler metrics.
#[derive(Parser, Debug)]
#[command(name = "wiring-demo", about = "Demo pipeline for ledger-wiring")]
pub struct CliArgs {
    /// Path to a wiring config file (TOML)
    #[arg(long, env = "WIRING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of records to push through the pipeline
    #[arg(long, env = "WIRING_DEMO_ITEMS", default_value = "10000")]
    pub items: u64,

    /// Submit with `offer` instead of `put`, dropping records when ingest is full
    #[arg(long)]
    pub offer: bool,

    /// Print the wiring graph and exit without running
    #[arg(long)]
    pub describe: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,
}
