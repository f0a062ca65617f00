mod cli;
mod pipeline;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use ledger_wiring::{InMemoryMetrics, MetricsSink, WiringConfig, WiringModel};

use crate::cli::CliArgs;
use crate::pipeline::{expected_digest, Pipeline};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => WiringConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let mut config = WiringConfig::default();
            config.apply_env_overrides();
            config.validate().context("invalid configuration")?;
            config
        }
    };

    let metrics = Arc::new(InMemoryMetrics::new());
    let model = WiringModel::builder()
        .with_config(&config.model)
        .with_metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
        .build()
        .context("failed to build wiring model")?;
    let pipeline = Pipeline::build(&model, &config).context("failed to wire pipeline")?;

    if args.describe {
        for edge in model.describe_wiring() {
            println!("{edge}");
        }
        return Ok(());
    }

    model.start().context("failed to start wiring model")?;
    info!(items = args.items, offer = args.offer, "pumping records");

    let started = Instant::now();
    let mut dropped = 0u64;
    for seq in 0..args.items {
        if args.offer {
            if !pipeline.input.offer(seq)? {
                dropped += 1;
            }
        } else {
            pipeline.input.put(seq)?;
        }
    }
    pipeline.flush().context("failed to drain pipeline")?;
    let elapsed = started.elapsed();

    let summary = pipeline.summary();
    if dropped == 0 && summary.digest != expected_digest(args.items) {
        warn!(digest = %summary.digest, "digest does not match the input sequence");
    }
    info!(
        records = summary.records,
        dropped,
        elapsed_ms = elapsed.as_millis() as u64,
        "pipeline drained"
    );

    let report = serde_json::json!({
        "items": args.items,
        "dropped": dropped,
        "elapsed_ms": elapsed.as_millis() as u64,
        "summary": summary,
        "wiring": model.describe_wiring(),
        "metrics": metrics.snapshot(),
    });
    model.stop().context("failed to stop wiring model")?;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{rendered}");
    Ok(())
}
