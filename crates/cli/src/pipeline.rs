use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use ledger_wiring::{
    InputWire, SolderType, TaskScheduler, TaskSchedulerBuilder, WiringConfig, WiringError,
    WiringModel,
};

/// A numbered payload travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct Record {
    pub seq: u64,
    pub payload: String,
}

/// A record together with the running digest after it was hashed in.
#[derive(Debug, Clone)]
pub struct Entry {
    pub seq: u64,
    pub digest: [u8; 32],
}

/// What the sink has seen so far.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    pub records: u64,
    pub last_seq: Option<u64>,
    /// Hex SHA-256 chain over every payload seen, in order.
    pub digest: String,
    pub out_of_order: u64,
}

pub struct Pipeline {
    pub ingest: TaskScheduler<Record>,
    pub hasher: TaskScheduler<Entry>,
    pub sink: TaskScheduler<()>,
    pub input: InputWire<u64, Record>,
    pub summary: Arc<Mutex<Summary>>,
}

impl Pipeline {
    /// Build the three stages, apply per-scheduler config and solder them.
    pub fn build(model: &WiringModel, config: &WiringConfig) -> Result<Self, WiringError> {
        let ingest = stage::<Record>(model, config, "ingest")?;
        let hasher = stage::<Entry>(model, config, "hasher")?;
        let sink = stage::<()>(model, config, "sink")?;

        let input = ingest.build_input_wire::<u64>("sequence numbers");
        let hasher_in = hasher.build_input_wire::<Record>("records");
        let sink_in = sink.build_input_wire::<Entry>("entries");

        ingest.output_wire().solder_to(&hasher_in, SolderType::Put)?;
        hasher.output_wire().solder_to(&sink_in, SolderType::Put)?;

        input.bind(|seq| {
            Some(Record {
                seq,
                payload: format!("record-{seq:08}"),
            })
        })?;

        let mut digest = [0u8; 32];
        hasher_in.bind(move |record: Record| {
            digest = chain_digest(&digest, record.payload.as_bytes());
            Some(Entry {
                seq: record.seq,
                digest,
            })
        })?;

        let summary = Arc::new(Mutex::new(Summary::default()));
        {
            let summary = Arc::clone(&summary);
            sink_in.bind_consumer(move |entry: Entry| {
                let mut summary = summary.lock().unwrap_or_else(|e| e.into_inner());
                if summary.last_seq.is_some_and(|last| entry.seq <= last) {
                    summary.out_of_order += 1;
                }
                summary.records += 1;
                summary.last_seq = Some(entry.seq);
                summary.digest = to_hex(&entry.digest);
            })?;
        }

        model.health_monitor_wire().solder_to_fn(
            "health_log",
            "unhealthy duration",
            |duration: Duration| {
                if !duration.is_zero() {
                    warn!(unhealthy_ms = duration.as_millis() as u64, "pipeline is unhealthy");
                }
            },
        )?;

        Ok(Self {
            ingest,
            hasher,
            sink,
            input,
            summary,
        })
    }

    /// Wait for every stage to drain, front to back.
    pub fn flush(&self) -> Result<(), WiringError> {
        self.ingest.flush()?;
        self.hasher.flush()?;
        self.sink.flush()
    }

    pub fn summary(&self) -> Summary {
        self.summary
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Demo defaults first, then whatever the config file says about `name`.
fn stage<O: Clone + Send + 'static>(
    model: &WiringModel,
    config: &WiringConfig,
    name: &str,
) -> Result<TaskScheduler<O>, WiringError> {
    let builder: TaskSchedulerBuilder<O> = model
        .scheduler_builder::<O>(name)?
        .with_unhandled_task_capacity(1_000)
        .with_flushing_enabled(true)
        .with_unhandled_task_metric_enabled(true)
        .with_busy_fraction_metrics_enabled(true);
    builder.configure(&config.scheduler(name)).build()
}

/// Hash `payload` onto the previous link of the chain.
pub fn chain_digest(previous: &[u8; 32], payload: &[u8]) -> [u8; 32] {
    Sha256::new()
        .chain_update(previous)
        .chain_update(payload)
        .finalize()
        .into()
}

pub fn to_hex(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Digest of the first `items` records, computed without the pipeline.
pub fn expected_digest(items: u64) -> String {
    let digest = (0..items).fold([0u8; 32], |digest, seq| {
        chain_digest(&digest, format!("record-{seq:08}").as_bytes())
    });
    to_hex(&digest)
}
