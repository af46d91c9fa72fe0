//! Synchronous processing strategy
//!
//! Streams rows through `SyncReader` and applies them one at a time on a
//! current-thread runtime. The engine is async, but nothing here runs
//! concurrently: row order is file order.

use crate::core::replay::apply_record;
use crate::core::EngineConfig;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{finish_replay, replay_engine, ProcessingStrategy};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use booking_escrow_engine::core::EngineConfig;
/// use booking_escrow_engine::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use rust_decimal::Decimal;
/// use std::path::Path;
///
/// let config = EngineConfig::new(Decimal::new(15, 2)).unwrap();
/// let strategy = SyncProcessingStrategy::new(config);
/// strategy
///     .process(Path::new("events.csv"), &mut std::io::stdout())
///     .expect("Replay failed");
/// ```
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    engine_config: EngineConfig,
}

impl SyncProcessingStrategy {
    pub fn new(engine_config: EngineConfig) -> Self {
        Self { engine_config }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let reader = SyncReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let engine = replay_engine(&self.engine_config);
            let mut last_at: Option<DateTime<Utc>> = None;

            for result in reader {
                match result {
                    Ok(record) => {
                        last_at = Some(last_at.map_or(record.at, |last| last.max(record.at)));
                        let booking_id = record.booking.clone();
                        let event = record.action.name();
                        if let Err(e) = apply_record(&engine, record).await {
                            warn!(%booking_id, event, error = %e, "replay row rejected");
                        }
                    }
                    Err(e) => warn!(error = %e, "skipping malformed row"),
                }
            }

            finish_replay(&engine, last_at, output).await
        })
    }
}
