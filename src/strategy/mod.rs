//! Replay strategy module
//!
//! A strategy is a complete replay pipeline: read the event log, drive a
//! booking engine with it and write the resulting booking states. The
//! synchronous and the batched concurrent pipelines are selected at runtime
//! and produce identical output for the same input.

use crate::cli::StrategyType;
use crate::core::{BookingEngine, EngineConfig, EngineParts, SimulatedProcessor};
use crate::io::csv_format::write_bookings_csv;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete replay pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Replay the event log at `input_path` and write booking states to `output`
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the replay CSV
    /// * `output` - Writer receiving the booking summary CSV
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the replay ran to the end (rejected rows included)
    /// * `Err(String)` if a fatal error occurred (file not found, I/O error, etc.)
    ///
    /// Malformed rows and rows the engine rejects are logged and skipped;
    /// they never fail the replay.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `engine_config` - Configuration for the engine each replay builds
/// * `config` - Optional configuration for async batch processing (ignored for sync)
pub fn create_strategy(
    strategy_type: StrategyType,
    engine_config: EngineConfig,
    config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(engine_config)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(engine_config, config))
        }
    }
}

/// Engine used for a replay: simulated processor, in-memory journal,
/// manual timers
pub(crate) fn replay_engine(config: &EngineConfig) -> BookingEngine {
    BookingEngine::new(
        config.clone(),
        EngineParts::in_memory(Arc::new(SimulatedProcessor::new())),
    )
}

/// Run the end-of-input sweep and write every booking
pub(crate) async fn finish_replay(
    engine: &BookingEngine,
    last_at: Option<DateTime<Utc>>,
    output: &mut dyn Write,
) -> Result<(), String> {
    if let Some(last_at) = last_at {
        let report = engine.sweep_expired(last_at).await;
        info!(
            expired = report.expired.len(),
            failed = report.failed.len(),
            "final sweep complete"
        );
    }

    let bookings = engine.list_bookings().await;
    let escrows = engine.escrows();
    write_bookings_csv(&bookings, &escrows, output)
}
