//! Asynchronous batch processing strategy
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── BatchProcessor (booking partitioning + task spawning)
//!     └── BookingEngine (per-booking locks, shared ledger and gate)
//! ```
//!
//! Batches run one after another so a booking whose rows span several
//! batches still sees them in file order. Within a batch each booking's rows
//! run on their own task, on a multi-threaded runtime.

use crate::core::{BatchProcessor, EngineConfig};
use crate::io::async_reader::AsyncReader;
use crate::strategy::{finish_replay, replay_engine, ProcessingStrategy};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for batch processing
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of rows per batch
    pub batch_size: usize,
    /// Worker threads for the runtime
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig; zero values fall back to the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "invalid batch size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "invalid max concurrency, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    engine_config: EngineConfig,
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    /// Create a new AsyncProcessingStrategy
    ///
    /// # Arguments
    ///
    /// * `engine_config` - Configuration for the replay engine
    /// * `config` - BatchConfig with batch_size and max_concurrent_batches
    pub fn new(engine_config: EngineConfig, config: BatchConfig) -> Self {
        Self {
            engine_config,
            config,
        }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let engine = Arc::new(replay_engine(&self.engine_config));
            let processor = BatchProcessor::new(Arc::clone(&engine));

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            let mut last_at: Option<DateTime<Utc>> = None;
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                if let Some(batch_max) = batch.iter().map(|record| record.at).max() {
                    last_at = Some(last_at.map_or(batch_max, |last| last.max(batch_max)));
                }

                let results = processor.process_batch(batch).await;
                for rejected in results.iter().filter(|r| r.result.is_err()) {
                    if let Err(e) = &rejected.result {
                        warn!(
                            booking_id = %rejected.record.booking,
                            event = rejected.record.action.name(),
                            error = %e,
                            "replay row rejected"
                        );
                    }
                }
                debug!(rows = results.len(), "batch applied");
            }

            finish_replay(&engine, last_at, output).await
        })
    }
}
