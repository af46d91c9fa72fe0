//! Batch processing with booking-based partitioning
//!
//! A batch of replay rows is split by booking id. Rows for different
//! bookings run concurrently on their own tokio tasks; rows for one booking
//! keep their input order.
//!
//! ```text
//! BatchProcessor
//!     └── Arc<BookingEngine>  (shared, per-booking locking inside)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use crate::core::engine::BookingEngine;
use crate::core::replay::apply_record;
use crate::types::{BookingId, ReplayError, ReplayRecord};

/// Outcome of one replay row
#[derive(Debug)]
pub struct ProcessingResult {
    /// The row that was applied
    pub record: ReplayRecord,

    /// Whether the engine accepted it
    pub result: Result<(), ReplayError>,
}

/// Batch processor with booking-based partitioning
#[derive(Clone)]
pub struct BatchProcessor {
    engine: Arc<BookingEngine>,
}

impl BatchProcessor {
    /// Create a new BatchProcessor
    ///
    /// # Arguments
    ///
    /// * `engine` - Shared engine the rows are applied to
    pub fn new(engine: Arc<BookingEngine>) -> Self {
        Self { engine }
    }

    /// Partition a batch of rows by booking id
    ///
    /// # Returns
    ///
    /// A HashMap from booking id to that booking's rows, in input order.
    /// Every row lands in exactly one partition.
    pub fn partition_by_booking(
        &self,
        batch: Vec<ReplayRecord>,
    ) -> HashMap<BookingId, Vec<ReplayRecord>> {
        let mut booking_batches: HashMap<BookingId, Vec<ReplayRecord>> = HashMap::new();

        for record in batch {
            booking_batches
                .entry(record.booking.clone())
                .or_default()
                .push(record);
        }

        booking_batches
    }

    /// Apply one booking's rows sequentially
    ///
    /// A rejected row is captured in its result and does not stop the rows
    /// after it.
    pub async fn process_booking_records(
        &self,
        records: Vec<ReplayRecord>,
    ) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(records.len());

        for record in records {
            let result = apply_record(&self.engine, record.clone()).await;
            results.push(ProcessingResult { record, result });
        }

        results
    }

    /// Apply a batch, one task per booking
    ///
    /// Waits for every task before returning. Results are grouped by
    /// booking; the order between bookings is unspecified.
    pub async fn process_batch(&self, batch: Vec<ReplayRecord>) -> Vec<ProcessingResult> {
        let booking_batches = self.partition_by_booking(batch);

        let mut tasks = Vec::with_capacity(booking_batches.len());
        for (_booking_id, records) in booking_batches {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move {
                processor.process_booking_records(records).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(booking_results) => results.extend(booking_results),
                Err(e) => error!(error = %e, "replay task panicked"),
            }
        }

        results
    }
}
