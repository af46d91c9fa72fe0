//! In-process payment processor
//!
//! `SimulatedProcessor` stands in for a real processor integration. It
//! honours idempotency keys the way a real processor does and can be told
//! to fail, which is how retry and pending-effect paths are exercised.

use crate::core::traits::{PaymentProcessor, ProcessorReceipt, ProcessorRequest};
use crate::types::ProcessorError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

/// Idempotent in-memory payment processor
#[derive(Debug, Default)]
pub struct SimulatedProcessor {
    /// Executed transfers by idempotency key
    receipts: DashMap<String, (ProcessorRequest, ProcessorReceipt)>,
    /// Number of upcoming calls that fail transiently
    transient_failures: AtomicU32,
    /// Reject every call while set
    rejecting: AtomicBool,
    /// Total calls received, including failed and deduplicated ones
    calls: AtomicU32,
}

impl SimulatedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with a transient error
    pub fn fail_next(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Reject all calls until cleared
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Number of distinct transfers actually executed
    pub fn transfers(&self) -> usize {
        self.receipts.len()
    }

    /// Number of submit calls received
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The executed request for an idempotency key, if any
    pub fn executed(&self, idempotency_key: &str) -> Option<ProcessorRequest> {
        self.receipts
            .get(idempotency_key)
            .map(|entry| entry.value().0.clone())
    }

    fn take_transient_failure(&self) -> bool {
        self.transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    async fn submit(&self, request: &ProcessorRequest) -> Result<ProcessorReceipt, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ProcessorError::Rejected(format!(
                "{} declined",
                request.idempotency_key
            )));
        }
        if self.take_transient_failure() {
            return Err(ProcessorError::Transient(format!(
                "{} timed out",
                request.idempotency_key
            )));
        }

        let entry = self
            .receipts
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| {
                let receipt = ProcessorReceipt {
                    idempotency_key: request.idempotency_key.clone(),
                    reference: format!("sim_{}", uuid::Uuid::new_v4().simple()),
                };
                (request.clone(), receipt)
            });

        debug!(
            idempotency_key = %request.idempotency_key,
            amount = request.amount,
            "processor accepted transfer"
        );
        Ok(entry.value().1.clone())
    }
}
