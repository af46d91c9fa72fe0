//! Escrow ledger
//!
//! Holds one `EscrowTransaction` per booking and moves money through the
//! payment processor. The ledger enforces the `held → released | refunded`
//! lifecycle; *when* to hold, release or refund is decided by the booking
//! state machine.
//!
//! # Thread Safety
//!
//! Transactions live in a `DashMap`. The engine serializes operations per
//! booking, so the ledger never sees two concurrent operations for the same
//! transaction.

use crate::core::config::RetryPolicy;
use crate::core::traits::{PaymentProcessor, ProcessorReceipt, ProcessorRequest};
use crate::types::{
    BookingId, CommissionRate, EscrowState, EscrowTransaction, LedgerError, LedgerOperation,
    MinorUnits, ProcessorError,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Ledger of escrow transactions backed by a payment processor
pub struct EscrowLedger {
    transactions: DashMap<BookingId, EscrowTransaction>,
    processor: Arc<dyn PaymentProcessor>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for EscrowLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowLedger")
            .field("transactions", &self.transactions.len())
            .field("retry", &self.retry)
            .finish()
    }
}

impl EscrowLedger {
    /// Create an empty ledger
    ///
    /// # Arguments
    ///
    /// * `processor` - Payment processor receiving every transfer
    /// * `retry` - Retry schedule for transient processor failures
    pub fn new(processor: Arc<dyn PaymentProcessor>, retry: RetryPolicy) -> Self {
        Self {
            transactions: DashMap::new(),
            processor,
            retry,
        }
    }

    /// Capture the customer's payment into escrow
    ///
    /// The commission split is computed here from `commission_rate` and
    /// stored; it is never recomputed.
    ///
    /// # Errors
    ///
    /// * `AlreadyHeld` - a transaction already exists for the booking
    /// * `PaymentProcessor` - the processor failed after every retry
    pub async fn hold(
        &self,
        booking_id: &BookingId,
        amount: MinorUnits,
        commission_rate: CommissionRate,
        at: DateTime<Utc>,
    ) -> Result<EscrowTransaction, LedgerError> {
        if self.transactions.contains_key(booking_id) {
            return Err(LedgerError::AlreadyHeld {
                booking_id: booking_id.clone(),
            });
        }

        self.submit(booking_id, LedgerOperation::Hold, amount).await?;

        let transaction = EscrowTransaction::held(booking_id.clone(), amount, commission_rate, at);
        match self.transactions.entry(booking_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyHeld {
                booking_id: booking_id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(transaction.clone());
                info!(
                    booking_id = %booking_id,
                    total = transaction.total_amount,
                    provider_amount = transaction.provider_amount,
                    commission_amount = transaction.commission_amount,
                    "funds held in escrow"
                );
                Ok(transaction)
            }
        }
    }

    /// Pay the provider share out and retain the commission
    ///
    /// Releasing an already released transaction is a no-op success.
    ///
    /// # Errors
    ///
    /// * `NotFound` - nothing was held for the booking
    /// * `InvalidLedgerState` - the transaction was refunded
    /// * `PaymentProcessor` - the processor failed after every retry
    pub async fn release(
        &self,
        booking_id: &BookingId,
        at: DateTime<Utc>,
    ) -> Result<EscrowTransaction, LedgerError> {
        let current = self.require(booking_id)?;
        match current.state {
            EscrowState::Released => {
                debug!(booking_id = %booking_id, "release already applied");
                return Ok(current);
            }
            EscrowState::Refunded => {
                return Err(LedgerError::InvalidLedgerState {
                    booking_id: booking_id.clone(),
                    state: current.state,
                    operation: LedgerOperation::Release,
                })
            }
            EscrowState::Held => {}
        }

        self.submit(booking_id, LedgerOperation::Release, current.provider_amount)
            .await?;

        let updated = self.resolve(booking_id, |tx| {
            tx.state = EscrowState::Released;
            tx.resolved_at = Some(at);
        })?;
        info!(
            booking_id = %booking_id,
            provider_amount = updated.provider_amount,
            commission_amount = updated.commission_amount,
            "escrow released"
        );
        Ok(updated)
    }

    /// Return the full amount to the customer
    pub async fn refund(
        &self,
        booking_id: &BookingId,
        at: DateTime<Utc>,
    ) -> Result<EscrowTransaction, LedgerError> {
        self.refund_with_fee(booking_id, 0, at).await
    }

    /// Return the total minus `fee` to the customer
    ///
    /// The fee is clamped to the total. Refunding an already refunded
    /// transaction is a no-op success.
    ///
    /// # Errors
    ///
    /// * `NotFound` - nothing was held for the booking
    /// * `InvalidLedgerState` - the transaction was released
    /// * `PaymentProcessor` - the processor failed after every retry
    pub async fn refund_with_fee(
        &self,
        booking_id: &BookingId,
        fee: MinorUnits,
        at: DateTime<Utc>,
    ) -> Result<EscrowTransaction, LedgerError> {
        let current = self.require(booking_id)?;
        match current.state {
            EscrowState::Refunded => {
                debug!(booking_id = %booking_id, "refund already applied");
                return Ok(current);
            }
            EscrowState::Released => {
                return Err(LedgerError::InvalidLedgerState {
                    booking_id: booking_id.clone(),
                    state: current.state,
                    operation: LedgerOperation::Refund,
                })
            }
            EscrowState::Held => {}
        }

        let fee = fee.min(current.total_amount);
        let refund_amount = current.total_amount - fee;
        self.submit(booking_id, LedgerOperation::Refund, refund_amount)
            .await?;

        let updated = self.resolve(booking_id, |tx| {
            tx.state = EscrowState::Refunded;
            tx.resolved_at = Some(at);
            tx.refund_amount = Some(refund_amount);
            tx.cancellation_fee = Some(fee);
        })?;
        info!(
            booking_id = %booking_id,
            refund_amount,
            cancellation_fee = fee,
            "escrow refunded"
        );
        Ok(updated)
    }

    /// Get a snapshot of a booking's transaction
    pub fn get(&self, booking_id: &BookingId) -> Option<EscrowTransaction> {
        self.transactions
            .get(booking_id)
            .map(|entry| entry.value().clone())
    }

    /// Reinstate a transaction rebuilt from the journal
    pub fn restore(&self, transaction: EscrowTransaction) {
        self.transactions
            .insert(transaction.booking_id.clone(), transaction);
    }

    /// Every transaction, ordered by booking id
    pub fn all(&self) -> Vec<EscrowTransaction> {
        let mut transactions: Vec<EscrowTransaction> = self
            .transactions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        transactions.sort_by(|a, b| a.booking_id.cmp(&b.booking_id));
        transactions
    }

    fn require(&self, booking_id: &BookingId) -> Result<EscrowTransaction, LedgerError> {
        self.get(booking_id).ok_or_else(|| LedgerError::NotFound {
            booking_id: booking_id.clone(),
        })
    }

    fn resolve<F>(&self, booking_id: &BookingId, f: F) -> Result<EscrowTransaction, LedgerError>
    where
        F: FnOnce(&mut EscrowTransaction),
    {
        let mut entry = self
            .transactions
            .get_mut(booking_id)
            .ok_or_else(|| LedgerError::NotFound {
                booking_id: booking_id.clone(),
            })?;
        f(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Send one transfer, retrying transient failures with backoff
    ///
    /// Every attempt carries the same idempotency key.
    async fn submit(
        &self,
        booking_id: &BookingId,
        operation: LedgerOperation,
        amount: MinorUnits,
    ) -> Result<ProcessorReceipt, LedgerError> {
        let request = ProcessorRequest {
            idempotency_key: operation.idempotency_key(booking_id),
            booking_id: booking_id.clone(),
            operation,
            amount,
        };
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.processor.submit(&request).await {
                Ok(receipt) => return Ok(receipt),
                Err(ProcessorError::Transient(message)) if attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        booking_id = %booking_id,
                        %operation,
                        attempt,
                        ?delay,
                        error = %message,
                        "transient processor failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(ProcessorError::Rejected(message)) => {
                    error!(
                        booking_id = %booking_id,
                        %operation,
                        attempts = attempt,
                        reason = %message,
                        "payment processor rejected transfer"
                    );
                    return Err(LedgerError::PaymentRejected {
                        booking_id: booking_id.clone(),
                        operation,
                        message,
                    });
                }
                Err(e) => {
                    error!(
                        booking_id = %booking_id,
                        %operation,
                        attempts = attempt,
                        error = %e,
                        "payment processor gave up"
                    );
                    return Err(LedgerError::PaymentProcessor {
                        booking_id: booking_id.clone(),
                        operation,
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processor::SimulatedProcessor;
    use rust_decimal::Decimal;

    fn setup(attempts: u32) -> (Arc<SimulatedProcessor>, EscrowLedger) {
        let processor = Arc::new(SimulatedProcessor::new());
        let ledger = EscrowLedger::new(processor.clone(), RetryPolicy::immediate(attempts));
        (processor, ledger)
    }

    fn rate() -> CommissionRate {
        CommissionRate::new(Decimal::new(15, 2)).unwrap()
    }

    fn id() -> BookingId {
        BookingId::new("b1")
    }

    #[tokio::test]
    async fn test_hold_computes_split() {
        let (processor, ledger) = setup(1);

        let tx = ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();

        assert_eq!(tx.state, EscrowState::Held);
        assert_eq!(tx.provider_amount, 8_500);
        assert_eq!(tx.commission_amount, 1_500);
        assert_eq!(processor.executed("b1:hold").unwrap().amount, 10_000);
    }

    #[tokio::test]
    async fn test_hold_twice_is_already_held() {
        let (processor, ledger) = setup(1);
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();

        let result = ledger.hold(&id(), 10_000, rate(), Utc::now()).await;

        assert_eq!(result, Err(LedgerError::AlreadyHeld { booking_id: id() }));
        assert_eq!(processor.calls(), 1);
    }

    #[tokio::test]
    async fn test_release_twice_moves_money_once() {
        let (processor, ledger) = setup(1);
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();

        let first = ledger.release(&id(), Utc::now()).await.unwrap();
        let second = ledger.release(&id(), Utc::now()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.state, EscrowState::Released);
        assert_eq!(processor.transfers(), 2);
        assert_eq!(processor.executed("b1:release").unwrap().amount, 8_500);
    }

    #[tokio::test]
    async fn test_refund_after_release_is_rejected() {
        let (_, ledger) = setup(1);
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();
        ledger.release(&id(), Utc::now()).await.unwrap();

        let result = ledger.refund(&id(), Utc::now()).await;

        assert_eq!(
            result,
            Err(LedgerError::InvalidLedgerState {
                booking_id: id(),
                state: EscrowState::Released,
                operation: LedgerOperation::Refund,
            })
        );
        assert_eq!(ledger.get(&id()).unwrap().state, EscrowState::Released);
    }

    #[tokio::test]
    async fn test_release_after_refund_is_rejected() {
        let (_, ledger) = setup(1);
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();
        ledger.refund(&id(), Utc::now()).await.unwrap();

        let result = ledger.release(&id(), Utc::now()).await;
        assert!(matches!(
            result,
            Err(LedgerError::InvalidLedgerState {
                state: EscrowState::Refunded,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_release_without_hold_is_not_found() {
        let (_, ledger) = setup(1);
        let result = ledger.release(&id(), Utc::now()).await;
        assert_eq!(result, Err(LedgerError::NotFound { booking_id: id() }));
    }

    #[tokio::test]
    async fn test_refund_with_fee_balances() {
        let (processor, ledger) = setup(1);
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();

        let tx = ledger.refund_with_fee(&id(), 1_000, Utc::now()).await.unwrap();

        assert_eq!(tx.refund_amount, Some(9_000));
        assert_eq!(tx.cancellation_fee, Some(1_000));
        assert!(tx.is_conserved());
        assert_eq!(processor.executed("b1:refund").unwrap().amount, 9_000);
    }

    #[tokio::test]
    async fn test_refund_fee_is_clamped_to_total() {
        let (_, ledger) = setup(1);
        ledger.hold(&id(), 500, rate(), Utc::now()).await.unwrap();

        let tx = ledger.refund_with_fee(&id(), 9_999, Utc::now()).await.unwrap();

        assert_eq!(tx.refund_amount, Some(0));
        assert_eq!(tx.cancellation_fee, Some(500));
        assert!(tx.is_conserved());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_with_same_key() {
        let (processor, ledger) = setup(3);
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();
        processor.fail_next(2);

        let tx = ledger.release(&id(), Utc::now()).await.unwrap();

        assert_eq!(tx.state, EscrowState::Released);
        assert_eq!(processor.calls(), 4);
        assert_eq!(processor.transfers(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_funds_held() {
        let (processor, ledger) = setup(3);
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();
        processor.fail_next(10);

        let result = ledger.release(&id(), Utc::now()).await;

        assert!(matches!(
            result,
            Err(LedgerError::PaymentProcessor { attempts: 3, .. })
        ));
        assert_eq!(ledger.get(&id()).unwrap().state, EscrowState::Held);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (processor, ledger) = setup(5);
        processor.set_rejecting(true);

        let result = ledger.hold(&id(), 10_000, rate(), Utc::now()).await;

        assert!(matches!(result, Err(LedgerError::PaymentRejected { .. })));
        assert_eq!(processor.calls(), 1);
        assert!(ledger.get(&id()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let processor = Arc::new(SimulatedProcessor::new());
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(200),
            max_delay: std::time::Duration::from_secs(5),
        };
        let ledger = EscrowLedger::new(processor.clone(), retry);
        processor.fail_next(2);

        let started = tokio::time::Instant::now();
        ledger.hold(&id(), 10_000, rate(), Utc::now()).await.unwrap();

        assert!(started.elapsed() >= std::time::Duration::from_millis(600));
    }
}
