//! Trait seams between the engine and its collaborators
//!
//! The engine talks to the payment processor, the notification channel, the
//! cancellation fee policy and the write-ahead journal only through these
//! traits, so deployments and tests can plug in their own implementations.

use crate::core::journal::JournalEntry;
use crate::core::notify::Notification;
use crate::types::{
    Booking, BookingId, EscrowTransaction, JournalError, LedgerOperation, MinorUnits,
    ProcessorError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single transfer request sent to the payment processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorRequest {
    /// Derived from (booking id, operation); identical across retries
    pub idempotency_key: String,
    pub booking_id: BookingId,
    pub operation: LedgerOperation,
    /// Amount moved by this request in minor units
    pub amount: MinorUnits,
}

/// Processor acknowledgement of an executed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorReceipt {
    pub idempotency_key: String,
    /// Processor-side transfer reference
    pub reference: String,
}

/// External payment processor
///
/// Implementations must treat `idempotency_key` as the identity of the
/// transfer: submitting the same key twice returns the original receipt
/// without moving money again.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn submit(&self, request: &ProcessorRequest) -> Result<ProcessorReceipt, ProcessorError>;
}

/// Delivery channel for email/push notifications
pub trait NotificationDispatcher: Send + Sync {
    /// Fire-and-forget; delivery failures are the dispatcher's concern
    fn notify(&self, notification: Notification);
}

/// Fee retained when a customer cancels after a provider accepted
pub trait CancellationPolicy: Send + Sync {
    /// Amount withheld from the refund, clamped by the ledger to the total
    fn fee(&self, booking: &Booking, escrow: &EscrowTransaction) -> MinorUnits;
}

/// Append-only write-ahead log
#[async_trait]
pub trait Journal: Send + Sync {
    /// Durably append one entry
    async fn append(&self, entry: &JournalEntry) -> Result<(), JournalError>;

    /// Read every entry in append order
    async fn load(&self) -> Result<Vec<JournalEntry>, JournalError>;
}
