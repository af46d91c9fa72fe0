//! Cancellation fee policies for post-acceptance cancellations

use crate::core::traits::CancellationPolicy;
use crate::types::{Booking, CommissionRate, EscrowSplit, EscrowTransaction, MinorUnits};

/// Full refund regardless of when the customer cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCancellationFee;

impl CancellationPolicy for NoCancellationFee {
    fn fee(&self, _booking: &Booking, _escrow: &EscrowTransaction) -> MinorUnits {
        0
    }
}

/// Retain a fixed fraction of the total
///
/// Rounded the same way as the commission split.
#[derive(Debug, Clone, Copy)]
pub struct PercentageCancellationFee {
    rate: CommissionRate,
}

impl PercentageCancellationFee {
    pub fn new(rate: CommissionRate) -> Self {
        Self { rate }
    }
}

impl CancellationPolicy for PercentageCancellationFee {
    fn fee(&self, _booking: &Booking, escrow: &EscrowTransaction) -> MinorUnits {
        EscrowSplit::compute(escrow.total_amount, self.rate).commission_amount
    }
}
