//! Escrow-related types for the booking escrow engine
//!
//! All money is carried as integer minor units (e.g. cents). The commission
//! rate is a decimal fraction fixed on the transaction when funds are held;
//! the split it produces always sums back to the total exactly.

use super::booking::BookingId;
use super::error::ConfigError;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in minor currency units
pub type MinorUnits = u64;

/// Platform commission as a fraction of the booking total, within [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CommissionRate(Decimal);

impl CommissionRate {
    /// Validate a fractional rate (0.15 means 15%)
    pub fn new(rate: Decimal) -> Result<Self, ConfigError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(ConfigError::InvalidCommissionRate { rate });
        }
        Ok(CommissionRate(rate))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for CommissionRate {
    type Error = ConfigError;

    fn try_from(rate: Decimal) -> Result<Self, Self::Error> {
        CommissionRate::new(rate)
    }
}

impl From<CommissionRate> for Decimal {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider/platform split of a booking total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowSplit {
    pub provider_amount: MinorUnits,
    pub commission_amount: MinorUnits,
}

impl EscrowSplit {
    /// Split `total` at `rate`
    ///
    /// The commission is rounded half-to-even to a whole minor unit and the
    /// provider receives the remainder, so the two parts always add up to
    /// `total`.
    pub fn compute(total: MinorUnits, rate: CommissionRate) -> Self {
        let commission = (Decimal::from(total) * rate.as_decimal())
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_u64()
            .map_or(total, |c| c.min(total));

        EscrowSplit {
            provider_amount: total - commission,
            commission_amount: commission,
        }
    }
}

/// State of an escrow transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    Held,
    Released,
    Refunded,
}

impl EscrowState {
    pub fn as_str(self) -> &'static str {
        match self {
            EscrowState::Held => "held",
            EscrowState::Released => "released",
            EscrowState::Refunded => "refunded",
        }
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Money movement performed against the payment processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOperation {
    Hold,
    Release,
    Refund,
}

impl LedgerOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerOperation::Hold => "hold",
            LedgerOperation::Release => "release",
            LedgerOperation::Refund => "refund",
        }
    }

    /// Processor idempotency key for this operation on a booking
    ///
    /// Retries of the same operation reuse the key, so the processor can
    /// never execute the transfer twice.
    pub fn idempotency_key(self, booking_id: &BookingId) -> String {
        format!("{}:{}", booking_id, self.as_str())
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escrow record, one per booking, created at payment confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub booking_id: BookingId,
    pub total_amount: MinorUnits,
    /// Fixed at hold time; later configuration changes do not apply
    pub commission_rate: CommissionRate,
    pub provider_amount: MinorUnits,
    pub commission_amount: MinorUnits,
    pub state: EscrowState,
    pub held_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Amount returned to the customer once refunded
    pub refund_amount: Option<MinorUnits>,
    /// Amount retained under the cancellation policy once refunded
    pub cancellation_fee: Option<MinorUnits>,
}

impl EscrowTransaction {
    /// Create a transaction in `held`
    pub fn held(
        booking_id: BookingId,
        total_amount: MinorUnits,
        commission_rate: CommissionRate,
        held_at: DateTime<Utc>,
    ) -> Self {
        let split = EscrowSplit::compute(total_amount, commission_rate);
        EscrowTransaction {
            booking_id,
            total_amount,
            commission_rate,
            provider_amount: split.provider_amount,
            commission_amount: split.commission_amount,
            state: EscrowState::Held,
            held_at,
            resolved_at: None,
            refund_amount: None,
            cancellation_fee: None,
        }
    }

    /// Every amount on the record adds back up to the total
    pub fn is_conserved(&self) -> bool {
        let split_ok = self.provider_amount.checked_add(self.commission_amount)
            == Some(self.total_amount);
        let refund_ok = match (self.refund_amount, self.cancellation_fee) {
            (None, None) => true,
            (Some(refund), Some(fee)) => refund.checked_add(fee) == Some(self.total_amount),
            _ => false,
        };
        split_ok && refund_ok
    }
}
