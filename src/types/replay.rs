//! Replay record types
//!
//! A replay record is one row of a booking event log: something that
//! happened to one booking at one point in time.

use super::booking::{BookingId, PartyId};
use super::escrow::MinorUnits;
use super::event::ActorRole;
use super::rating::RaterRole;
use chrono::{DateTime, Utc};

/// What a replay row does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayAction {
    /// Request a new booking
    Create {
        customer_id: PartyId,
        budget_amount: MinorUnits,
    },
    /// Payment processor confirmed the payment
    PaymentConfirmed { reference: String },
    /// A provider accepted the booking
    Accept { provider_id: PartyId },
    /// Arrival confirmed or job marked done
    Complete,
    /// Customer cancelled
    Cancel,
    /// External timeout signal
    Timeout,
    /// One side rates the other
    Rate {
        rater_role: RaterRole,
        score: i64,
        comment: Option<String>,
    },
    /// Advance the booking's clock without an event
    Tick,
}

impl ReplayAction {
    pub fn name(&self) -> &'static str {
        match self {
            ReplayAction::Create { .. } => "create",
            ReplayAction::PaymentConfirmed { .. } => "payment_confirmed",
            ReplayAction::Accept { .. } => "accept",
            ReplayAction::Complete => "complete",
            ReplayAction::Cancel => "cancel",
            ReplayAction::Timeout => "timeout",
            ReplayAction::Rate { .. } => "rate",
            ReplayAction::Tick => "tick",
        }
    }

    /// Actor assumed when the row leaves it blank
    pub fn default_actor(&self) -> ActorRole {
        match self {
            ReplayAction::Accept { .. } => ActorRole::Provider,
            ReplayAction::Create { .. } | ReplayAction::Complete | ReplayAction::Cancel => {
                ActorRole::Customer
            }
            ReplayAction::Rate { rater_role, .. } => match rater_role {
                RaterRole::Customer => ActorRole::Customer,
                RaterRole::Provider => ActorRole::Provider,
            },
            ReplayAction::PaymentConfirmed { .. } | ReplayAction::Timeout | ReplayAction::Tick => {
                ActorRole::System
            }
        }
    }
}

/// A validated replay row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRecord {
    pub at: DateTime<Utc>,
    pub booking: BookingId,
    pub actor: ActorRole,
    pub action: ReplayAction,
}
