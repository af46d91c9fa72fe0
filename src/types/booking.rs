//! Booking-related types for the booking escrow engine
//!
//! This module defines the Booking record, its lifecycle status and the
//! per-booking rating flags. A Booking is the single authoritative record of
//! where a service request stands; views never mutate it directly.

use super::escrow::{LedgerOperation, MinorUnits};
use super::event::{ActorRole, BookingEvent};
use super::rating::RaterRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a customer or provider account
pub type PartyId = String;

/// Opaque, immutable booking identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        BookingId(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        BookingId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingId {
    fn from(id: &str) -> Self {
        BookingId(id.to_string())
    }
}

/// Lifecycle status of a booking
///
/// ```text
/// pending ──paymentConfirmed──▶ awaiting_acceptance ──providerAccepted──▶ confirmed
///                                   │            │                          │    │
///                            timeoutExpired  customerCancelled   serviceCompleted  customerCancelled
///                                   ▼            ▼                          ▼    ▼
///                          cancelled_timeout  cancelled_manual         completed  cancelled_manual
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, waiting for the customer's payment
    Pending,
    /// Funds held in escrow; the acceptance window is running
    AwaitingAcceptance,
    /// A provider accepted the booking
    Confirmed,
    /// Service delivered and funds released to the provider
    Completed,
    /// No provider accepted within the window; fully refunded
    CancelledTimeout,
    /// Cancelled by the customer; refunded according to policy
    CancelledManual,
}

impl BookingStatus {
    /// Whether no further transition is defined from this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::CancelledTimeout | BookingStatus::CancelledManual
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::AwaitingAcceptance => "awaiting_acceptance",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::CancelledTimeout => "cancelled_timeout",
            BookingStatus::CancelledManual => "cancelled_manual",
        }
    }

    /// Message shown to the customer for this status
    ///
    /// A timeout refund is an expected outcome, not a failure, and is worded
    /// accordingly.
    pub fn user_message(self) -> &'static str {
        match self {
            BookingStatus::Pending => "Awaiting payment",
            BookingStatus::AwaitingAcceptance => {
                "Payment held in escrow, waiting for a provider to accept"
            }
            BookingStatus::Confirmed => "Provider accepted, your booking is confirmed",
            BookingStatus::Completed => "Service completed, payment released to the provider",
            BookingStatus::CancelledTimeout => "No-show, fully refunded",
            BookingStatus::CancelledManual => "Booking cancelled, refund issued",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which parties have rated each other for a booking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingStatus {
    /// The customer rated the provider
    pub customer_rated: bool,
    /// The provider rated the customer
    pub provider_rated: bool,
}

impl RatingStatus {
    pub fn is_rated(&self, role: RaterRole) -> bool {
        match role {
            RaterRole::Customer => self.customer_rated,
            RaterRole::Provider => self.provider_rated,
        }
    }

    pub fn mark(&mut self, role: RaterRole) {
        match role {
            RaterRole::Customer => self.customer_rated = true,
            RaterRole::Provider => self.provider_rated = true,
        }
    }

    /// Both sides rated; the booking no longer accepts ratings
    pub fn is_closed(&self) -> bool {
        self.customer_rated && self.provider_rated
    }
}

/// A ledger side effect that was recorded as intent but has not completed
///
/// Present while the payment processor retry budget is exhausted. The
/// booking keeps its previous status until the effect is re-driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEffect {
    /// The event whose side effect is outstanding
    pub event: BookingEvent,
    /// Actor that delivered the event
    pub actor: ActorRole,
    /// Ledger operation still to perform
    pub operation: LedgerOperation,
    /// When the intent was first recorded
    pub recorded_at: DateTime<Utc>,
    /// Processor's refusal; the maintenance loop leaves the effect alone while set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

/// Customer-facing booking request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub customer_id: PartyId,
    /// Pre-assigned provider; unset for job-board requests
    #[serde(default)]
    pub provider_id: Option<PartyId>,
    #[serde(default)]
    pub service_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    /// Budget in minor currency units (e.g. cents)
    pub budget_amount: MinorUnits,
}

/// Authoritative booking record
///
/// Invariants maintained by the state machine:
/// - `accepted_at` is set iff status is `confirmed` or `completed`
/// - `completed_at` is set iff status is `completed`
/// - `awaiting_acceptance_deadline` is set iff status is `awaiting_acceptance`
/// - `requested_at <= accepted_at <= completed_at` when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub customer_id: PartyId,
    pub provider_id: Option<PartyId>,
    pub service_type: String,
    pub location: String,
    pub description: String,
    pub budget_amount: MinorUnits,
    pub status: BookingStatus,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Durable timer deadline; survives restarts
    pub awaiting_acceptance_deadline: Option<DateTime<Utc>>,
    /// Processor reference of the confirmed payment
    pub payment_reference: Option<String>,
    pub rating_status: RatingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_effect: Option<PendingEffect>,
}

impl Booking {
    /// Create a booking in `pending` from a customer request
    pub fn new(id: BookingId, request: NewBooking, requested_at: DateTime<Utc>) -> Self {
        Booking {
            id,
            customer_id: request.customer_id,
            provider_id: request.provider_id,
            service_type: request.service_type,
            location: request.location,
            description: request.description,
            budget_amount: request.budget_amount,
            status: BookingStatus::Pending,
            requested_at,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            awaiting_acceptance_deadline: None,
            payment_reference: None,
            rating_status: RatingStatus::default(),
            pending_effect: None,
        }
    }

    /// Latest lifecycle timestamp recorded on this booking
    pub fn last_changed_at(&self) -> DateTime<Utc> {
        [self.accepted_at, self.completed_at, self.cancelled_at]
            .into_iter()
            .flatten()
            .fold(self.requested_at, |latest, at| latest.max(at))
    }

    /// Message shown to the customer
    pub fn user_message(&self) -> &'static str {
        match &self.pending_effect {
            Some(pending) if pending.rejection.is_some() => {
                "Payment declined by the payment processor, our team will follow up"
            }
            Some(_) => "Payment pending, we are retrying with the payment processor",
            None => self.status.user_message(),
        }
    }
}
