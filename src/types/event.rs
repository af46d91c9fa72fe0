//! Booking events and the actors that deliver them

use super::booking::PartyId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that drive the booking state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    /// Payment processor webhook; `reference` correlates to the processor
    /// transaction and makes redeliveries detectable
    PaymentConfirmed { reference: String },

    /// A provider accepted the booking
    ProviderAccepted { provider_id: PartyId },

    /// Arrival confirmed or provider marked the job done
    ServiceCompleted,

    /// Customer cancelled the booking
    CustomerCancelled,

    /// The acceptance window elapsed without acceptance
    TimeoutExpired,
}

impl BookingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::PaymentConfirmed { .. } => "payment_confirmed",
            BookingEvent::ProviderAccepted { .. } => "provider_accepted",
            BookingEvent::ServiceCompleted => "service_completed",
            BookingEvent::CustomerCancelled => "customer_cancelled",
            BookingEvent::TimeoutExpired => "timeout_expired",
        }
    }
}

impl fmt::Display for BookingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Role of whoever delivers an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Provider,
    /// The engine itself or the payment processor
    System,
}

impl ActorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Customer => "customer",
            ActorRole::Provider => "provider",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Ok(ActorRole::Customer),
            "provider" => Ok(ActorRole::Provider),
            "system" => Ok(ActorRole::System),
            other => Err(format!("Invalid actor role: '{}'", other)),
        }
    }
}
