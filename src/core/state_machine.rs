//! Booking state machine
//!
//! A pure transition table: given a booking, an event and the delivering
//! actor, decide the target status and which side effects the engine must
//! run. Nothing here touches the ledger, the scheduler or the clock.
//!
//! | From                | Event             | Actor             | To                  | Ledger  | Timer  |
//! |---------------------|-------------------|-------------------|---------------------|---------|--------|
//! | pending             | payment_confirmed | system            | awaiting_acceptance | hold    | start  |
//! | awaiting_acceptance | provider_accepted | provider          | confirmed           |         | cancel |
//! | awaiting_acceptance | timeout_expired   | system            | cancelled_timeout   | refund  | cancel |
//! | awaiting_acceptance | customer_cancelled| customer          | cancelled_manual    | refund  | cancel |
//! | confirmed           | service_completed | completion policy | completed           | release |        |
//! | confirmed           | customer_cancelled| customer          | cancelled_manual    | refund  |        |

use crate::core::config::CompletionPolicy;
use crate::types::{
    ActorRole, Booking, BookingError, BookingEvent, BookingStatus, LedgerOperation,
};
use chrono::{DateTime, Utc};

/// What the engine does with the acceptance timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Keep,
    Start,
    Cancel,
}

/// A permitted state change and its side effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: BookingStatus,
    pub effect: Option<LedgerOperation>,
    pub timer: TimerAction,
}

/// Outcome of evaluating an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Redelivery of an event that already took effect
    AlreadyApplied,
    Apply(Transition),
}

/// Evaluate `event` from `actor` against the booking's current state
///
/// Redeliveries are recognised first, then the transition table is
/// consulted, then the actor is checked. `at` is the time the event is
/// delivered; a timeout is only in the table once the booking's acceptance
/// deadline is at or before it.
///
/// # Errors
///
/// * `InvalidTransition` - the (status, event) pair is not in the table, or
///   a timeout arrives before the acceptance deadline
/// * `ActorNotPermitted` - the actor may not deliver this event, or a
///   provider other than the assigned one tries to accept
/// * `Validation` - the event payload is empty
pub fn decide(
    booking: &Booking,
    event: &BookingEvent,
    actor: ActorRole,
    completion_policy: CompletionPolicy,
    at: DateTime<Utc>,
) -> Result<Decision, BookingError> {
    if is_already_applied(booking, event) {
        return Ok(Decision::AlreadyApplied);
    }

    let (transition, permitted) = match (booking.status, event) {
        (BookingStatus::Pending, BookingEvent::PaymentConfirmed { reference }) => {
            if reference.trim().is_empty() {
                return Err(BookingError::validation("payment reference must not be empty"));
            }
            (
                Transition {
                    to: BookingStatus::AwaitingAcceptance,
                    effect: Some(LedgerOperation::Hold),
                    timer: TimerAction::Start,
                },
                actor == ActorRole::System,
            )
        }
        (BookingStatus::AwaitingAcceptance, BookingEvent::ProviderAccepted { provider_id }) => {
            if provider_id.trim().is_empty() {
                return Err(BookingError::validation("provider id must not be empty"));
            }
            let assigned_matches = booking
                .provider_id
                .as_ref()
                .map_or(true, |assigned| assigned == provider_id);
            (
                Transition {
                    to: BookingStatus::Confirmed,
                    effect: None,
                    timer: TimerAction::Cancel,
                },
                actor == ActorRole::Provider && assigned_matches,
            )
        }
        (BookingStatus::AwaitingAcceptance, BookingEvent::TimeoutExpired) => {
            if booking
                .awaiting_acceptance_deadline
                .is_some_and(|deadline| deadline > at)
            {
                return Err(BookingError::invalid_transition(
                    &booking.id,
                    booking.status,
                    event.name(),
                ));
            }
            (
                Transition {
                    to: BookingStatus::CancelledTimeout,
                    effect: Some(LedgerOperation::Refund),
                    timer: TimerAction::Cancel,
                },
                actor == ActorRole::System,
            )
        }
        (BookingStatus::AwaitingAcceptance, BookingEvent::CustomerCancelled) => (
            Transition {
                to: BookingStatus::CancelledManual,
                effect: Some(LedgerOperation::Refund),
                timer: TimerAction::Cancel,
            },
            actor == ActorRole::Customer,
        ),
        (BookingStatus::Confirmed, BookingEvent::ServiceCompleted) => (
            Transition {
                to: BookingStatus::Completed,
                effect: Some(LedgerOperation::Release),
                timer: TimerAction::Keep,
            },
            completion_policy.permits(actor),
        ),
        (BookingStatus::Confirmed, BookingEvent::CustomerCancelled) => (
            Transition {
                to: BookingStatus::CancelledManual,
                effect: Some(LedgerOperation::Refund),
                timer: TimerAction::Keep,
            },
            actor == ActorRole::Customer,
        ),
        (current, event) => {
            return Err(BookingError::invalid_transition(
                &booking.id,
                current,
                event.name(),
            ))
        }
    };

    if !permitted {
        return Err(BookingError::actor_not_permitted(
            &booking.id,
            actor,
            event.name(),
        ));
    }
    Ok(Decision::Apply(transition))
}

fn is_already_applied(booking: &Booking, event: &BookingEvent) -> bool {
    match event {
        BookingEvent::PaymentConfirmed { reference } => {
            booking.payment_reference.as_deref() == Some(reference.as_str())
        }
        BookingEvent::ProviderAccepted { provider_id } => {
            booking.accepted_at.is_some() && booking.provider_id.as_ref() == Some(provider_id)
        }
        BookingEvent::ServiceCompleted => booking.status == BookingStatus::Completed,
        BookingEvent::CustomerCancelled => booking.status == BookingStatus::CancelledManual,
        BookingEvent::TimeoutExpired => booking.status == BookingStatus::CancelledTimeout,
    }
}

/// Apply a decided transition to the booking record
///
/// Timestamps never move backwards: `at` is raised to the latest timestamp
/// already on the booking.
pub fn apply(
    booking: &mut Booking,
    event: &BookingEvent,
    transition: &Transition,
    at: DateTime<Utc>,
    acceptance_window: chrono::Duration,
) {
    let at = at.max(booking.last_changed_at());
    booking.status = transition.to;
    booking.pending_effect = None;

    match event {
        BookingEvent::PaymentConfirmed { reference } => {
            booking.payment_reference = Some(reference.clone());
            booking.awaiting_acceptance_deadline = Some(at + acceptance_window);
        }
        BookingEvent::ProviderAccepted { provider_id } => {
            if booking.provider_id.is_none() {
                booking.provider_id = Some(provider_id.clone());
            }
            booking.accepted_at = Some(at);
            booking.awaiting_acceptance_deadline = None;
        }
        BookingEvent::ServiceCompleted => {
            booking.completed_at = Some(at);
        }
        BookingEvent::CustomerCancelled | BookingEvent::TimeoutExpired => {
            booking.cancelled_at = Some(at);
            booking.accepted_at = None;
            booking.awaiting_acceptance_deadline = None;
        }
    }
}

/// Check the field invariants tied to a booking's status
pub fn check_invariants(booking: &Booking) -> Result<(), String> {
    let status = booking.status;
    let accepted_expected = matches!(status, BookingStatus::Confirmed | BookingStatus::Completed);
    if booking.accepted_at.is_some() != accepted_expected {
        return Err(format!("accepted_at does not match status {}", status));
    }
    if booking.completed_at.is_some() != (status == BookingStatus::Completed) {
        return Err(format!("completed_at does not match status {}", status));
    }
    if booking.awaiting_acceptance_deadline.is_some()
        != (status == BookingStatus::AwaitingAcceptance)
    {
        return Err(format!("deadline does not match status {}", status));
    }
    let cancelled = matches!(
        status,
        BookingStatus::CancelledTimeout | BookingStatus::CancelledManual
    );
    if booking.cancelled_at.is_some() != cancelled {
        return Err(format!("cancelled_at does not match status {}", status));
    }
    if let (Some(accepted), Some(completed)) = (booking.accepted_at, booking.completed_at) {
        if accepted > completed {
            return Err("completed_at precedes accepted_at".to_string());
        }
    }
    if booking.accepted_at.is_some_and(|accepted| accepted < booking.requested_at) {
        return Err("accepted_at precedes requested_at".to_string());
    }
    if status.is_terminal() && booking.pending_effect.is_some() {
        return Err(format!("{} booking still has a pending effect", status));
    }
    Ok(())
}
