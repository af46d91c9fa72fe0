//! Applies replay records to a booking engine
//!
//! Replay has no wall clock: every row carries its own timestamp, and a
//! booking's acceptance window is checked against that timestamp before the
//! row's own event is applied.

use crate::core::engine::BookingEngine;
use crate::types::{
    ActorRole, BookingEvent, NewBooking, RatingSubmission, ReplayAction, ReplayError, ReplayRecord,
};
use tracing::debug;

const REPLAY_SERVICE_TYPE: &str = "general";

/// Apply one replay row
///
/// # Arguments
///
/// * `engine` - Engine the row is applied to
/// * `record` - The row; its `at` is the logical time of the event
///
/// # Returns
///
/// * `Ok(())` - The row took effect (or was an idempotent redelivery)
/// * `Err(ReplayError)` - The engine rejected the row
pub async fn apply_record(engine: &BookingEngine, record: ReplayRecord) -> Result<(), ReplayError> {
    let ReplayRecord {
        at,
        booking,
        actor,
        action,
    } = record;

    if !matches!(action, ReplayAction::Create { .. }) {
        if let Some(expired) = engine.expire_if_due(&booking, at).await? {
            debug!(booking_id = %expired.id, "acceptance window elapsed before row");
        }
    }

    let event = match action {
        ReplayAction::Create {
            customer_id,
            budget_amount,
        } => {
            let request = NewBooking {
                customer_id,
                provider_id: None,
                service_type: REPLAY_SERVICE_TYPE.to_string(),
                location: String::new(),
                description: String::new(),
                budget_amount,
            };
            engine.create_booking_with_id(booking, request, at).await?;
            return Ok(());
        }
        ReplayAction::Rate {
            rater_role,
            score,
            comment,
        } => {
            let submission = RatingSubmission {
                booking_id: booking,
                rater_role,
                score,
                comment,
            };
            engine.submit_rating_at(submission, at).await?;
            return Ok(());
        }
        ReplayAction::Tick => return Ok(()),
        ReplayAction::PaymentConfirmed { reference } => BookingEvent::PaymentConfirmed { reference },
        ReplayAction::Accept { provider_id } => BookingEvent::ProviderAccepted { provider_id },
        ReplayAction::Complete => BookingEvent::ServiceCompleted,
        ReplayAction::Cancel => BookingEvent::CustomerCancelled,
        ReplayAction::Timeout => BookingEvent::TimeoutExpired,
    };

    let actor = if matches!(event, BookingEvent::TimeoutExpired) {
        ActorRole::System
    } else {
        actor
    };
    engine.transition_at(&booking, event, actor, at).await?;
    Ok(())
}
