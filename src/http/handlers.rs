//! Booking and rating handlers for the REST API.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::core::BookingView;
use crate::http::error::ApiError;
use crate::http::AppState;
use crate::types::{
    ActorRole, Booking, BookingEvent, BookingId, NewBooking, PartyId, RatingRecord,
    RatingSubmission,
};

#[derive(Debug, Deserialize)]
pub struct PaymentConfirmedRequest {
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub provider_id: PartyId,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub actor: ActorRole,
}

/// POST /bookings - Create a booking in `pending`.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(body): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = state.engine.create_booking(body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /bookings/{id} - Booking with escrow, ratings and status message.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, ApiError> {
    let view = state.engine.view(&BookingId::new(id)).await?;
    Ok(Json(view))
}

/// POST /bookings/{id}/payment-confirmed - Payment processor webhook.
///
/// Redelivery with the same reference returns the booking unchanged.
pub async fn payment_confirmed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PaymentConfirmedRequest>,
) -> Result<Json<BookingView>, ApiError> {
    let event = BookingEvent::PaymentConfirmed {
        reference: body.reference,
    };
    apply(&state, id, event, ActorRole::System).await
}

/// POST /bookings/{id}/accept - Provider takes the job.
pub async fn accept(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AcceptRequest>,
) -> Result<Json<BookingView>, ApiError> {
    let event = BookingEvent::ProviderAccepted {
        provider_id: body.provider_id,
    };
    apply(&state, id, event, ActorRole::Provider).await
}

/// POST /bookings/{id}/complete - Arrival confirmed or job marked done.
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<BookingView>, ApiError> {
    apply(&state, id, BookingEvent::ServiceCompleted, body.actor).await
}

/// POST /bookings/{id}/cancel - Customer cancels.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, ApiError> {
    apply(&state, id, BookingEvent::CustomerCancelled, ActorRole::Customer).await
}

/// POST /ratings - One side rates the other after completion.
pub async fn submit_rating(
    State(state): State<AppState>,
    Json(body): Json<RatingSubmission>,
) -> Result<(StatusCode, Json<RatingRecord>), ApiError> {
    let record = state.engine.submit_rating(body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn apply(
    state: &AppState,
    id: String,
    event: BookingEvent,
    actor: ActorRole,
) -> Result<Json<BookingView>, ApiError> {
    let booking_id = BookingId::new(id);
    state.engine.transition(&booking_id, event, actor).await?;
    let view = state.engine.view(&booking_id).await?;
    Ok(Json(view))
}
