//! API error type mapping engine errors to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::types::{BookingError, LedgerError, RatingError};

/// Error returned by every handler
#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    Rating(RatingError),
    /// Malformed request body or path
    Validation(String),
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        ApiError::Booking(e)
    }
}

impl From<RatingError> for ApiError {
    fn from(e: RatingError) -> Self {
        ApiError::Rating(e)
    }
}

impl ApiError {
    /// Status, machine-readable code, message and structured detail
    fn parts(&self) -> (StatusCode, &'static str, String, Value) {
        match self {
            ApiError::Booking(e) if e.is_payment_pending() => (
                StatusCode::ACCEPTED,
                "PAYMENT_PENDING",
                e.user_message(),
                json!({ "reason": e.to_string() }),
            ),
            ApiError::Booking(e) if e.is_payment_rejected() => (
                StatusCode::PAYMENT_REQUIRED,
                "PAYMENT_REJECTED",
                e.user_message(),
                json!({ "reason": e.to_string() }),
            ),
            ApiError::Booking(e @ BookingError::NotFound { booking_id }) => (
                StatusCode::NOT_FOUND,
                "BOOKING_NOT_FOUND",
                e.user_message(),
                json!({ "booking_id": booking_id }),
            ),
            ApiError::Booking(e @ BookingError::AlreadyExists { booking_id }) => (
                StatusCode::CONFLICT,
                "BOOKING_EXISTS",
                e.to_string(),
                json!({ "booking_id": booking_id }),
            ),
            ApiError::Booking(
                e @ BookingError::InvalidTransition {
                    booking_id,
                    current,
                    event,
                },
            ) => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                e.user_message(),
                json!({ "booking_id": booking_id, "current": current, "event": event }),
            ),
            ApiError::Booking(
                e @ BookingError::ActorNotPermitted {
                    booking_id,
                    actor,
                    event,
                },
            ) => (
                StatusCode::FORBIDDEN,
                "ACTOR_NOT_PERMITTED",
                e.user_message(),
                json!({ "booking_id": booking_id, "actor": actor, "event": event }),
            ),
            ApiError::Booking(e @ BookingError::Validation { .. }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                e.to_string(),
                Value::Null,
            ),
            ApiError::Booking(
                e @ BookingError::Ledger(LedgerError::AlreadyHeld { booking_id }),
            ) => (
                StatusCode::CONFLICT,
                "ALREADY_HELD",
                e.to_string(),
                json!({ "booking_id": booking_id }),
            ),
            ApiError::Booking(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                e.to_string(),
                Value::Null,
            ),
            ApiError::Rating(e @ RatingError::NotFound { booking_id }) => (
                StatusCode::NOT_FOUND,
                "BOOKING_NOT_FOUND",
                e.to_string(),
                json!({ "booking_id": booking_id }),
            ),
            ApiError::Rating(e @ RatingError::BookingNotCompleted { booking_id, current }) => (
                StatusCode::CONFLICT,
                "BOOKING_NOT_COMPLETED",
                e.to_string(),
                json!({ "booking_id": booking_id, "current": current }),
            ),
            ApiError::Rating(e @ RatingError::AlreadyRated { booking_id, rater_role }) => (
                StatusCode::CONFLICT,
                "ALREADY_RATED",
                e.to_string(),
                json!({ "booking_id": booking_id, "rater_role": rater_role }),
            ),
            ApiError::Rating(e @ RatingError::InvalidScore { score }) => (
                StatusCode::BAD_REQUEST,
                "INVALID_SCORE",
                e.to_string(),
                json!({ "score": score }),
            ),
            ApiError::Rating(e @ RatingError::Journal(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                e.to_string(),
                Value::Null,
            ),
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                message.clone(),
                Value::Null,
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, detail) = self.parts();
        if status.is_server_error() {
            error!(code, error = %message, "request failed");
        }

        let body = json!({
            "code": code,
            "message": message,
            "detail": detail,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ActorRole, BookingId, BookingStatus, JournalError, LedgerOperation, RaterRole,
    };
    use rstest::rstest;

    fn id() -> BookingId {
        BookingId::new("b1")
    }

    #[rstest]
    #[case::not_found(BookingError::not_found(&id()).into(), StatusCode::NOT_FOUND)]
    #[case::invalid_transition(
        BookingError::invalid_transition(&id(), BookingStatus::Completed, "customer_cancelled").into(),
        StatusCode::CONFLICT
    )]
    #[case::actor(
        BookingError::actor_not_permitted(&id(), ActorRole::Customer, "provider_accepted").into(),
        StatusCode::FORBIDDEN
    )]
    #[case::validation(BookingError::validation("empty").into(), StatusCode::UNPROCESSABLE_ENTITY)]
    #[case::already_held(
        BookingError::Ledger(LedgerError::AlreadyHeld { booking_id: id() }).into(),
        StatusCode::CONFLICT
    )]
    #[case::processor_down(
        BookingError::Ledger(LedgerError::PaymentProcessor {
            booking_id: id(),
            operation: LedgerOperation::Release,
            attempts: 5,
            message: "timeout".to_string(),
        }).into(),
        StatusCode::ACCEPTED
    )]
    #[case::processor_refused(
        BookingError::Ledger(LedgerError::PaymentRejected {
            booking_id: id(),
            operation: LedgerOperation::Hold,
            message: "card declined".to_string(),
        }).into(),
        StatusCode::PAYMENT_REQUIRED
    )]
    #[case::journal(
        BookingError::Journal(JournalError::Io { message: "disk full".to_string() }).into(),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    #[case::rating_not_completed(
        RatingError::BookingNotCompleted { booking_id: id(), current: BookingStatus::Confirmed }.into(),
        StatusCode::CONFLICT
    )]
    #[case::already_rated(
        RatingError::AlreadyRated { booking_id: id(), rater_role: RaterRole::Customer }.into(),
        StatusCode::CONFLICT
    )]
    #[case::invalid_score(RatingError::InvalidScore { score: 7 }.into(), StatusCode::BAD_REQUEST)]
    #[case::bad_body(ApiError::Validation("bad".to_string()), StatusCode::BAD_REQUEST)]
    fn test_status_mapping(#[case] error: ApiError, #[case] expected: StatusCode) {
        assert_eq!(error.status(), expected);
        assert_eq!(error.into_response().status(), expected);
    }

    #[test]
    fn test_invalid_transition_detail() {
        let error: ApiError =
            BookingError::invalid_transition(&id(), BookingStatus::Completed, "customer_cancelled")
                .into();
        let (_, code, _, detail) = error.parts();
        assert_eq!(code, "INVALID_TRANSITION");
        assert_eq!(detail["current"], "completed");
        assert_eq!(detail["event"], "customer_cancelled");
    }
}
