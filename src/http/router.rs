//! Axum router configuration.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::http::AppState;

/// Build the API router with request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(handlers::create_booking))
        .route("/bookings/{id}", get(handlers::get_booking))
        .route(
            "/bookings/{id}/payment-confirmed",
            post(handlers::payment_confirmed),
        )
        .route("/bookings/{id}/accept", post(handlers::accept))
        .route("/bookings/{id}/complete", post(handlers::complete))
        .route("/bookings/{id}/cancel", post(handlers::cancel))
        .route("/ratings", post(handlers::submit_rating))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BookingEngine, EngineConfig, EngineParts, SimulatedProcessor};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let config = EngineConfig::new(Decimal::new(15, 2)).unwrap();
        let engine = BookingEngine::new(
            config,
            EngineParts::in_memory(Arc::new(SimulatedProcessor::new())),
        );
        build_router(AppState::new(Arc::new(engine)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let app = router();

        let response = app
            .clone()
            .oneshot(post_json(
                "/bookings",
                json!({ "customer_id": "cust-1", "budget_amount": 5000 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "pending");

        let response = app
            .oneshot(
                Request::get(format!("/bookings/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(view["booking"]["id"], id.as_str());
        assert_eq!(view["message"], "Awaiting payment");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = router()
            .oneshot(post_json("/bookings/nope/cancel", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], "BOOKING_NOT_FOUND");
        assert_eq!(body["detail"]["booking_id"], "nope");
    }

    #[tokio::test]
    async fn test_rating_score_out_of_range() {
        let app = router();
        let response = app
            .oneshot(post_json(
                "/ratings",
                json!({ "booking_id": "b1", "rater_role": "customer", "score": 9 }),
            ))
            .await
            .unwrap();

        // the booking check runs before the score check
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
