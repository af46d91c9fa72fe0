//! HTTP/REST API layer.
//!
//! Thin axum adapters over `BookingEngine`; all lifecycle rules live in the
//! engine.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

use std::sync::Arc;

use crate::core::BookingEngine;

pub use error::ApiError;
pub use router::build_router;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
}

impl AppState {
    pub fn new(engine: Arc<BookingEngine>) -> Self {
        Self { engine }
    }
}
