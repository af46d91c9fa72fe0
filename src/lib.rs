//! Booking Escrow Engine Library
//!
//! # Overview
//!
//! Drives service bookings from request to completion while holding the
//! customer's payment in escrow: the money is released to the provider
//! (minus platform commission) on completion, or refunded when the booking
//! is cancelled or no provider accepts within the acceptance window.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Booking, EscrowTransaction, RatingRecord, errors)
//! - [`core`] - Business logic components:
//!   - [`core::state_machine`] - Transition table and invariants
//!   - [`core::escrow_ledger`] - Hold/release/refund with commission split
//!   - [`core::timeout_scheduler`] - Acceptance-window timers
//!   - [`core::rating_gate`] - Two-sided, once-only ratings
//!   - [`core::engine`] - Orchestration with per-booking locking and a write-ahead journal
//! - [`io`] - CSV replay input and booking summary output
//! - [`strategy`] - Sequential and batched concurrent replay pipelines
//! - [`http`] - REST API over the engine
//! - [`cli`] - CLI arguments parsing
//!
//! # Booking States
//!
//! - **pending**: created, awaiting payment
//! - **awaiting_acceptance**: payment held, acceptance window running
//! - **confirmed**: a provider accepted
//! - **completed**: escrow released to the provider
//! - **cancelled_timeout**: nobody accepted in time, fully refunded
//! - **cancelled_manual**: the customer cancelled, refunded

pub mod cli;
pub mod core;
pub mod http;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{BookingEngine, EngineConfig, EngineParts};
pub use io::write_bookings_csv;
pub use types::{
    ActorRole, Booking, BookingError, BookingEvent, BookingId, BookingStatus, EscrowTransaction,
    RaterRole, RatingError, RatingRecord, RatingSubmission,
};
