//! Core types module
//!
//! Contains all domain types used throughout the booking escrow engine.

pub mod booking;
pub mod error;
pub mod escrow;
pub mod event;
pub mod rating;
pub mod replay;

pub use booking::{Booking, BookingId, BookingStatus, NewBooking, PartyId, PendingEffect, RatingStatus};
pub use error::{
    BookingError, ConfigError, JournalError, LedgerError, ProcessorError, RatingError, ReplayError,
    SchedulerError,
};
pub use escrow::{
    CommissionRate, EscrowSplit, EscrowState, EscrowTransaction, LedgerOperation, MinorUnits,
};
pub use event::{ActorRole, BookingEvent};
pub use rating::{RaterRole, RatingRecord, RatingSubmission, MAX_SCORE, MIN_SCORE};
pub use replay::{ReplayAction, ReplayRecord};
