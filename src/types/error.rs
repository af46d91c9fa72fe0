//! Error types for the booking escrow engine
//!
//! This module defines all error types that can occur while driving a
//! booking through its lifecycle. Errors carry the booking id and enough
//! structured detail (current state, attempted event) to render a precise
//! user message.
//!
//! # Error Categories
//!
//! - **Transition Errors**: event not valid in the current state, wrong actor
//! - **Ledger Errors**: escrow misuse (programming errors) and processor failures
//! - **Scheduler Errors**: timer misuse (programming errors)
//! - **Rating Errors**: user input errors, surfaced directly
//! - **Journal Errors**: write-ahead log I/O and decoding failures
//! - **Config Errors**: invalid engine configuration

use super::booking::{BookingId, BookingStatus};
use super::escrow::{EscrowState, LedgerOperation};
use super::event::ActorRole;
use super::rating::RaterRole;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from escrow ledger operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// An escrow transaction already exists for the booking
    ///
    /// Ledger misuse; the state machine never holds twice.
    #[error("Escrow already held for booking {booking_id}")]
    AlreadyHeld {
        /// Booking the hold was attempted for
        booking_id: BookingId,
    },

    /// The transaction is not in a state that allows the operation
    #[error("Cannot {operation} escrow for booking {booking_id}: transaction is {state}")]
    InvalidLedgerState {
        /// Booking the operation was attempted for
        booking_id: BookingId,
        /// Current escrow state
        state: EscrowState,
        /// Operation that was rejected
        operation: LedgerOperation,
    },

    /// No escrow transaction exists for the booking
    #[error("No escrow transaction for booking {booking_id}")]
    NotFound {
        /// Booking that was looked up
        booking_id: BookingId,
    },

    /// The payment processor failed and the retry budget is exhausted
    ///
    /// Transient failures are retried inside the ledger; this error is only
    /// surfaced once every attempt has failed.
    #[error("Payment processor failed to {operation} for booking {booking_id} after {attempts} attempt(s): {message}")]
    PaymentProcessor {
        /// Booking the transfer belongs to
        booking_id: BookingId,
        /// Operation that failed
        operation: LedgerOperation,
        /// Number of attempts made
        attempts: u32,
        /// Last processor error message
        message: String,
    },

    /// The payment processor refused the transfer
    ///
    /// Not retried by the ledger.
    #[error("Payment processor rejected {operation} for booking {booking_id}: {message}")]
    PaymentRejected {
        /// Booking the transfer belongs to
        booking_id: BookingId,
        /// Operation that was refused
        operation: LedgerOperation,
        /// Processor's reason
        message: String,
    },
}

/// Errors from the timeout scheduler
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// A timer is already armed for the booking
    ///
    /// Scheduler misuse; callers must cancel before re-starting.
    #[error("Timer already running for booking {booking_id}")]
    DuplicateTimer {
        /// Booking with the armed timer
        booking_id: BookingId,
    },
}

/// Errors from the write-ahead journal
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JournalError {
    /// Reading or writing the journal failed
    #[error("Journal I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// An entry could not be encoded
    #[error("Journal serialization error: {message}")]
    Serialization {
        /// Description of the encoding error
        message: String,
    },

    /// A journal line other than the last one could not be decoded
    #[error("Corrupt journal entry at line {line}: {message}")]
    Corrupt {
        /// 1-based line number
        line: usize,
        /// Decoder message
        message: String,
    },
}

impl From<std::io::Error> for JournalError {
    fn from(error: std::io::Error) -> Self {
        JournalError::Io {
            message: error.to_string(),
        }
    }
}

/// Errors from booking lifecycle operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    /// No booking with the given id
    #[error("Booking {booking_id} not found")]
    NotFound {
        /// Booking that was looked up
        booking_id: BookingId,
    },

    /// A booking with the given id already exists
    #[error("Booking {booking_id} already exists")]
    AlreadyExists {
        /// Conflicting booking id
        booking_id: BookingId,
    },

    /// The event is not defined for the booking's current status
    ///
    /// Surfaced to the caller, never retried and never silently ignored.
    #[error("Event '{event}' is not allowed for booking {booking_id} in state '{current}'")]
    InvalidTransition {
        /// Booking the event was delivered to
        booking_id: BookingId,
        /// Status at the time of delivery
        current: BookingStatus,
        /// Name of the rejected event
        event: String,
    },

    /// The actor may not deliver this event for this booking
    #[error("Actor '{actor}' may not apply '{event}' to booking {booking_id}")]
    ActorNotPermitted {
        /// Booking the event was delivered to
        booking_id: BookingId,
        /// Actor that delivered the event
        actor: ActorRole,
        /// Name of the rejected event
        event: String,
    },

    /// A ledger side effect is parked awaiting retry
    ///
    /// Only a redelivery of the parked event, or an explicit retry, is
    /// accepted until it completes.
    #[error("Booking {booking_id} has a pending {operation} awaiting retry")]
    EffectPending {
        /// Booking with the parked effect
        booking_id: BookingId,
        /// Operation still to perform
        operation: LedgerOperation,
    },

    /// The booking request is malformed
    #[error("Invalid booking request: {message}")]
    Validation {
        /// Description of the problem
        message: String,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl BookingError {
    /// Create an InvalidTransition error
    pub fn invalid_transition(booking_id: &BookingId, current: BookingStatus, event: &str) -> Self {
        BookingError::InvalidTransition {
            booking_id: booking_id.clone(),
            current,
            event: event.to_string(),
        }
    }

    /// Create an ActorNotPermitted error
    pub fn actor_not_permitted(booking_id: &BookingId, actor: ActorRole, event: &str) -> Self {
        BookingError::ActorNotPermitted {
            booking_id: booking_id.clone(),
            actor,
            event: event.to_string(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(booking_id: &BookingId) -> Self {
        BookingError::NotFound {
            booking_id: booking_id.clone(),
        }
    }

    /// Create a Validation error
    pub fn validation(message: &str) -> Self {
        BookingError::Validation {
            message: message.to_string(),
        }
    }

    /// Whether the failure leaves money movement parked for retry
    pub fn is_payment_pending(&self) -> bool {
        matches!(
            self,
            BookingError::EffectPending { .. }
                | BookingError::Ledger(LedgerError::PaymentProcessor { .. })
        )
    }

    /// Whether the processor refused the money movement
    pub fn is_payment_rejected(&self) -> bool {
        matches!(self, BookingError::Ledger(LedgerError::PaymentRejected { .. }))
    }

    /// Message suitable for showing to the customer or provider
    ///
    /// A processor failure is presented as "payment pending", never as a
    /// lost booking.
    pub fn user_message(&self) -> String {
        match self {
            e if e.is_payment_pending() => {
                "Payment pending, we are retrying with the payment processor".to_string()
            }
            e if e.is_payment_rejected() => {
                "Payment declined by the payment processor, our team will follow up".to_string()
            }
            BookingError::InvalidTransition { current, event, .. } => format!(
                "This booking is {} and cannot accept '{}'",
                current.user_message().to_lowercase(),
                event
            ),
            BookingError::ActorNotPermitted { .. } => {
                "You are not allowed to perform this action on this booking".to_string()
            }
            BookingError::NotFound { .. } => "Booking not found".to_string(),
            other => other.to_string(),
        }
    }
}

/// Errors from rating submission
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RatingError {
    /// No booking with the given id
    #[error("Booking {booking_id} not found")]
    NotFound {
        /// Booking that was looked up
        booking_id: BookingId,
    },

    /// Ratings open only once the booking is completed
    #[error("Booking {booking_id} is {current}; ratings open after completion")]
    BookingNotCompleted {
        /// Booking being rated
        booking_id: BookingId,
        /// Current status
        current: BookingStatus,
    },

    /// This side already rated the booking
    #[error("Booking {booking_id} was already rated by the {rater_role}")]
    AlreadyRated {
        /// Booking being rated
        booking_id: BookingId,
        /// Side that already rated
        rater_role: RaterRole,
    },

    /// Score outside [1, 5]
    #[error("Invalid score {score}: must be an integer from 1 to 5")]
    InvalidScore {
        /// Submitted score
        score: i64,
    },

    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// Errors from engine configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Commission rate outside [0, 1]
    #[error("Invalid commission rate {rate}: must be a fraction between 0 and 1")]
    InvalidCommissionRate {
        /// Rejected rate
        rate: Decimal,
    },

    /// The acceptance window must be positive and representable
    #[error("Invalid acceptance window of {seconds} seconds")]
    InvalidAcceptanceWindow {
        /// Rejected window length
        seconds: u64,
    },

    /// At least one processor attempt is required
    #[error("Retry budget must allow at least one attempt")]
    ZeroRetryBudget,
}

/// Error reported by a payment processor call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessorError {
    /// Temporary failure; safe to retry with the same idempotency key
    #[error("transient processor failure: {0}")]
    Transient(String),

    /// The processor refused the request; retrying will not help
    #[error("processor rejected request: {0}")]
    Rejected(String),
}

/// Error applying a replayed CSV record
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Rating(#[from] RatingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_transition(
        BookingError::invalid_transition(&BookingId::new("b1"), BookingStatus::Completed, "customer_cancelled"),
        "Event 'customer_cancelled' is not allowed for booking b1 in state 'completed'"
    )]
    #[case::actor_not_permitted(
        BookingError::actor_not_permitted(&BookingId::new("b1"), ActorRole::Customer, "provider_accepted"),
        "Actor 'customer' may not apply 'provider_accepted' to booking b1"
    )]
    #[case::not_found(
        BookingError::not_found(&BookingId::new("missing")),
        "Booking missing not found"
    )]
    #[case::effect_pending(
        BookingError::EffectPending { booking_id: BookingId::new("b1"), operation: LedgerOperation::Release },
        "Booking b1 has a pending release awaiting retry"
    )]
    #[case::already_held(
        BookingError::Ledger(LedgerError::AlreadyHeld { booking_id: BookingId::new("b1") }),
        "Escrow already held for booking b1"
    )]
    #[case::invalid_ledger_state(
        BookingError::Ledger(LedgerError::InvalidLedgerState {
            booking_id: BookingId::new("b1"),
            state: EscrowState::Refunded,
            operation: LedgerOperation::Release,
        }),
        "Cannot release escrow for booking b1: transaction is refunded"
    )]
    #[case::duplicate_timer(
        BookingError::Scheduler(SchedulerError::DuplicateTimer { booking_id: BookingId::new("b1") }),
        "Timer already running for booking b1"
    )]
    fn test_booking_error_display(#[case] error: BookingError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::not_completed(
        RatingError::BookingNotCompleted { booking_id: BookingId::new("b1"), current: BookingStatus::Confirmed },
        "Booking b1 is confirmed; ratings open after completion"
    )]
    #[case::already_rated(
        RatingError::AlreadyRated { booking_id: BookingId::new("b1"), rater_role: RaterRole::Provider },
        "Booking b1 was already rated by the provider"
    )]
    #[case::invalid_score(
        RatingError::InvalidScore { score: 6 },
        "Invalid score 6: must be an integer from 1 to 5"
    )]
    fn test_rating_error_display(#[case] error: RatingError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_processor_failure_is_presented_as_payment_pending() {
        let error = BookingError::Ledger(LedgerError::PaymentProcessor {
            booking_id: BookingId::new("b1"),
            operation: LedgerOperation::Release,
            attempts: 5,
            message: "timeout".to_string(),
        });

        assert!(error.is_payment_pending());
        assert_eq!(
            error.user_message(),
            "Payment pending, we are retrying with the payment processor"
        );
    }

    #[test]
    fn test_processor_rejection_is_not_presented_as_pending() {
        let error = BookingError::Ledger(LedgerError::PaymentRejected {
            booking_id: BookingId::new("b1"),
            operation: LedgerOperation::Hold,
            message: "card declined".to_string(),
        });

        assert!(!error.is_payment_pending());
        assert!(error.is_payment_rejected());
        assert_eq!(
            error.user_message(),
            "Payment declined by the payment processor, our team will follow up"
        );
    }

    #[test]
    fn test_invalid_transition_user_message_names_state() {
        let error = BookingError::invalid_transition(
            &BookingId::new("b1"),
            BookingStatus::CancelledTimeout,
            "provider_accepted",
        );
        assert_eq!(
            error.user_message(),
            "This booking is no-show, fully refunded and cannot accept 'provider_accepted'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: JournalError = io_error.into();
        assert!(matches!(error, JournalError::Io { .. }));
        assert_eq!(error.to_string(), "Journal I/O error: Permission denied");
    }
}
