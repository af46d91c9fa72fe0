//! Rating gate
//!
//! Each side of a completed booking may rate the other exactly once.
//! Checking and recording are split so the engine can journal the rating
//! between the two while it holds the booking lock.

use crate::types::{
    Booking, BookingId, BookingStatus, RaterRole, RatingError, RatingRecord, MAX_SCORE, MIN_SCORE,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

/// Store of accepted ratings, one per (booking, rater role)
#[derive(Debug, Default)]
pub struct RatingGate {
    records: DashMap<(BookingId, RaterRole), RatingRecord>,
}

impl RatingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a submission against the booking and build the record
    ///
    /// Checks run in order: booking completed, not yet rated by this role,
    /// score within range.
    pub fn prepare(
        &self,
        booking: &Booking,
        rater_role: RaterRole,
        score: i64,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<RatingRecord, RatingError> {
        if booking.status != BookingStatus::Completed {
            return Err(RatingError::BookingNotCompleted {
                booking_id: booking.id.clone(),
                current: booking.status,
            });
        }

        let key = (booking.id.clone(), rater_role);
        if booking.rating_status.is_rated(rater_role) || self.records.contains_key(&key) {
            return Err(RatingError::AlreadyRated {
                booking_id: booking.id.clone(),
                rater_role,
            });
        }

        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(RatingError::InvalidScore { score });
        }
        let score = u8::try_from(score).map_err(|_| RatingError::InvalidScore { score })?;

        Ok(RatingRecord {
            booking_id: booking.id.clone(),
            rater_role,
            score,
            comment: comment.filter(|c| !c.trim().is_empty()),
            submitted_at: at,
        })
    }

    /// Store a prepared record and flag the booking
    pub fn record(&self, booking: &mut Booking, record: RatingRecord) -> Result<(), RatingError> {
        match self
            .records
            .entry((record.booking_id.clone(), record.rater_role))
        {
            Entry::Occupied(_) => Err(RatingError::AlreadyRated {
                booking_id: record.booking_id,
                rater_role: record.rater_role,
            }),
            Entry::Vacant(slot) => {
                booking.rating_status.mark(record.rater_role);
                info!(
                    booking_id = %record.booking_id,
                    rater_role = %record.rater_role,
                    score = record.score,
                    "rating recorded"
                );
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Reinstate a record rebuilt from the journal
    pub fn restore(&self, record: RatingRecord) {
        self.records
            .insert((record.booking_id.clone(), record.rater_role), record);
    }

    /// Ratings for a booking, customer first
    pub fn for_booking(&self, booking_id: &BookingId) -> Vec<RatingRecord> {
        [RaterRole::Customer, RaterRole::Provider]
            .into_iter()
            .filter_map(|role| {
                self.records
                    .get(&(booking_id.clone(), role))
                    .map(|entry| entry.value().clone())
            })
            .collect()
    }
}
