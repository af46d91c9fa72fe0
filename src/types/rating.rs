//! Rating types

use super::booking::BookingId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest accepted rating score
pub const MIN_SCORE: i64 = 1;
/// Highest accepted rating score
pub const MAX_SCORE: i64 = 5;

/// Which side of the booking submits a rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaterRole {
    /// Customer rating the provider
    Customer,
    /// Provider rating the customer
    Provider,
}

impl RaterRole {
    pub fn as_str(self) -> &'static str {
        match self {
            RaterRole::Customer => "customer",
            RaterRole::Provider => "provider",
        }
    }
}

impl fmt::Display for RaterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RaterRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Ok(RaterRole::Customer),
            "provider" => Ok(RaterRole::Provider),
            other => Err(format!("Invalid rater role: '{}'", other)),
        }
    }
}

/// Rating submission as received from a client
///
/// `score` is deliberately wider than the stored type so out-of-range
/// input reaches the rating gate and is rejected with a precise error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSubmission {
    pub booking_id: BookingId,
    pub rater_role: RaterRole,
    pub score: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Stored rating; at most one per (booking, rater role)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub booking_id: BookingId,
    pub rater_role: RaterRole,
    /// Integer score in [1, 5]
    pub score: u8,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}
