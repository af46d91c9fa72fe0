//! CSV format handling for replay rows and booking output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to replay records
//! - Booking summary serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{
    ActorRole, Booking, BookingId, EscrowTransaction, MinorUnits, RaterRole, ReplayAction,
    ReplayRecord,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;

/// Header of the booking summary output
pub const OUTPUT_HEADER: [&str; 10] = [
    "booking",
    "status",
    "customer",
    "provider",
    "total",
    "provider_amount",
    "commission_amount",
    "escrow",
    "customer_rated",
    "provider_rated",
];

/// CSV record structure for deserialization
///
/// Matches the replay format with columns:
/// at, booking, event, actor, party, amount, reference, score, comment.
/// Everything after `event` is optional; which fields an event needs is
/// checked in `convert_csv_record`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub at: String,
    pub booking: String,
    pub event: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Convert a CsvRecord to a ReplayRecord
///
/// # Arguments
///
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// * `Ok(ReplayRecord)` - Successfully converted record
/// * `Err(String)` - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<ReplayRecord, String> {
    let booking = csv_record.booking.trim();
    if booking.is_empty() {
        return Err("Missing booking id".to_string());
    }

    let seconds: i64 = csv_record.at.trim().parse().map_err(|_| {
        format!(
            "Invalid timestamp '{}' for booking {}",
            csv_record.at, booking
        )
    })?;
    let at = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
        format!(
            "Timestamp {} out of range for booking {}",
            seconds, booking
        )
    })?;

    let event = csv_record.event.trim().to_lowercase();
    let requires = |field: &str, value: &Option<String>| -> Result<String, String> {
        present(value)
            .map(str::to_string)
            .ok_or_else(|| format!("{} event for booking {} requires {}", event, booking, field))
    };

    let action = match event.as_str() {
        "create" => {
            let customer_id = requires("a party", &csv_record.party)?;
            let raw_amount = requires("an amount", &csv_record.amount)?;
            let budget_amount: MinorUnits = raw_amount.parse().map_err(|_| {
                format!("Invalid amount '{}' for booking {}", raw_amount, booking)
            })?;
            ReplayAction::Create {
                customer_id,
                budget_amount,
            }
        }
        "payment_confirmed" => ReplayAction::PaymentConfirmed {
            reference: requires("a reference", &csv_record.reference)?,
        },
        "accept" => ReplayAction::Accept {
            provider_id: requires("a party", &csv_record.party)?,
        },
        "complete" => ReplayAction::Complete,
        "cancel" => ReplayAction::Cancel,
        "timeout" => ReplayAction::Timeout,
        "tick" => ReplayAction::Tick,
        "rate" => {
            let rater_role: RaterRole = requires("an actor", &csv_record.actor)?.parse()?;
            let raw_score = requires("a score", &csv_record.score)?;
            let score: i64 = raw_score.parse().map_err(|_| {
                format!("Invalid score '{}' for booking {}", raw_score, booking)
            })?;
            ReplayAction::Rate {
                rater_role,
                score,
                comment: present(&csv_record.comment).map(str::to_string),
            }
        }
        _ => {
            return Err(format!(
                "Invalid event type: '{}' for booking {}",
                csv_record.event, booking
            ))
        }
    };

    let actor = match (&action, present(&csv_record.actor)) {
        (ReplayAction::Rate { .. }, _) | (_, None) => action.default_actor(),
        (_, Some(actor)) => actor.parse::<ActorRole>()?,
    };

    Ok(ReplayRecord {
        at,
        booking: BookingId::new(booking),
        actor,
        action,
    })
}

/// Write booking summaries to CSV format
///
/// One row per booking, sorted by booking id for deterministic output.
/// Split columns are empty and `escrow` is `none` when no payment was held.
///
/// # Arguments
///
/// * `bookings` - Bookings to write
/// * `escrows` - Escrow transactions, matched to bookings by id
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_bookings_csv(
    bookings: &[Booking],
    escrows: &[EscrowTransaction],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(OUTPUT_HEADER)
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&Booking> = bookings.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    for booking in sorted {
        let escrow = escrows.iter().find(|escrow| escrow.booking_id == booking.id);
        let (provider_amount, commission_amount, escrow_state) = match escrow {
            Some(escrow) => (
                escrow.provider_amount.to_string(),
                escrow.commission_amount.to_string(),
                escrow.state.as_str(),
            ),
            None => (String::new(), String::new(), "none"),
        };

        writer
            .write_record([
                booking.id.to_string(),
                booking.status.to_string(),
                booking.customer_id.clone(),
                booking.provider_id.clone().unwrap_or_default(),
                booking.budget_amount.to_string(),
                provider_amount,
                commission_amount,
                escrow_state.to_string(),
                booking.rating_status.customer_rated.to_string(),
                booking.rating_status.provider_rated.to_string(),
            ])
            .map_err(|e| format!("Failed to write booking {}: {}", booking.id, e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush CSV output: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookingStatus, CommissionRate, NewBooking};
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn csv_record(event: &str) -> CsvRecord {
        CsvRecord {
            at: "100".to_string(),
            booking: "b1".to_string(),
            event: event.to_string(),
            actor: None,
            party: None,
            amount: None,
            reference: None,
            score: None,
            comment: None,
        }
    }

    #[test]
    fn test_convert_create() {
        let record = convert_csv_record(CsvRecord {
            party: Some("cust-1".to_string()),
            amount: Some(" 10000 ".to_string()),
            ..csv_record("create")
        })
        .unwrap();

        assert_eq!(record.booking, BookingId::new("b1"));
        assert_eq!(record.at, DateTime::from_timestamp(100, 0).unwrap());
        assert_eq!(record.actor, ActorRole::Customer);
        assert_eq!(
            record.action,
            ReplayAction::Create {
                customer_id: "cust-1".to_string(),
                budget_amount: 10_000,
            }
        );
    }

    #[rstest]
    #[case::complete("complete", ReplayAction::Complete, ActorRole::Customer)]
    #[case::cancel("CANCEL", ReplayAction::Cancel, ActorRole::Customer)]
    #[case::timeout("timeout", ReplayAction::Timeout, ActorRole::System)]
    #[case::tick("Tick", ReplayAction::Tick, ActorRole::System)]
    fn test_convert_events_without_fields(
        #[case] event: &str,
        #[case] action: ReplayAction,
        #[case] actor: ActorRole,
    ) {
        let record = convert_csv_record(csv_record(event)).unwrap();
        assert_eq!(record.action, action);
        assert_eq!(record.actor, actor);
    }

    #[test]
    fn test_explicit_actor_overrides_default() {
        let record = convert_csv_record(CsvRecord {
            actor: Some("provider".to_string()),
            ..csv_record("complete")
        })
        .unwrap();
        assert_eq!(record.actor, ActorRole::Provider);
    }

    #[test]
    fn test_convert_rate() {
        let record = convert_csv_record(CsvRecord {
            actor: Some("provider".to_string()),
            score: Some("4".to_string()),
            comment: Some("on time".to_string()),
            ..csv_record("rate")
        })
        .unwrap();

        assert_eq!(record.actor, ActorRole::Provider);
        assert_eq!(
            record.action,
            ReplayAction::Rate {
                rater_role: RaterRole::Provider,
                score: 4,
                comment: Some("on time".to_string()),
            }
        );
    }

    #[rstest]
    #[case::bad_timestamp(CsvRecord { at: "soon".to_string(), ..csv_record("tick") }, "Invalid timestamp")]
    #[case::missing_booking(CsvRecord { booking: " ".to_string(), ..csv_record("tick") }, "Missing booking id")]
    #[case::unknown_event(csv_record("refund"), "Invalid event type")]
    #[case::create_without_amount(
        CsvRecord { party: Some("c".to_string()), ..csv_record("create") },
        "requires an amount"
    )]
    #[case::negative_amount(
        CsvRecord { party: Some("c".to_string()), amount: Some("-5".to_string()), ..csv_record("create") },
        "Invalid amount"
    )]
    #[case::payment_without_reference(csv_record("payment_confirmed"), "requires a reference")]
    #[case::accept_without_party(csv_record("accept"), "requires a party")]
    #[case::rate_without_actor(
        CsvRecord { score: Some("5".to_string()), ..csv_record("rate") },
        "requires an actor"
    )]
    #[case::rate_by_system(
        CsvRecord { actor: Some("system".to_string()), score: Some("5".to_string()), ..csv_record("rate") },
        "Invalid rater role"
    )]
    #[case::bad_actor(
        CsvRecord { actor: Some("admin".to_string()), ..csv_record("cancel") },
        "Invalid actor role"
    )]
    fn test_convert_rejects(#[case] record: CsvRecord, #[case] expected: &str) {
        let error = convert_csv_record(record).unwrap_err();
        assert!(error.contains(expected), "{error}");
    }

    fn booking(id: &str, status: BookingStatus) -> Booking {
        let mut booking = Booking::new(
            BookingId::new(id),
            NewBooking {
                customer_id: format!("cust-{id}"),
                provider_id: None,
                service_type: "general".to_string(),
                location: String::new(),
                description: String::new(),
                budget_amount: 10_000,
            },
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        booking.status = status;
        booking
    }

    #[test]
    fn test_write_bookings_csv_sorted_with_escrow() {
        let mut completed = booking("b2", BookingStatus::Completed);
        completed.provider_id = Some("prov-1".to_string());
        completed.rating_status.customer_rated = true;
        let pending = booking("b1", BookingStatus::Pending);

        let mut escrow = EscrowTransaction::held(
            BookingId::new("b2"),
            10_000,
            CommissionRate::new(Decimal::new(15, 2)).unwrap(),
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        escrow.state = crate::types::EscrowState::Released;

        let mut output = Vec::new();
        write_bookings_csv(&[completed, pending], &[escrow], &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "booking,status,customer,provider,total,provider_amount,commission_amount,escrow,customer_rated,provider_rated\n\
             b1,pending,cust-b1,,10000,,,none,false,false\n\
             b2,completed,cust-b2,prov-1,10000,8500,1500,released,true,false\n"
        );
    }

    #[test]
    fn test_write_bookings_csv_empty() {
        let mut output = Vec::new();
        write_bookings_csv(&[], &[], &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "booking,status,customer,provider,total,provider_amount,commission_amount,escrow,customer_rated,provider_rated\n"
        );
    }
}
