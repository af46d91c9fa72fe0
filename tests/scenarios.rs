//! Lifecycle scenarios driven through the engine API
//!
//! Covers the acceptance scenarios, restart determinism with a file journal
//! and rating exclusivity under concurrent submission.

use booking_escrow_engine::core::{
    BookingEngine, EngineConfig, EngineParts, FileJournal, RecordingNotifier, SimulatedProcessor,
};
use booking_escrow_engine::core::NotificationKind;
use booking_escrow_engine::types::{
    ActorRole, BookingError, BookingEvent, BookingId, BookingStatus, EscrowState, NewBooking,
    RaterRole, RatingError, RatingSubmission,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> EngineConfig {
    EngineConfig::new(Decimal::new(15, 2)).unwrap()
}

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn request(budget_amount: u64) -> NewBooking {
    NewBooking {
        customer_id: "cust-1".to_string(),
        provider_id: None,
        service_type: "plumbing".to_string(),
        location: "4 Elm Row".to_string(),
        description: "leaking tap".to_string(),
        budget_amount,
    }
}

fn paid() -> BookingEvent {
    BookingEvent::PaymentConfirmed {
        reference: "pay_123".to_string(),
    }
}

fn accepted() -> BookingEvent {
    BookingEvent::ProviderAccepted {
        provider_id: "prov-1".to_string(),
    }
}

async fn engine_with_booking() -> (BookingEngine, Arc<SimulatedProcessor>, BookingId) {
    let processor = Arc::new(SimulatedProcessor::new());
    let engine = BookingEngine::new(config(), EngineParts::in_memory(processor.clone()));
    let id = BookingId::new("bk-1");
    engine
        .create_booking_with_id(id.clone(), request(10_000), t(0))
        .await
        .unwrap();
    (engine, processor, id)
}

#[tokio::test]
async fn scenario_a_payment_accept_complete_releases_split() {
    let (engine, _, id) = engine_with_booking().await;

    engine
        .transition_at(&id, paid(), ActorRole::System, t(10))
        .await
        .unwrap();
    let escrow = engine.escrow_for(&id).unwrap();
    assert_eq!(escrow.total_amount, 10_000);
    assert_eq!(escrow.provider_amount, 8_500);
    assert_eq!(escrow.commission_amount, 1_500);
    assert_eq!(escrow.state, EscrowState::Held);

    engine
        .transition_at(&id, accepted(), ActorRole::Provider, t(60))
        .await
        .unwrap();
    let booking = engine
        .transition_at(&id, BookingEvent::ServiceCompleted, ActorRole::Customer, t(3_600))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Completed);
    let escrow = engine.escrow_for(&id).unwrap();
    assert_eq!(escrow.state, EscrowState::Released);
    assert!(escrow.is_conserved());
}

#[tokio::test]
async fn scenario_b_no_acceptance_within_window_refunds() {
    let (engine, _, id) = engine_with_booking().await;
    engine
        .transition_at(&id, paid(), ActorRole::System, t(10))
        .await
        .unwrap();

    let not_yet = engine
        .expire_if_due(&id, t(10) + Duration::hours(4) - Duration::seconds(1))
        .await
        .unwrap();
    assert!(not_yet.is_none());

    let expired = engine
        .expire_if_due(&id, t(10) + Duration::hours(4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(expired.status, BookingStatus::CancelledTimeout);
    assert_eq!(expired.user_message(), "No-show, fully refunded");
    assert_eq!(engine.escrow_for(&id).unwrap().state, EscrowState::Refunded);
}

#[tokio::test]
async fn timeout_delivered_inside_window_keeps_funds_held() {
    let (engine, processor, id) = engine_with_booking().await;
    engine
        .transition_at(&id, paid(), ActorRole::System, t(10))
        .await
        .unwrap();

    let early = engine
        .transition_at(&id, BookingEvent::TimeoutExpired, ActorRole::System, t(70))
        .await;

    assert!(matches!(
        early,
        Err(BookingError::InvalidTransition {
            current: BookingStatus::AwaitingAcceptance,
            ..
        })
    ));
    let booking = engine.get_booking(&id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::AwaitingAcceptance);
    assert_eq!(engine.escrow_for(&id).unwrap().state, EscrowState::Held);
    assert_eq!(processor.transfers(), 1);

    let late = engine
        .transition_at(
            &id,
            BookingEvent::TimeoutExpired,
            ActorRole::System,
            t(10) + Duration::hours(5),
        )
        .await
        .unwrap();
    assert_eq!(late.status, BookingStatus::CancelledTimeout);
    assert_eq!(late.cancelled_at, Some(t(10) + Duration::hours(4)));
}

#[tokio::test]
async fn scenario_c_rating_before_completion_is_rejected() {
    let (engine, _, id) = engine_with_booking().await;

    let result = engine
        .submit_rating_at(
            RatingSubmission {
                booking_id: id.clone(),
                rater_role: RaterRole::Customer,
                score: 5,
                comment: None,
            },
            t(5),
        )
        .await;

    assert!(matches!(
        result,
        Err(RatingError::BookingNotCompleted {
            current: BookingStatus::Pending,
            ..
        })
    ));
}

#[tokio::test]
async fn scenario_d_duplicate_webhook_is_idempotent() {
    let (engine, processor, id) = engine_with_booking().await;

    let first = engine
        .transition_at(&id, paid(), ActorRole::System, t(10))
        .await
        .unwrap();
    let second = engine
        .transition_at(&id, paid(), ActorRole::System, t(11))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.escrows().len(), 1);
    assert_eq!(processor.transfers(), 1);
}

#[tokio::test]
async fn completion_sends_rating_prompts() {
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = BookingEngine::new(
        config(),
        EngineParts::in_memory(Arc::new(SimulatedProcessor::new())).with_notifier(notifier.clone()),
    );
    let id = BookingId::new("bk-n");
    engine
        .create_booking_with_id(id.clone(), request(2_000), t(0))
        .await
        .unwrap();
    engine
        .transition_at(&id, paid(), ActorRole::System, t(1))
        .await
        .unwrap();
    engine
        .transition_at(&id, accepted(), ActorRole::Provider, t(2))
        .await
        .unwrap();
    engine
        .transition_at(&id, BookingEvent::ServiceCompleted, ActorRole::Provider, t(3))
        .await
        .unwrap();

    let kinds = notifier.kinds_for(&id);
    assert!(kinds.contains(&NotificationKind::PaymentHeld));
    assert!(kinds.contains(&NotificationKind::ServiceCompleted));
    assert!(kinds.contains(&NotificationKind::RatingPrompt(RaterRole::Customer)));
    assert!(kinds.contains(&NotificationKind::RatingPrompt(RaterRole::Provider)));
}

#[tokio::test]
async fn restart_expires_at_deadline_exactly_once() {
    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("bookings.journal");
    let processor = Arc::new(SimulatedProcessor::new());
    let id = BookingId::new("bk-restart");

    {
        let journal = Arc::new(FileJournal::open(&journal_path).await.unwrap());
        let engine = BookingEngine::new(
            config(),
            EngineParts::in_memory(processor.clone()).with_journal(journal),
        );
        engine
            .create_booking_with_id(id.clone(), request(10_000), t(0))
            .await
            .unwrap();
        engine
            .transition_at(&id, paid(), ActorRole::System, t(10))
            .await
            .unwrap();
    }

    let deadline = t(10) + Duration::hours(4);
    let mut outcomes = Vec::new();
    for restart_at in [deadline + Duration::minutes(1), deadline + Duration::hours(30)] {
        let journal = Arc::new(FileJournal::open(&journal_path).await.unwrap());
        let engine = BookingEngine::new(
            config(),
            EngineParts::in_memory(processor.clone()).with_journal(journal),
        );
        let report = engine.recover(restart_at).await.unwrap();
        assert_eq!(report.bookings, 1);

        let booking = engine.get_booking(&id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::CancelledTimeout);
        assert_eq!(booking.cancelled_at, Some(deadline));
        outcomes.push((booking, engine.escrow_for(&id).unwrap()));
    }

    // hold plus one refund, however many times recovery runs
    assert_eq!(processor.transfers(), 2);
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn restart_before_deadline_rearms_timer() {
    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("bookings.journal");
    let id = BookingId::new("bk-live");

    {
        let journal = Arc::new(FileJournal::open(&journal_path).await.unwrap());
        let engine = BookingEngine::new(
            config(),
            EngineParts::in_memory(Arc::new(SimulatedProcessor::new())).with_journal(journal),
        );
        engine
            .create_booking_with_id(id.clone(), request(10_000), t(0))
            .await
            .unwrap();
        engine
            .transition_at(&id, paid(), ActorRole::System, t(10))
            .await
            .unwrap();
    }

    let journal = Arc::new(FileJournal::open(&journal_path).await.unwrap());
    let engine = BookingEngine::new(
        config(),
        EngineParts::in_memory(Arc::new(SimulatedProcessor::new())).with_journal(journal),
    );
    let report = engine.recover(t(20)).await.unwrap();

    assert_eq!(report.sweep.rearmed, vec![id.clone()]);
    assert_eq!(
        engine.scheduler().deadline(&id),
        Some(t(10) + Duration::hours(4))
    );
    let booking = engine
        .transition_at(&id, accepted(), ActorRole::Provider, t(30))
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ratings_accept_exactly_one_per_side() {
    let (engine, _, id) = engine_with_booking().await;
    engine
        .transition_at(&id, paid(), ActorRole::System, t(1))
        .await
        .unwrap();
    engine
        .transition_at(&id, accepted(), ActorRole::Provider, t(2))
        .await
        .unwrap();
    engine
        .transition_at(&id, BookingEvent::ServiceCompleted, ActorRole::Customer, t(3))
        .await
        .unwrap();

    let engine = Arc::new(engine);
    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let rater_role = if i % 2 == 0 {
                RaterRole::Customer
            } else {
                RaterRole::Provider
            };
            engine
                .submit_rating(RatingSubmission {
                    booking_id: id,
                    rater_role,
                    score: 1 + (i % 5),
                    comment: None,
                })
                .await
        }));
    }

    let mut accepted = 0;
    let mut already_rated = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(RatingError::AlreadyRated { .. }) => already_rated += 1,
            Err(other) => panic!("unexpected rating error: {other}"),
        }
    }

    assert_eq!(accepted, 2);
    assert_eq!(already_rated, 14);
    let booking = engine.get_booking(&id).await.unwrap();
    assert!(booking.rating_status.is_closed());
    assert_eq!(engine.ratings_for(&id).len(), 2);
}

#[tokio::test]
async fn terminal_booking_rejects_further_events() {
    let (engine, _, id) = engine_with_booking().await;
    engine
        .transition_at(&id, paid(), ActorRole::System, t(1))
        .await
        .unwrap();
    engine
        .transition_at(&id, BookingEvent::CustomerCancelled, ActorRole::Customer, t(2))
        .await
        .unwrap();

    for event in [accepted(), BookingEvent::ServiceCompleted, BookingEvent::TimeoutExpired] {
        let actor = match event {
            BookingEvent::ProviderAccepted { .. } => ActorRole::Provider,
            BookingEvent::TimeoutExpired => ActorRole::System,
            _ => ActorRole::Customer,
        };
        let result = engine.transition_at(&id, event, actor, t(3)).await;
        assert!(matches!(
            result,
            Err(BookingError::InvalidTransition {
                current: BookingStatus::CancelledManual,
                ..
            })
        ));
    }
    let escrow = engine.escrow_for(&id).unwrap();
    assert_eq!(escrow.state, EscrowState::Refunded);
    assert_eq!(escrow.refund_amount, Some(10_000));
}
