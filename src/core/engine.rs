//! Booking lifecycle orchestration
//!
//! This module provides the `BookingEngine`, which owns every booking record
//! and drives the escrow ledger, the timeout scheduler and the rating gate as
//! side effects of state machine transitions.
//!
//! # Architecture
//!
//! ```text
//! BookingEngine
//!     ├── DashMap<BookingId, Arc<Mutex<Booking>>>  (one writer per booking)
//!     ├── EscrowLedger                             (money movement)
//!     ├── TimeoutScheduler                         (acceptance window)
//!     ├── RatingGate                               (post-completion ratings)
//!     └── Arc<dyn Journal>                         (write-ahead log)
//! ```
//!
//! # Thread Safety
//!
//! Each booking sits behind its own `tokio::sync::Mutex`, held for the whole
//! transition including the processor call. Operations on one booking are
//! serialized; different bookings never contend.
//!
//! # Side effects
//!
//! A transition with a ledger effect is journaled as an intent first, then
//! the ledger operation runs, then the committed snapshot is journaled and
//! published. If the processor gives up, the booking keeps its previous
//! status with a pending effect until the same event is redelivered or
//! `retry_pending` is called. The maintenance retry skips effects the
//! processor rejected outright.

use crate::core::config::EngineConfig;
use crate::core::escrow_ledger::EscrowLedger;
use crate::core::journal::{JournalEntry, JournalState, MemoryJournal};
use crate::core::notify::{LogNotifier, Notification, NotificationKind};
use crate::core::policy::NoCancellationFee;
use crate::core::rating_gate::RatingGate;
use crate::core::state_machine::{self, Decision, TimerAction, Transition};
use crate::core::timeout_scheduler::{TimeoutScheduler, TimerExpiry};
use crate::core::traits::{CancellationPolicy, Journal, NotificationDispatcher, PaymentProcessor};
use crate::types::{
    ActorRole, Booking, BookingError, BookingEvent, BookingId, BookingStatus, EscrowTransaction,
    LedgerError, LedgerOperation, NewBooking, PendingEffect, RaterRole, RatingError,
    RatingRecord, RatingSubmission,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// External collaborators of the engine
pub struct EngineParts {
    pub processor: Arc<dyn PaymentProcessor>,
    pub journal: Arc<dyn Journal>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub cancellation_policy: Arc<dyn CancellationPolicy>,
}

impl EngineParts {
    /// In-memory journal, log notifications and no cancellation fee
    pub fn in_memory(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self {
            processor,
            journal: Arc::new(MemoryJournal::new()),
            notifier: Arc::new(LogNotifier),
            cancellation_policy: Arc::new(NoCancellationFee),
        }
    }

    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cancellation_policy(mut self, policy: Arc<dyn CancellationPolicy>) -> Self {
        self.cancellation_policy = policy;
        self
    }
}

/// Read model of a booking with its escrow and ratings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub escrow: Option<EscrowTransaction>,
    pub ratings: Vec<RatingRecord>,
    /// Customer-facing status text
    pub message: &'static str,
}

/// Outcome of a deadline sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Bookings moved to `cancelled_timeout`
    pub expired: Vec<BookingId>,
    /// Bookings whose timer was re-armed for the remaining window
    pub rearmed: Vec<BookingId>,
    /// Bookings past their deadline whose expiry could not complete
    pub failed: Vec<BookingId>,
}

/// Outcome of rebuilding state from the journal
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Bookings restored
    pub bookings: usize,
    /// Open intents completed during recovery
    pub resolved: Vec<BookingId>,
    /// Open intents still waiting on the processor
    pub still_pending: Vec<BookingId>,
    pub sweep: SweepReport,
}

/// Booking lifecycle engine
pub struct BookingEngine {
    config: EngineConfig,
    bookings: DashMap<BookingId, Arc<Mutex<Booking>>>,
    ledger: EscrowLedger,
    scheduler: TimeoutScheduler,
    ratings: RatingGate,
    journal: Arc<dyn Journal>,
    notifier: Arc<dyn NotificationDispatcher>,
    cancellation_policy: Arc<dyn CancellationPolicy>,
}

impl BookingEngine {
    /// Create an engine whose timers are only recorded
    ///
    /// Expiry happens through `expire_if_due` and `sweep_expired`; this is
    /// the mode used by the CSV replay.
    pub fn new(config: EngineConfig, parts: EngineParts) -> Self {
        Self::with_scheduler(config, parts, TimeoutScheduler::new_manual())
    }

    /// Create an engine around an existing scheduler
    pub fn with_scheduler(
        config: EngineConfig,
        parts: EngineParts,
        scheduler: TimeoutScheduler,
    ) -> Self {
        Self {
            ledger: EscrowLedger::new(parts.processor, config.retry),
            config,
            bookings: DashMap::new(),
            scheduler,
            ratings: RatingGate::new(),
            journal: parts.journal,
            notifier: parts.notifier,
            cancellation_policy: parts.cancellation_policy,
        }
    }

    /// Create an engine with tokio-driven timers and start its expiry loop
    ///
    /// Must be called from within a tokio runtime. The loop stops once the
    /// engine is dropped.
    pub fn spawn_driven(config: EngineConfig, parts: EngineParts) -> Arc<Self> {
        let (scheduler, expiries) = TimeoutScheduler::driven();
        let engine = Arc::new(Self::with_scheduler(config, parts, scheduler));
        tokio::spawn(run_expiry_loop(Arc::downgrade(&engine), expiries));
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &TimeoutScheduler {
        &self.scheduler
    }

    /// Create a booking in `pending` with a generated id
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking, BookingError> {
        self.create_booking_with_id(BookingId::generate(), request, Utc::now())
            .await
    }

    /// Create a booking in `pending` with a caller-chosen id and time
    ///
    /// # Errors
    ///
    /// * `Validation` - the customer id is empty
    /// * `AlreadyExists` - the id is taken
    /// * `Journal` - the creation could not be recorded
    pub async fn create_booking_with_id(
        &self,
        id: BookingId,
        request: NewBooking,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        if id.as_str().trim().is_empty() {
            return Err(BookingError::validation("booking id must not be empty"));
        }
        if request.customer_id.trim().is_empty() {
            return Err(BookingError::validation("customer id must not be empty"));
        }

        let booking = Booking::new(id.clone(), request, at);
        let slot = Arc::new(Mutex::new(booking.clone()));
        // held until the creation is journaled so no event can reach the booking first
        let _creating = slot.lock().await;
        match self.bookings.entry(id.clone()) {
            Entry::Occupied(_) => return Err(BookingError::AlreadyExists { booking_id: id }),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&slot));
            }
        }

        let journaled = self
            .journal
            .append(&JournalEntry::BookingCreated {
                booking: booking.clone(),
            })
            .await;
        if let Err(e) = journaled {
            self.bookings.remove(&id);
            return Err(e.into());
        }

        info!(
            booking_id = %booking.id,
            customer_id = %booking.customer_id,
            budget_amount = booking.budget_amount,
            "booking requested"
        );
        Ok(booking)
    }

    /// Deliver an event to a booking at the current time
    pub async fn transition(
        &self,
        booking_id: &BookingId,
        event: BookingEvent,
        actor: ActorRole,
    ) -> Result<Booking, BookingError> {
        self.transition_at(booking_id, event, actor, Utc::now())
            .await
    }

    /// Deliver an event to a booking
    ///
    /// Returns the booking after the event. Redelivery of an event that
    /// already took effect returns the current booking unchanged.
    ///
    /// # Errors
    ///
    /// * `NotFound` - no such booking
    /// * `InvalidTransition` / `ActorNotPermitted` - rejected by the state machine
    /// * `EffectPending` - another event's side effect is awaiting retry
    /// * `Ledger(PaymentProcessor)` - the processor gave up; the effect is parked
    /// * `Ledger(PaymentRejected)` - the processor refused; parked until retried explicitly
    pub async fn transition_at(
        &self,
        booking_id: &BookingId,
        event: BookingEvent,
        actor: ActorRole,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let slot = self.slot(booking_id)?;
        let mut booking = slot.lock().await;
        self.apply_locked(&mut booking, event, actor, at).await
    }

    /// Handle a timer expiry from the driven scheduler
    ///
    /// Returns `None` when the expiry lost the race against a cancellation
    /// or a newer timer generation.
    pub async fn handle_expiry(
        &self,
        expiry: TimerExpiry,
    ) -> Result<Option<Booking>, BookingError> {
        let slot = self.slot(&expiry.booking_id)?;
        let mut booking = slot.lock().await;

        if !self
            .scheduler
            .claim_expiry(&expiry.booking_id, Some(expiry.generation))
        {
            debug!(
                booking_id = %expiry.booking_id,
                generation = expiry.generation,
                "expiry lost to cancellation"
            );
            return Ok(None);
        }
        if booking.status != BookingStatus::AwaitingAcceptance {
            return Ok(None);
        }

        let at = booking.awaiting_acceptance_deadline.unwrap_or_else(Utc::now);
        self.apply_locked(&mut booking, BookingEvent::TimeoutExpired, ActorRole::System, at)
            .await
            .map(Some)
    }

    /// Expire the booking if its acceptance deadline is at or before `now`
    ///
    /// The deadline itself, not `now`, is used as the cancellation time, so
    /// the outcome does not depend on when the check happens.
    pub async fn expire_if_due(
        &self,
        booking_id: &BookingId,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, BookingError> {
        let slot = self.slot(booking_id)?;
        let mut booking = slot.lock().await;
        self.expire_locked(&mut booking, now).await
    }

    /// Expire every overdue booking and re-arm timers for the rest
    ///
    /// Run on restart so a crash between hold and expiry can neither lose
    /// nor duplicate the timeout refund.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for booking_id in self.booking_ids() {
            let Ok(slot) = self.slot(&booking_id) else {
                continue;
            };
            let mut booking = slot.lock().await;
            if booking.status != BookingStatus::AwaitingAcceptance {
                continue;
            }
            let Some(deadline) = booking.awaiting_acceptance_deadline else {
                continue;
            };

            if deadline <= now {
                match self.expire_locked(&mut booking, now).await {
                    Ok(_) => report.expired.push(booking_id),
                    Err(e) => {
                        warn!(booking_id = %booking_id, error = %e, "sweep could not expire booking");
                        report.failed.push(booking_id);
                    }
                }
            } else if !self.scheduler.is_armed(&booking_id) {
                match self.scheduler.arm(&booking_id, deadline) {
                    Ok(_) => report.rearmed.push(booking_id),
                    Err(e) => warn!(booking_id = %booking_id, error = %e, "sweep could not re-arm timer"),
                }
            }
        }

        if !report.expired.is_empty() || !report.rearmed.is_empty() {
            info!(
                expired = report.expired.len(),
                rearmed = report.rearmed.len(),
                failed = report.failed.len(),
                "deadline sweep finished"
            );
        }
        report
    }

    /// Re-drive a parked ledger side effect
    ///
    /// Also re-drives an effect the processor rejected. Succeeds without
    /// doing anything when nothing is pending.
    pub async fn retry_pending(
        &self,
        booking_id: &BookingId,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let slot = self.slot(booking_id)?;
        let mut booking = slot.lock().await;
        if booking.pending_effect.is_none() {
            return Ok(booking.clone());
        }
        self.drive_pending(&mut booking, at).await
    }

    /// Re-drive every parked side effect the processor has not rejected
    ///
    /// Returns the bookings resolved.
    pub async fn retry_all_pending(&self, at: DateTime<Utc>) -> Vec<BookingId> {
        let mut resolved = Vec::new();
        for booking_id in self.booking_ids() {
            let Ok(slot) = self.slot(&booking_id) else {
                continue;
            };
            let mut booking = slot.lock().await;
            match &booking.pending_effect {
                None => continue,
                Some(pending) if pending.rejection.is_some() => {
                    debug!(booking_id = %booking_id, "rejected effect left for explicit retry");
                    continue;
                }
                Some(_) => {}
            }
            match self.drive_pending(&mut booking, at).await {
                Ok(_) => resolved.push(booking_id),
                Err(e) => debug!(booking_id = %booking_id, error = %e, "effect still pending"),
            }
        }
        resolved
    }

    /// Rebuild state from the journal, finish open intents and sweep deadlines
    ///
    /// Intended for a freshly constructed engine.
    pub async fn recover(&self, now: DateTime<Utc>) -> Result<RecoveryReport, BookingError> {
        let state = JournalState::fold(self.journal.load().await?);
        let mut report = RecoveryReport {
            bookings: state.bookings.len(),
            ..RecoveryReport::default()
        };

        for escrow in state.escrows.into_values() {
            self.ledger.restore(escrow);
        }
        for rating in state.ratings {
            self.ratings.restore(rating);
        }
        for (booking_id, mut booking) in state.bookings {
            booking.pending_effect = state.open_intents.get(&booking_id).cloned();
            self.bookings
                .insert(booking_id, Arc::new(Mutex::new(booking)));
        }

        for booking_id in state.open_intents.keys() {
            match self.retry_pending(booking_id, now).await {
                Ok(_) => report.resolved.push(booking_id.clone()),
                Err(e) => {
                    warn!(booking_id = %booking_id, error = %e, "open intent still pending after recovery");
                    report.still_pending.push(booking_id.clone());
                }
            }
        }

        report.sweep = self.sweep_expired(now).await;
        info!(
            bookings = report.bookings,
            resolved = report.resolved.len(),
            still_pending = report.still_pending.len(),
            expired = report.sweep.expired.len(),
            "recovered from journal"
        );
        Ok(report)
    }

    /// Submit a rating at the current time
    pub async fn submit_rating(
        &self,
        submission: RatingSubmission,
    ) -> Result<RatingRecord, RatingError> {
        self.submit_rating_at(submission, Utc::now()).await
    }

    /// Submit a rating for one side of a completed booking
    ///
    /// # Errors
    ///
    /// * `NotFound` - no such booking
    /// * `BookingNotCompleted` - the booking is not `completed`
    /// * `AlreadyRated` - this side already rated
    /// * `InvalidScore` - score outside 1..=5
    pub async fn submit_rating_at(
        &self,
        submission: RatingSubmission,
        at: DateTime<Utc>,
    ) -> Result<RatingRecord, RatingError> {
        let slot = self
            .bookings
            .get(&submission.booking_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RatingError::NotFound {
                booking_id: submission.booking_id.clone(),
            })?;
        let mut booking = slot.lock().await;

        let record = self
            .ratings
            .prepare(
                &booking,
                submission.rater_role,
                submission.score,
                submission.comment,
                at,
            )
            .inspect_err(|e| {
                warn!(booking_id = %submission.booking_id, error = %e, "rating rejected");
            })?;

        let mut rated = booking.clone();
        rated.rating_status.mark(record.rater_role);
        self.journal
            .append(&JournalEntry::RatingRecorded {
                booking: rated,
                rating: record.clone(),
            })
            .await?;
        self.ratings.record(&mut booking, record.clone())?;

        if booking.rating_status.is_closed() {
            info!(booking_id = %booking.id, "both parties rated; ratings closed");
        }
        Ok(record)
    }

    /// Snapshot of a booking
    pub async fn get_booking(&self, booking_id: &BookingId) -> Result<Booking, BookingError> {
        let slot = self.slot(booking_id)?;
        let booking = slot.lock().await;
        Ok(booking.clone())
    }

    /// Booking with its escrow, ratings and status message
    pub async fn view(&self, booking_id: &BookingId) -> Result<BookingView, BookingError> {
        let booking = self.get_booking(booking_id).await?;
        Ok(BookingView {
            escrow: self.ledger.get(booking_id),
            ratings: self.ratings.for_booking(booking_id),
            message: booking.user_message(),
            booking,
        })
    }

    pub fn escrow_for(&self, booking_id: &BookingId) -> Option<EscrowTransaction> {
        self.ledger.get(booking_id)
    }

    pub fn escrows(&self) -> Vec<EscrowTransaction> {
        self.ledger.all()
    }

    pub fn ratings_for(&self, booking_id: &BookingId) -> Vec<RatingRecord> {
        self.ratings.for_booking(booking_id)
    }

    /// Every booking, ordered by id
    pub async fn list_bookings(&self) -> Vec<Booking> {
        let mut bookings = Vec::with_capacity(self.bookings.len());
        for booking_id in self.booking_ids() {
            if let Ok(booking) = self.get_booking(&booking_id).await {
                bookings.push(booking);
            }
        }
        bookings
    }

    /// Booking ids in sorted order
    pub fn booking_ids(&self) -> Vec<BookingId> {
        let mut ids: Vec<BookingId> = self
            .bookings
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    fn slot(&self, booking_id: &BookingId) -> Result<Arc<Mutex<Booking>>, BookingError> {
        self.bookings
            .get(booking_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BookingError::not_found(booking_id))
    }

    async fn expire_locked(
        &self,
        booking: &mut Booking,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, BookingError> {
        match booking.awaiting_acceptance_deadline {
            Some(deadline)
                if booking.status == BookingStatus::AwaitingAcceptance && deadline <= now =>
            {
                self.scheduler.claim_expiry(&booking.id, None);
                self.apply_locked(booking, BookingEvent::TimeoutExpired, ActorRole::System, deadline)
                    .await
                    .map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn apply_locked(
        &self,
        booking: &mut Booking,
        event: BookingEvent,
        actor: ActorRole,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        if let Some(pending) = &booking.pending_effect {
            if pending.event == event && pending.actor == actor {
                return self.drive_pending(booking, at).await;
            }
            warn!(
                booking_id = %booking.id,
                %event,
                pending = %pending.event,
                "event rejected while a side effect is pending"
            );
            return Err(BookingError::EffectPending {
                booking_id: booking.id.clone(),
                operation: pending.operation,
            });
        }

        let decision =
            state_machine::decide(booking, &event, actor, self.config.completion_policy, at)
                .inspect_err(|e| {
                    warn!(
                        booking_id = %booking.id,
                        status = %booking.status,
                        %event,
                        %actor,
                        error = %e,
                        "transition rejected"
                    );
                })?;

        let transition = match decision {
            Decision::AlreadyApplied => {
                debug!(booking_id = %booking.id, %event, "event already applied");
                return Ok(booking.clone());
            }
            Decision::Apply(transition) => transition,
        };

        // a timeout takes effect at the deadline, however late it is delivered
        let at = match event {
            BookingEvent::TimeoutExpired => booking.awaiting_acceptance_deadline.unwrap_or(at),
            _ => at,
        };

        match transition.effect {
            None => {
                self.commit(booking, &event, &transition, at, None).await?;
                Ok(booking.clone())
            }
            Some(operation) => {
                self.journal
                    .append(&JournalEntry::Intent {
                        booking_id: booking.id.clone(),
                        event: event.clone(),
                        actor,
                        operation,
                        recorded_at: at,
                    })
                    .await?;
                booking.pending_effect = Some(PendingEffect {
                    event,
                    actor,
                    operation,
                    recorded_at: at,
                    rejection: None,
                });
                self.drive_pending(booking, at).await
            }
        }
    }

    /// Run the booking's pending ledger effect and commit the transition
    async fn drive_pending(
        &self,
        booking: &mut Booking,
        at: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let Some(pending) = booking.pending_effect.clone() else {
            return Ok(booking.clone());
        };

        let at = match pending.event {
            BookingEvent::TimeoutExpired => booking.awaiting_acceptance_deadline.unwrap_or(at),
            _ => at,
        };

        let transition = match state_machine::decide(
            booking,
            &pending.event,
            pending.actor,
            self.config.completion_policy,
            at,
        )? {
            Decision::Apply(transition) => transition,
            Decision::AlreadyApplied => {
                booking.pending_effect = None;
                return Ok(booking.clone());
            }
        };

        let escrow = match self.run_ledger_effect(booking, pending.operation, at).await {
            Ok(escrow) => escrow,
            Err(e) => {
                let rejection = match &e {
                    LedgerError::PaymentRejected { message, .. } => Some(message.clone()),
                    _ => None,
                };
                if let Some(parked) = booking.pending_effect.as_mut() {
                    parked.rejection = rejection.clone();
                }
                if let Some(reason) = rejection {
                    error!(
                        booking_id = %booking.id,
                        operation = %pending.operation,
                        %reason,
                        "processor rejected ledger side effect; parked until retried explicitly"
                    );
                    self.notifier.notify(Notification::new(
                        &booking.id,
                        NotificationKind::PaymentRejected,
                        booking.user_message(),
                    ));
                } else {
                    error!(
                        booking_id = %booking.id,
                        operation = %pending.operation,
                        error = %e,
                        "ledger side effect failed; parked for retry"
                    );
                    if matches!(e, LedgerError::PaymentProcessor { .. }) {
                        self.notifier.notify(Notification::new(
                            &booking.id,
                            NotificationKind::PaymentPending,
                            booking.user_message(),
                        ));
                    }
                }
                return Err(e.into());
            }
        };

        self.commit(booking, &pending.event, &transition, at, Some(escrow))
            .await?;
        Ok(booking.clone())
    }

    async fn run_ledger_effect(
        &self,
        booking: &Booking,
        operation: LedgerOperation,
        at: DateTime<Utc>,
    ) -> Result<EscrowTransaction, LedgerError> {
        match operation {
            LedgerOperation::Hold => match self.ledger.get(&booking.id) {
                // hold finished before an interrupted commit
                Some(existing) => Ok(existing),
                None => {
                    self.ledger
                        .hold(&booking.id, booking.budget_amount, self.config.commission_rate, at)
                        .await
                }
            },
            LedgerOperation::Release => self.ledger.release(&booking.id, at).await,
            LedgerOperation::Refund => {
                let fee = match (booking.status, self.ledger.get(&booking.id)) {
                    (BookingStatus::Confirmed, Some(escrow)) => {
                        self.cancellation_policy.fee(booking, &escrow)
                    }
                    _ => 0,
                };
                self.ledger.refund_with_fee(&booking.id, fee, at).await
            }
        }
    }

    /// Journal and publish the post-transition booking
    async fn commit(
        &self,
        booking: &mut Booking,
        event: &BookingEvent,
        transition: &Transition,
        at: DateTime<Utc>,
        escrow: Option<EscrowTransaction>,
    ) -> Result<(), BookingError> {
        let at = at.max(booking.last_changed_at());
        let mut next = booking.clone();
        state_machine::apply(&mut next, event, transition, at, self.config.acceptance_window);
        debug_assert_eq!(state_machine::check_invariants(&next), Ok(()));
        self.journal
            .append(&JournalEntry::Committed {
                booking: next.clone(),
                escrow,
            })
            .await?;

        let from = booking.status;
        *booking = next;
        info!(
            booking_id = %booking.id,
            %from,
            to = %booking.status,
            %event,
            "booking transitioned"
        );

        match transition.timer {
            TimerAction::Start => {
                if let Err(e) =
                    self.scheduler
                        .start(&booking.id, at, self.config.acceptance_window)
                {
                    error!(booking_id = %booking.id, error = %e, "acceptance timer not armed");
                }
            }
            TimerAction::Cancel => {
                self.scheduler.cancel(&booking.id);
            }
            TimerAction::Keep => {}
        }

        self.notify_transition(booking);
        Ok(())
    }

    fn notify_transition(&self, booking: &Booking) {
        let kinds: &[NotificationKind] = match booking.status {
            BookingStatus::Pending => &[],
            BookingStatus::AwaitingAcceptance => &[NotificationKind::PaymentHeld],
            BookingStatus::Confirmed => &[NotificationKind::ProviderAccepted],
            BookingStatus::Completed => &[
                NotificationKind::ServiceCompleted,
                NotificationKind::RatingPrompt(RaterRole::Customer),
                NotificationKind::RatingPrompt(RaterRole::Provider),
            ],
            BookingStatus::CancelledTimeout => &[NotificationKind::RefundedAfterTimeout],
            BookingStatus::CancelledManual => &[NotificationKind::Cancelled],
        };
        for kind in kinds {
            let message = match kind {
                NotificationKind::RatingPrompt(RaterRole::Customer) => "Rate your provider",
                NotificationKind::RatingPrompt(RaterRole::Provider) => "Rate your customer",
                _ => booking.status.user_message(),
            };
            self.notifier
                .notify(Notification::new(&booking.id, *kind, message));
        }
    }
}

async fn run_expiry_loop(engine: Weak<BookingEngine>, mut expiries: mpsc::UnboundedReceiver<TimerExpiry>) {
    while let Some(expiry) = expiries.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        tokio::spawn(async move {
            let booking_id = expiry.booking_id.clone();
            if let Err(e) = engine.handle_expiry(expiry).await {
                warn!(booking_id = %booking_id, error = %e, "timeout expiry failed");
            }
        });
    }
    debug!("expiry loop stopped");
}
