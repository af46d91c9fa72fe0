//! Acceptance-window timers
//!
//! One timer per booking, identified by a generation number. The scheduler
//! never changes booking state itself: an expiry is only a signal, and the
//! engine claims it under the booking lock. A claim succeeds only while the
//! same generation is still armed, so cancellation and expiry can never both
//! win.
//!
//! # Modes
//!
//! - **Driven**: each timer is a tokio task sleeping until its deadline,
//!   stopped early through a `CancellationToken`; expiries are delivered on
//!   an unbounded mpsc channel.
//! - **Manual**: deadlines are only recorded. Whoever owns the clock (the
//!   CSV replay, the restart sweep) asks the engine to expire due bookings.

use crate::types::{BookingId, SchedulerError};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Signal that a timer generation reached its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerExpiry {
    pub booking_id: BookingId,
    pub generation: u64,
}

/// Description of an armed timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerHandle {
    pub booking_id: BookingId,
    pub generation: u64,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug)]
struct TimerEntry {
    generation: u64,
    deadline: DateTime<Utc>,
    /// Present in driven mode only
    token: Option<CancellationToken>,
}

impl TimerEntry {
    fn disarm(self) {
        if let Some(token) = self.token {
            token.cancel();
        }
    }
}

/// Per-booking timer registry
#[derive(Debug)]
pub struct TimeoutScheduler {
    timers: DashMap<BookingId, TimerEntry>,
    next_generation: AtomicU64,
    expiry_tx: Option<mpsc::UnboundedSender<TimerExpiry>>,
}

impl TimeoutScheduler {
    /// Scheduler that only records deadlines
    pub fn new_manual() -> Self {
        Self {
            timers: DashMap::new(),
            next_generation: AtomicU64::new(1),
            expiry_tx: None,
        }
    }

    /// Scheduler backed by tokio timers
    ///
    /// Must be used from within a tokio runtime. Expiries arrive on the
    /// returned receiver.
    pub fn driven() -> (Self, mpsc::UnboundedReceiver<TimerExpiry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            timers: DashMap::new(),
            next_generation: AtomicU64::new(1),
            expiry_tx: Some(tx),
        };
        (scheduler, rx)
    }

    pub fn is_driven(&self) -> bool {
        self.expiry_tx.is_some()
    }

    /// Arm a timer expiring `window` after `started_at`
    ///
    /// # Errors
    ///
    /// `DuplicateTimer` if a timer is already armed for the booking.
    pub fn start(
        &self,
        booking_id: &BookingId,
        started_at: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<TimerHandle, SchedulerError> {
        self.arm(booking_id, started_at + window)
    }

    /// Arm a timer for an absolute deadline
    ///
    /// Used when re-arming persisted deadlines after a restart; a deadline
    /// already in the past fires immediately in driven mode.
    pub fn arm(
        &self,
        booking_id: &BookingId,
        deadline: DateTime<Utc>,
    ) -> Result<TimerHandle, SchedulerError> {
        let slot = match self.timers.entry(booking_id.clone()) {
            Entry::Occupied(_) => {
                return Err(SchedulerError::DuplicateTimer {
                    booking_id: booking_id.clone(),
                })
            }
            Entry::Vacant(slot) => slot,
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = self
            .expiry_tx
            .as_ref()
            .map(|tx| spawn_timer(tx.clone(), booking_id.clone(), generation, deadline));

        slot.insert(TimerEntry {
            generation,
            deadline,
            token,
        });
        debug!(booking_id = %booking_id, generation, %deadline, "timer armed");

        Ok(TimerHandle {
            booking_id: booking_id.clone(),
            generation,
            deadline,
        })
    }

    /// Disarm the booking's timer
    ///
    /// Returns whether a timer was armed; cancelling an unknown or already
    /// expired timer is a no-op.
    pub fn cancel(&self, booking_id: &BookingId) -> bool {
        match self.timers.remove(booking_id) {
            Some((_, entry)) => {
                debug!(booking_id = %booking_id, generation = entry.generation, "timer cancelled");
                entry.disarm();
                true
            }
            None => false,
        }
    }

    /// Take ownership of an expiry
    ///
    /// Succeeds once per generation, and only if that generation is still
    /// armed. `None` claims whatever timer is armed.
    pub fn claim_expiry(&self, booking_id: &BookingId, generation: Option<u64>) -> bool {
        let claimed = self.timers.remove_if(booking_id, |_, entry| {
            generation.map_or(true, |g| entry.generation == g)
        });
        match claimed {
            Some((_, entry)) => {
                entry.disarm();
                true
            }
            None => {
                trace!(booking_id = %booking_id, ?generation, "stale expiry ignored");
                false
            }
        }
    }

    pub fn deadline(&self, booking_id: &BookingId) -> Option<DateTime<Utc>> {
        self.timers.get(booking_id).map(|entry| entry.deadline)
    }

    pub fn generation(&self, booking_id: &BookingId) -> Option<u64> {
        self.timers.get(booking_id).map(|entry| entry.generation)
    }

    pub fn is_armed(&self, booking_id: &BookingId) -> bool {
        self.timers.contains_key(booking_id)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            if let Some(token) = &entry.token {
                token.cancel();
            }
        }
    }
}

fn spawn_timer(
    tx: mpsc::UnboundedSender<TimerExpiry>,
    booking_id: BookingId,
    generation: u64,
    deadline: DateTime<Utc>,
) -> CancellationToken {
    let token = CancellationToken::new();
    let remaining = (deadline - Utc::now()).to_std().unwrap_or_default();
    let wake_at = tokio::time::Instant::now() + remaining;
    let child = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = child.cancelled() => {}
            _ = tokio::time::sleep_until(wake_at) => {
                if tx.send(TimerExpiry { booking_id: booking_id.clone(), generation }).is_err() {
                    debug!(booking_id = %booking_id, generation, "expiry receiver closed");
                }
            }
        }
    });

    token
}
