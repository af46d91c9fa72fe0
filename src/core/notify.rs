//! Notification trigger points and the built-in dispatchers

use crate::core::traits::NotificationDispatcher;
use crate::types::{BookingId, RaterRole};
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

/// What happened to a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentHeld,
    ProviderAccepted,
    ServiceCompleted,
    RefundedAfterTimeout,
    Cancelled,
    /// Invite one side to rate the other
    RatingPrompt(RaterRole),
    PaymentPending,
    /// The processor refused a transfer and it needs manual follow-up
    PaymentRejected,
}

/// A message to deliver to the parties of a booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub booking_id: BookingId,
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn new(booking_id: &BookingId, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            booking_id: booking_id.clone(),
            kind,
            message: message.into(),
        }
    }
}

/// Dispatcher that writes every notification to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationDispatcher for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            booking_id = %notification.booking_id,
            kind = ?notification.kind,
            "{}",
            notification.message
        );
    }
}

/// Dispatcher that keeps notifications in memory for inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in order
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Kinds dispatched for one booking, in order
    pub fn kinds_for(&self, booking_id: &BookingId) -> Vec<NotificationKind> {
        self.sent()
            .into_iter()
            .filter(|n| &n.booking_id == booking_id)
            .map(|n| n.kind)
            .collect()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}
