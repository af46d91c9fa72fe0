//! Write-ahead journal
//!
//! Every transition with a ledger side effect is written twice: an `Intent`
//! before the processor is called and a `Committed` snapshot afterwards. An
//! intent with no later commit for the same booking is *open*; recovery
//! turns open intents back into pending effects and re-drives them.

use crate::core::traits::Journal;
use crate::types::{
    ActorRole, Booking, BookingEvent, BookingId, EscrowTransaction, JournalError, LedgerOperation,
    PendingEffect, RatingRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A single journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum JournalEntry {
    /// A booking was requested
    BookingCreated { booking: Booking },

    /// A ledger side effect is about to be attempted
    Intent {
        booking_id: BookingId,
        event: BookingEvent,
        actor: ActorRole,
        operation: LedgerOperation,
        recorded_at: DateTime<Utc>,
    },

    /// A transition completed; full post-transition snapshot
    Committed {
        booking: Booking,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        escrow: Option<EscrowTransaction>,
    },

    /// A rating was accepted
    RatingRecorded {
        booking: Booking,
        rating: RatingRecord,
    },
}

impl JournalEntry {
    pub fn booking_id(&self) -> &BookingId {
        match self {
            JournalEntry::BookingCreated { booking }
            | JournalEntry::Committed { booking, .. }
            | JournalEntry::RatingRecorded { booking, .. } => &booking.id,
            JournalEntry::Intent { booking_id, .. } => booking_id,
        }
    }
}

/// State rebuilt by folding a journal in order
#[derive(Debug, Default)]
pub struct JournalState {
    pub bookings: BTreeMap<BookingId, Booking>,
    pub escrows: BTreeMap<BookingId, EscrowTransaction>,
    pub ratings: Vec<RatingRecord>,
    /// Intents with no later commit
    pub open_intents: BTreeMap<BookingId, PendingEffect>,
}

impl JournalState {
    /// Fold entries in append order; later snapshots replace earlier ones
    pub fn fold(entries: impl IntoIterator<Item = JournalEntry>) -> Self {
        let mut state = JournalState::default();
        for entry in entries {
            match entry {
                JournalEntry::BookingCreated { booking } => {
                    state.bookings.insert(booking.id.clone(), booking);
                }
                JournalEntry::Intent {
                    booking_id,
                    event,
                    actor,
                    operation,
                    recorded_at,
                } => {
                    state.open_intents.insert(
                        booking_id,
                        PendingEffect {
                            event,
                            actor,
                            operation,
                            recorded_at,
                            rejection: None,
                        },
                    );
                }
                JournalEntry::Committed { booking, escrow } => {
                    state.open_intents.remove(&booking.id);
                    if let Some(escrow) = escrow {
                        state.escrows.insert(escrow.booking_id.clone(), escrow);
                    }
                    state.bookings.insert(booking.id.clone(), booking);
                }
                JournalEntry::RatingRecorded { booking, rating } => {
                    state.ratings.push(rating);
                    state.bookings.insert(booking.id.clone(), booking);
                }
            }
        }
        state
    }
}

/// In-memory journal for tests and replay
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<JournalEntry>, JournalError> {
        Ok(self.entries())
    }
}

/// Append-only JSON-lines journal on disk
///
/// Each append is flushed with `sync_data` before returning. A final line
/// cut short by a crash is dropped on open; a malformed line anywhere else
/// is reported as corruption.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl FileJournal {
    /// Open or create the journal at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;

        let contents = fs::read_to_string(&path).await?;
        if !contents.is_empty() && !contents.ends_with('\n') {
            let keep = contents.rfind('\n').map_or(0, |pos| pos + 1);
            warn!(
                path = %path.display(),
                dropped_bytes = contents.len() - keep,
                "Truncating torn journal tail"
            );
            file.set_len(keep as u64).await?;
            file.sync_data().await?;
        }

        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn append(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(entry).map_err(|e| JournalError::Serialization {
            message: e.to_string(),
        })?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        debug!(booking_id = %entry.booking_id(), "journal entry appended");
        Ok(())
    }

    async fn load(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let _file = self.file.lock().await;
        let contents = fs::read_to_string(&self.path).await?;
        let torn_tail = !contents.is_empty() && !contents.ends_with('\n');
        let lines: Vec<&str> = contents.lines().collect();

        let mut entries = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) if torn_tail && index + 1 == lines.len() => {
                    warn!(line = index + 1, error = %e, "Skipping torn journal tail");
                }
                Err(e) => {
                    return Err(JournalError::Corrupt {
                        line: index + 1,
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(entries)
    }
}
