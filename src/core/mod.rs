//! Core business logic module
//!
//! - `state_machine` - Pure transition table for the booking lifecycle
//! - `escrow_ledger` - Hold/release/refund with commission split
//! - `timeout_scheduler` - Acceptance-window timers with generations
//! - `rating_gate` - One rating per side of a completed booking
//! - `engine` - Orchestration under a per-booking lock
//! - `journal` - Write-ahead log for crash recovery
//! - `replay` / `batch_processor` - CSV replay onto the engine

pub mod batch_processor;
pub mod config;
pub mod engine;
pub mod escrow_ledger;
pub mod journal;
pub mod notify;
pub mod policy;
pub mod processor;
pub mod rating_gate;
pub mod replay;
pub mod state_machine;
pub mod timeout_scheduler;
pub mod traits;

pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use config::{CompletionPolicy, EngineConfig, RetryPolicy, DEFAULT_ACCEPTANCE_WINDOW};
pub use engine::{BookingEngine, BookingView, EngineParts, RecoveryReport, SweepReport};
pub use escrow_ledger::EscrowLedger;
pub use journal::{FileJournal, JournalEntry, JournalState, MemoryJournal};
pub use notify::{LogNotifier, Notification, NotificationKind, RecordingNotifier};
pub use policy::{NoCancellationFee, PercentageCancellationFee};
pub use processor::SimulatedProcessor;
pub use rating_gate::RatingGate;
pub use replay::apply_record;
pub use timeout_scheduler::{TimeoutScheduler, TimerExpiry, TimerHandle};
pub use traits::{
    CancellationPolicy, Journal, NotificationDispatcher, PaymentProcessor, ProcessorReceipt,
    ProcessorRequest,
};
