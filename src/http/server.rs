//! Long-running API server: journal-backed engine, driven timers and a
//! maintenance loop for deadline sweeps and parked side effects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::ServeArgs;
use crate::core::{
    BookingEngine, EngineParts, FileJournal, PercentageCancellationFee, SimulatedProcessor,
};
use crate::http::{build_router, AppState};
use crate::types::CommissionRate;

/// Run the HTTP API until Ctrl+C
///
/// # Returns
///
/// * `Ok(())` after a graceful shutdown
/// * `Err(String)` if configuration, the journal or the listener failed
pub fn run(args: ServeArgs) -> Result<(), String> {
    let config = args
        .engine
        .to_engine_config()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

    runtime.block_on(async move {
        let journal = FileJournal::open(&args.journal).await.map_err(|e| {
            format!("Failed to open journal '{}': {}", args.journal.display(), e)
        })?;

        let mut parts = EngineParts::in_memory(Arc::new(SimulatedProcessor::new()))
            .with_journal(Arc::new(journal));
        if let Some(rate) = args.cancellation_fee_rate {
            let rate = CommissionRate::new(rate)
                .map_err(|e| format!("Invalid cancellation fee rate: {}", e))?;
            parts = parts.with_cancellation_policy(Arc::new(PercentageCancellationFee::new(rate)));
        }

        let engine = BookingEngine::spawn_driven(config, parts);
        let report = engine
            .recover(Utc::now())
            .await
            .map_err(|e| format!("Recovery failed: {}", e))?;
        if !report.still_pending.is_empty() {
            warn!(
                count = report.still_pending.len(),
                "bookings with payment pending after recovery"
            );
        }

        tokio::spawn(maintenance_loop(
            Arc::clone(&engine),
            Duration::from_secs(args.maintenance_interval_secs.max(1)),
        ));

        let listener = tokio::net::TcpListener::bind(args.bind)
            .await
            .map_err(|e| format!("Failed to bind {}: {}", args.bind, e))?;
        info!(addr = %args.bind, journal = %args.journal.display(), "booking API listening");

        axum::serve(listener, build_router(AppState::new(engine)))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        info!("server shut down");
        Ok(())
    })
}

/// Periodically expire overdue bookings and retry parked ledger effects
async fn maintenance_loop(engine: Arc<BookingEngine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let now = Utc::now();
        let sweep = engine.sweep_expired(now).await;
        let resolved = engine.retry_all_pending(now).await;
        debug!(
            expired = sweep.expired.len(),
            resolved = resolved.len(),
            "maintenance pass"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
