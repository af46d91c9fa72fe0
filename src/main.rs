//! Booking Escrow Engine CLI
//!
//! # Usage
//!
//! ```bash
//! booking-engine replay --commission-rate 0.15 events.csv > bookings.csv
//! booking-engine replay --strategy sync --commission-rate 0.15 events.csv
//! booking-engine replay --batch-size 2000 --max-concurrent 8 --commission-rate 0.15 events.csv
//! booking-engine serve --bind 0.0.0.0:8080 --journal bookings.journal --commission-rate 0.15
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid configuration, file not found, bind failure, etc.)

use booking_escrow_engine::cli::{self, Command, ReplayArgs, StrategyType};
use booking_escrow_engine::{http, strategy};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let result = match args.command {
        Command::Replay(replay) => run_replay(replay),
        Command::Serve(serve) => http::server::run(serve),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_replay(args: ReplayArgs) -> Result<(), String> {
    let engine_config = args
        .engine
        .to_engine_config()
        .map_err(|e| format!("Invalid configuration: {}", e))?;

    let batch_config = if matches!(args.strategy, StrategyType::Async) {
        Some(args.to_batch_config())
    } else {
        None
    };
    let strategy = strategy::create_strategy(args.strategy, engine_config, batch_config);

    let mut output = std::io::stdout();
    strategy.process(&args.input_file, &mut output)
}
