use crate::core::{CompletionPolicy, EngineConfig, RetryPolicy, DEFAULT_ACCEPTANCE_WINDOW};
use crate::strategy::BatchConfig;
use crate::types::ConfigError;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Booking lifecycle and escrow engine
#[derive(Parser, Debug)]
#[command(name = "booking-engine")]
#[command(about = "Booking lifecycle and escrow engine", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a CSV event log and print the resulting booking states
    Replay(ReplayArgs),
    /// Serve the HTTP API backed by a file journal
    Serve(ServeArgs),
}

/// Settings shared by every engine the binary builds
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Platform commission as a fraction of the booking total
    #[arg(
        long = "commission-rate",
        value_name = "RATE",
        env = "BOOKING_COMMISSION_RATE",
        help = "Commission as a fraction, e.g. 0.15 (required, no default)"
    )]
    pub commission_rate: Decimal,

    /// Seconds a provider has to accept after payment
    ///
    /// The acceptance window is fixed at 4 hours; overriding it is for tests.
    #[arg(
        long = "acceptance-window-secs",
        value_name = "SECS",
        env = "BOOKING_ACCEPTANCE_WINDOW_SECS",
        default_value_t = 4 * 60 * 60,
        help = "Testing only: shorten the fixed 4 hour provider acceptance window"
    )]
    pub acceptance_window_secs: u64,

    /// Who may complete a confirmed booking
    #[arg(
        long = "completion-policy",
        value_name = "POLICY",
        env = "BOOKING_COMPLETION_POLICY",
        default_value = "either"
    )]
    pub completion_policy: CompletionPolicy,

    /// Total payment processor attempts per ledger operation
    #[arg(
        long = "processor-attempts",
        value_name = "COUNT",
        env = "BOOKING_PROCESSOR_ATTEMPTS",
        default_value_t = 5
    )]
    pub processor_attempts: u32,
}

impl EngineArgs {
    /// Build and validate the engine configuration
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let window = Duration::from_secs(self.acceptance_window_secs);
        if window != DEFAULT_ACCEPTANCE_WINDOW {
            warn!(
                window_secs = self.acceptance_window_secs,
                "acceptance window overridden; only meant for testing"
            );
        }
        EngineConfig::new(self.commission_rate)?
            .with_acceptance_window(window)?
            .with_completion_policy(self.completion_policy)
            .with_retry(RetryPolicy {
                max_attempts: self.processor_attempts,
                ..RetryPolicy::default()
            })
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Input CSV file path containing replay rows
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Processing strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' for sequential or 'async' for batched concurrent"
    )]
    pub strategy: StrategyType,

    /// Number of rows per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of rows per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads for batched replay (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address the HTTP API listens on
    #[arg(
        long = "bind",
        value_name = "ADDR",
        env = "BOOKING_BIND",
        default_value = "127.0.0.1:8080"
    )]
    pub bind: SocketAddr,

    /// Journal file; created if missing and replayed on start
    #[arg(
        long = "journal",
        value_name = "PATH",
        env = "BOOKING_JOURNAL",
        default_value = "bookings.journal"
    )]
    pub journal: PathBuf,

    /// Seconds between deadline sweeps and pending-effect retries
    #[arg(
        long = "maintenance-interval-secs",
        value_name = "SECS",
        env = "BOOKING_MAINTENANCE_INTERVAL_SECS",
        default_value_t = 30
    )]
    pub maintenance_interval_secs: u64,

    /// Retain this fraction of the total when a confirmed booking is cancelled
    #[arg(
        long = "cancellation-fee-rate",
        value_name = "RATE",
        env = "BOOKING_CANCELLATION_FEE_RATE"
    )]
    pub cancellation_fee_rate: Option<Decimal>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Available replay strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl ReplayArgs {
    /// Create a BatchConfig from CLI arguments, falling back to defaults
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    fn replay(args: &[&str]) -> ReplayArgs {
        match CliArgs::try_parse_from(args).unwrap().command {
            Command::Replay(replay) => replay,
            other => panic!("expected replay, got {:?}", other),
        }
    }

    #[rstest]
    #[case::default_strategy(&["prog", "replay", "--commission-rate", "0.15", "in.csv"], StrategyType::Async)]
    #[case::explicit_sync(&["prog", "replay", "--strategy", "sync", "--commission-rate", "0.15", "in.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["prog", "replay", "--strategy", "async", "--commission-rate", "0.15", "in.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        assert_eq!(replay(args).strategy, expected);
    }

    #[rstest]
    #[case::all_defaults(&["prog", "replay", "--commission-rate", "0.15", "in.csv"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["prog", "replay", "--batch-size", "2000", "--commission-rate", "0.15", "in.csv"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["prog", "replay", "--max-concurrent", "8", "--commission-rate", "0.15", "in.csv"], 1000, 8)]
    #[case::zero_batch_size(&["prog", "replay", "--batch-size", "0", "--commission-rate", "0.15", "in.csv"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let config = replay(args).to_batch_config();
        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[test]
    fn test_engine_config_from_flags() {
        let args = replay(&[
            "prog",
            "replay",
            "--commission-rate",
            "0.2",
            "--acceptance-window-secs",
            "60",
            "--completion-policy",
            "customer-only",
            "in.csv",
        ]);

        let config = args.engine.to_engine_config().unwrap();
        assert_eq!(config.commission_rate.as_decimal(), Decimal::new(2, 1));
        assert_eq!(config.acceptance_window, chrono::Duration::seconds(60));
        assert_eq!(config.completion_policy, CompletionPolicy::CustomerOnly);
    }

    #[test]
    fn test_acceptance_window_defaults_to_four_hours() {
        let args = replay(&["prog", "replay", "--commission-rate", "0.15", "in.csv"]);

        let config = args.engine.to_engine_config().unwrap();
        assert_eq!(config.acceptance_window, chrono::Duration::hours(4));
    }

    #[rstest]
    #[case::replay("replay")]
    #[case::serve("serve")]
    fn test_acceptance_window_flag_is_marked_for_testing(#[case] subcommand: &str) {
        let mut command = CliArgs::command();
        let help = command
            .find_subcommand_mut(subcommand)
            .unwrap()
            .render_help()
            .to_string();

        assert!(help.contains("--acceptance-window-secs"));
        assert!(help.contains("Testing only"));
    }

    #[rstest]
    #[case::rate_above_one(&["prog", "replay", "--commission-rate", "1.5", "in.csv"])]
    #[case::zero_window(&["prog", "replay", "--commission-rate", "0.15", "--acceptance-window-secs", "0", "in.csv"])]
    #[case::zero_attempts(&["prog", "replay", "--commission-rate", "0.15", "--processor-attempts", "0", "in.csv"])]
    fn test_engine_config_rejects(#[case] args: &[&str]) {
        assert!(replay(args).engine.to_engine_config().is_err());
    }

    #[test]
    fn test_serve_parsing() {
        let parsed = CliArgs::try_parse_from([
            "prog",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--journal",
            "/tmp/j.log",
            "--commission-rate",
            "0.15",
        ])
        .unwrap();

        match parsed.command {
            Command::Serve(serve) => {
                assert_eq!(serve.bind, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
                assert_eq!(serve.journal, PathBuf::from("/tmp/j.log"));
                assert_eq!(serve.cancellation_fee_rate, None);
            }
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[rstest]
    #[case::missing_subcommand(&["prog"])]
    #[case::missing_input(&["prog", "replay", "--commission-rate", "0.15"])]
    #[case::invalid_strategy(&["prog", "replay", "--strategy", "invalid", "--commission-rate", "0.15", "in.csv"])]
    #[case::invalid_rate(&["prog", "replay", "--commission-rate", "lots", "in.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
