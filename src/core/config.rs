//! Engine configuration
//!
//! The commission rate has no compiled-in default: it must come from the
//! deployment's authoritative configuration and is read once per escrow
//! transaction at hold time.

use crate::types::{ActorRole, CommissionRate, ConfigError};
use clap::ValueEnum;
use rust_decimal::Decimal;
use std::time::Duration;

/// Default acceptance/arrival window: 4 hours from payment confirmation
pub const DEFAULT_ACCEPTANCE_WINDOW: Duration = Duration::from_secs(4 * 60 * 60);

/// Who may mark a confirmed booking as completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CompletionPolicy {
    /// Customer arrival confirmation or provider completion
    #[default]
    Either,
    CustomerOnly,
    ProviderOnly,
}

impl CompletionPolicy {
    pub fn permits(self, actor: ActorRole) -> bool {
        match self {
            CompletionPolicy::Either => {
                matches!(actor, ActorRole::Customer | ActorRole::Provider)
            }
            CompletionPolicy::CustomerOnly => actor == ActorRole::Customer,
            CompletionPolicy::ProviderOnly => actor == ActorRole::Provider,
        }
    }
}

/// Retry schedule for payment processor calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for the exponential backoff
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (1-based): base * 2^(retry-1), capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Configuration for the booking engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Platform commission applied at hold time
    pub commission_rate: CommissionRate,
    /// Window in which a provider must accept after payment
    pub acceptance_window: chrono::Duration,
    /// Who may complete a confirmed booking
    pub completion_policy: CompletionPolicy,
    /// Processor retry schedule
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Create a configuration with the given commission rate and defaults
    /// for everything else
    pub fn new(commission_rate: Decimal) -> Result<Self, ConfigError> {
        Ok(Self {
            commission_rate: CommissionRate::new(commission_rate)?,
            acceptance_window: chrono::Duration::hours(4),
            completion_policy: CompletionPolicy::default(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_acceptance_window(mut self, window: Duration) -> Result<Self, ConfigError> {
        let invalid = ConfigError::InvalidAcceptanceWindow {
            seconds: window.as_secs(),
        };
        if window.is_zero() {
            return Err(invalid);
        }
        self.acceptance_window = chrono::Duration::from_std(window).map_err(|_| invalid)?;
        Ok(self)
    }

    pub fn with_completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.completion_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Result<Self, ConfigError> {
        if retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryBudget);
        }
        self.retry = retry;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_uses_four_hour_window() {
        let config = EngineConfig::new(Decimal::new(15, 2)).unwrap();
        assert_eq!(config.acceptance_window, chrono::Duration::hours(4));
        assert_eq!(
            config.acceptance_window.to_std().unwrap(),
            DEFAULT_ACCEPTANCE_WINDOW
        );
        assert_eq!(config.completion_policy, CompletionPolicy::Either);
    }

    #[test]
    fn test_rejects_invalid_commission_rate() {
        let result = EngineConfig::new(Decimal::new(120, 2));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidCommissionRate { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_window() {
        let result = EngineConfig::new(Decimal::new(15, 2))
            .unwrap()
            .with_acceptance_window(Duration::ZERO);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidAcceptanceWindow { seconds: 0 })
        ));
    }

    #[test]
    fn test_rejects_zero_retry_budget() {
        let result = EngineConfig::new(Decimal::new(15, 2))
            .unwrap()
            .with_retry(RetryPolicy::immediate(0));
        assert_eq!(result.unwrap_err(), ConfigError::ZeroRetryBudget);
    }

    #[rstest]
    #[case::first_retry(1, 100)]
    #[case::second_retry(2, 200)]
    #[case::third_retry(3, 400)]
    #[case::capped(10, 1_000)]
    fn test_backoff_doubles_and_caps(#[case] retry: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(retry), Duration::from_millis(expected_ms));
    }

    #[rstest]
    #[case::either_customer(CompletionPolicy::Either, ActorRole::Customer, true)]
    #[case::either_provider(CompletionPolicy::Either, ActorRole::Provider, true)]
    #[case::either_system(CompletionPolicy::Either, ActorRole::System, false)]
    #[case::customer_only(CompletionPolicy::CustomerOnly, ActorRole::Provider, false)]
    #[case::provider_only(CompletionPolicy::ProviderOnly, ActorRole::Provider, true)]
    fn test_completion_policy(
        #[case] policy: CompletionPolicy,
        #[case] actor: ActorRole,
        #[case] permitted: bool,
    ) {
        assert_eq!(policy.permits(actor), permitted);
    }
}
