//! Retry policies for loaders.

use std::time::Duration;

use ssr_core::LoaderError;

use crate::client::ClientQueryOptions;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let multiplier = 2u32.saturating_pow(attempt);
                std::cmp::min(base.saturating_mul(multiplier), *max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(50),
            max: Duration::from_millis(500),
        }
    }
}

/// Loader outcomes that trigger a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCondition {
    /// The loader returned a failure.
    Failure,
    /// The loader exceeded its timeout.
    Timeout,
}

impl RetryCondition {
    /// Check if an error matches this condition.
    pub fn matches(&self, error: &LoaderError) -> bool {
        matches!(
            (self, error),
            (Self::Failure, LoaderError::Failed(_)) | (Self::Timeout, LoaderError::Timeout(_))
        )
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Conditions that trigger retry.
    pub retry_on: Vec<RetryCondition>,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::default(),
            retry_on: vec![RetryCondition::Failure, RetryCondition::Timeout],
        }
    }

    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            backoff: BackoffStrategy::None,
            retry_on: Vec::new(),
        }
    }

    /// Derive a policy from a client's query defaults.
    pub fn from_options(options: &ClientQueryOptions) -> Self {
        if options.retry == 0 {
            return Self::none();
        }
        Self::new(options.retry).with_backoff(BackoffStrategy::Fixed(options.retry_delay))
    }

    /// Set backoff strategy.
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Set retry conditions.
    pub fn with_conditions(mut self, conditions: Vec<RetryCondition>) -> Self {
        self.retry_on = conditions;
        self
    }

    /// Check if a failed attempt (0-indexed) should be retried.
    pub fn should_retry(&self, error: &LoaderError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        self.retry_on.iter().any(|c| c.matches(error))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_is_capped() {
        let backoff = BackoffStrategy::default();
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::new(1);
        let err = LoaderError::failed("x");
        assert!(policy.should_retry(&err, 0));
        assert!(!policy.should_retry(&err, 1));
    }

    #[test]
    fn test_serialize_errors_are_not_retried() {
        let policy = RetryPolicy::new(3);
        assert!(!policy.should_retry(&LoaderError::Serialize("nan".into()), 0));
    }

    #[test]
    fn test_policy_from_client_options() {
        assert_eq!(
            RetryPolicy::from_options(&ClientQueryOptions::server()),
            RetryPolicy::none()
        );

        let browser = RetryPolicy::from_options(&ClientQueryOptions::browser());
        assert_eq!(browser.max_attempts, 1);
        assert_eq!(
            browser.backoff,
            BackoffStrategy::Fixed(Duration::from_millis(1000))
        );
    }
}
