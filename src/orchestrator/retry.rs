//! Stage retry policy with configurable backoff
//!
//! By default every stage gets one retry after a five second delay.
//! Stages can override the policy by id in configuration.

use super::graph::StageId;
use crate::error::{ErrorCode, PipelineError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before the first retry
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Spread delays by up to +/-25%
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            backoff: BackoffStrategy::default(),
            max_delay: default_max_delay(),
            jitter: false,
        }
    }
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay multiplied by `base` after each retry
    Exponential {
        #[serde(default = "default_exponential_base")]
        base: f64,
    },
}

fn default_retries() -> u32 {
    1
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_exponential_base() -> f64 {
    2.0
}

const JITTER_FACTOR: f64 = 0.5;

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_delay = match &self.backoff {
            BackoffStrategy::Fixed => self.retry_delay,
            BackoffStrategy::Exponential { base } => {
                let multiplier = base.powi(attempt.saturating_sub(1) as i32);
                Duration::try_from_secs_f64(self.retry_delay.as_secs_f64() * multiplier)
                    .unwrap_or(self.max_delay)
            }
        };
        base_delay.min(self.max_delay)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let range = delay.as_secs_f64() * JITTER_FACTOR;
        let jitter = rand::rng().random_range(-range / 2.0..=range / 2.0);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }

    /// Whether a failure on attempt `attempt` should be retried
    pub fn should_retry(&self, error: &PipelineError, attempt: u32) -> bool {
        attempt < self.max_attempts() && error.is_retryable()
    }

    pub fn validate(&self) -> Result<()> {
        if let BackoffStrategy::Exponential { base } = self.backoff {
            if !(base.is_finite() && base >= 1.0) {
                return Err(PipelineError::config_with_code(
                    ErrorCode::CONFIG_INVALID_VALUE,
                    format!("exponential backoff base must be >= 1.0, got {}", base),
                ));
            }
        }
        Ok(())
    }
}

/// Default policy plus per-stage overrides keyed by stage id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub default: RetryPolicy,
    pub stages: BTreeMap<String, RetryPolicy>,
}

impl RetryConfig {
    /// Same policy for every stage
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            default: policy,
            stages: BTreeMap::new(),
        }
    }

    pub fn policy_for(&self, stage: StageId) -> &RetryPolicy {
        self.stages.get(stage.as_str()).unwrap_or(&self.default)
    }

    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for (name, policy) in &self.stages {
            name.parse::<StageId>().map_err(|_| {
                PipelineError::config_with_code(
                    ErrorCode::CONFIG_INVALID_VALUE,
                    format!("retry override for unknown stage '{}'", name),
                )
            })?;
            policy.validate()?;
        }
        Ok(())
    }
}

/// Result of running an operation under a retry policy
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up.
pub async fn retry_async<T, F, Fut>(
    policy: &RetryPolicy,
    context: &str,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", context, attempt);
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(err) if policy.should_retry(&err, attempt) => {
                let delay = policy.apply_jitter(policy.delay_for(attempt));
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    context,
                    attempt,
                    policy.max_attempts(),
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }
        }
    }
}
