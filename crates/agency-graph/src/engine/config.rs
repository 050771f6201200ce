//! Executor configuration
//!
//! Step limits, parallelism, timeouts, checkpoint cadence and the default
//! retry policy applied to nodes that do not declare their own.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Graph executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum steps before the run fails with `StepLimitExceeded`
    pub max_steps: usize,

    /// Maximum concurrent node executions within one step
    pub parallelism: usize,

    /// Timeout for a single node attempt
    #[serde(with = "humantime_serde")]
    pub node_timeout: Duration,

    /// Timeout for the entire run (one `run`/`resume` call)
    #[serde(with = "humantime_serde")]
    pub run_timeout: Duration,

    /// Checkpoint frequency (every N steps, 0 = only on suspension)
    pub checkpoint_interval: usize,

    /// Timeout for a single checkpoint write
    #[serde(with = "humantime_serde")]
    pub checkpoint_timeout: Duration,

    /// Retry policy for nodes without an override
    pub retry_policy: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            parallelism: num_cpus::get(),
            node_timeout: Duration::from_secs(60),
            run_timeout: Duration::from_secs(30 * 60),
            checkpoint_interval: 1,
            checkpoint_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ExecutorConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum steps
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    /// Set parallelism level
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set node timeout
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Set run timeout
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set checkpoint interval (0 to checkpoint only on suspension)
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set checkpoint write timeout
    pub fn with_checkpoint_timeout(mut self, timeout: Duration) -> Self {
        self.checkpoint_timeout = timeout;
        self
    }

    /// Set retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Check if a periodic checkpoint is due after this step
    #[allow(clippy::manual_is_multiple_of)]
    pub fn should_checkpoint(&self, step: usize) -> bool {
        self.checkpoint_interval > 0 && step > 0 && step % self.checkpoint_interval == 0
    }
}

/// Retry policy for transient node failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first failure
    pub max_retries: usize,

    /// Base delay for exponential backoff
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set backoff base duration
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set maximum backoff duration
    pub fn with_backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        let delay = self.backoff_base.saturating_mul(multiplier);
        delay.min(self.backoff_max)
    }

    /// Check if more retries are allowed
    pub fn should_retry(&self, retries_so_far: usize) -> bool {
        retries_so_far < self.max_retries
    }

    /// Create a no-retry policy
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}
