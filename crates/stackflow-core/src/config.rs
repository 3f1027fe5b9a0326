//! Engine settings

use crate::error::{FlowError, Result};
use stackflow_cloud::RetryConfig;

pub const DEFAULT_PARALLELISM: usize = 4;

/// Knobs for one apply/destroy run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of provider calls in flight
    pub parallelism: usize,
    /// Stop dispatching new nodes after this many failures (`None` = never)
    pub max_failures: Option<usize>,
    /// Backoff for transient provider errors
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            max_failures: None,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_max_failures(mut self, max_failures: Option<usize>) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(FlowError::InvalidConfig(
                "parallelism は 1 以上である必要があります".to_string(),
            ));
        }
        if self.max_failures == Some(0) {
            return Err(FlowError::InvalidConfig(
                "max-failures は 1 以上である必要があります (無制限は 0 を指定せず省略)".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(FlowError::InvalidConfig(
                "retry.max-attempts は 1 以上である必要があります".to_string(),
            ));
        }
        if !(self.retry.backoff_multiplier >= 1.0) {
            return Err(FlowError::InvalidConfig(
                "retry.multiplier は 1.0 以上である必要があります".to_string(),
            ));
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err(FlowError::InvalidConfig(
                "retry.initial-delay-ms は max-delay-ms 以下である必要があります".to_string(),
            ));
        }
        Ok(())
    }
}
