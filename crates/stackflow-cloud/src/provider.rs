//! Resource provider trait definition

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Output attributes of a provisioned resource (endpoint, ARN, URL, ...)
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Resource provider abstraction
///
/// A provider owns the actual control-plane calls. The orchestrator treats
/// `kind` and the desired payload as opaque and only relies on the returned
/// identity and attributes.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the provider name (e.g., "sandbox")
    fn name(&self) -> &str;

    /// Create a resource and return its provider-assigned identity
    async fn create(
        &self,
        kind: &str,
        desired: &serde_json::Value,
    ) -> Result<CreatedResource, ProviderError>;

    /// Update an existing resource in place
    async fn update(
        &self,
        identity: &str,
        kind: &str,
        desired: &serde_json::Value,
    ) -> Result<Attributes, ProviderError>;

    /// Delete a resource
    async fn delete(&self, identity: &str, kind: &str) -> Result<(), ProviderError>;
}

/// Result of a successful create call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedResource {
    /// Provider-specific resource ID
    pub identity: String,

    /// Attributes exposed by the new resource
    pub attributes: Attributes,
}

impl CreatedResource {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first call)
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[test]
    fn test_created_resource_builder() {
        let created = CreatedResource::new("vpc-1")
            .with_attribute("vpc_id", serde_json::json!("vpc-1"));
        assert_eq!(created.identity, "vpc-1");
        assert_eq!(created.attributes["vpc_id"], "vpc-1");
    }
}
