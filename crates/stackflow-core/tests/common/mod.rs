//! Shared fixtures for scheduler tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use stackflow_cloud::{
    Attributes, ConvergenceStore, CreatedResource, ProviderError, ResourceProvider, RetryConfig,
    StaticSecretSource,
};
use stackflow_core::{EngineConfig, ResourceNode, Scheduler};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub kind: String,
    pub identity: String,
    pub payload: Value,
    pub at: Instant,
}

/// Provider that records every call and can be told to fail
#[derive(Default)]
pub struct RecordingProvider {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    exposes: Mutex<HashMap<String, Vec<String>>>,
    latency: Mutex<HashMap<String, Duration>>,
    failures: Mutex<HashMap<(Op, String), (usize, ProviderError)>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes (besides `arn`) returned for a kind
    pub fn exposes(self, kind: &str, attributes: &[&str]) -> Self {
        self.exposes.lock().unwrap().insert(
            kind.to_string(),
            attributes.iter().map(|a| a.to_string()).collect(),
        );
        self
    }

    pub fn latency(self, kind: &str, latency: Duration) -> Self {
        self.latency.lock().unwrap().insert(kind.to_string(), latency);
        self
    }

    /// Fail the next `times` calls of `op` on `kind`
    pub fn fail(self, op: Op, kind: &str, times: usize, error: ProviderError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((op, kind.to_string()), (times, error));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn kinds_in_order(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.kind).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Value of a synthesized attribute
    pub fn attribute_value(identity: &str, attribute: &str) -> Value {
        json!(format!("{}/{}", identity, attribute))
    }

    fn attributes(&self, kind: &str, identity: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("arn".into(), json!(format!("arn:test:{}", identity)));
        if let Some(names) = self.exposes.lock().unwrap().get(kind) {
            for name in names {
                attributes.insert(name.clone(), Self::attribute_value(identity, name));
            }
        }
        attributes
    }

    async fn enter(&self, op: Op, kind: &str, identity: &str, payload: &Value) -> Result<(), ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            op,
            kind: kind.to_string(),
            identity: identity.to_string(),
            payload: payload.clone(),
            at: Instant::now(),
        });

        let latency = self.latency.lock().unwrap().get(kind).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut failures = self.failures.lock().unwrap();
        if let Some((remaining, error)) = failures.get_mut(&(op, kind.to_string()))
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(error.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create(&self, kind: &str, desired: &Value) -> Result<CreatedResource, ProviderError> {
        self.enter(Op::Create, kind, "", desired).await?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = format!("{}-{}", kind, n);
        Ok(CreatedResource {
            attributes: self.attributes(kind, &identity),
            identity,
        })
    }

    async fn update(&self, identity: &str, kind: &str, desired: &Value) -> Result<Attributes, ProviderError> {
        self.enter(Op::Update, kind, identity, desired).await?;
        Ok(self.attributes(kind, identity))
    }

    async fn delete(&self, identity: &str, kind: &str) -> Result<(), ProviderError> {
        self.enter(Op::Delete, kind, identity, &Value::Null).await
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

pub fn scheduler(provider: Arc<RecordingProvider>, store: Arc<ConvergenceStore>) -> Scheduler {
    scheduler_with(provider, store, EngineConfig::default().with_retry(fast_retry()))
}

pub fn scheduler_with(
    provider: Arc<RecordingProvider>,
    store: Arc<ConvergenceStore>,
    config: EngineConfig,
) -> Scheduler {
    let secrets = StaticSecretSource::new()
        .with_secret("env://DB_USERNAME", "weather")
        .with_secret("env://DB_PASSWORD", "hunter2");
    Scheduler::new(provider, Arc::new(secrets), store, config)
}

/// Provider exposing the attributes used by [`four_tier`]
pub fn four_tier_provider() -> RecordingProvider {
    RecordingProvider::new()
        .exposes("vpc", &["vpc_id", "private_subnet_ids"])
        .exposes("docdb-cluster", &["endpoint", "port"])
        .exposes("apprunner-service", &["service_url"])
        .exposes("s3-bucket", &["bucket"])
}

/// network → database → backend → frontend, declared out of order
pub fn four_tier(bucket_name: &str) -> Vec<ResourceNode> {
    vec![
        ResourceNode::new("frontend", "s3-bucket")
            .with_state(json!({"bucket_name": bucket_name, "website": true}))
            .with_template("config", r#"{"backendUri": "${backend.service_url}"}"#),
        ResourceNode::new("backend", "apprunner-service")
            .with_state(json!({"image": "weather/backend:1", "port": 8080}))
            .with_template("DB_URI", "mongodb://${database.endpoint}")
            .with_ref("subnets", "network", "private_subnet_ids")
            .lag_sensitive(true),
        ResourceNode::new("database", "docdb-cluster")
            .with_state(json!({"engine": "docdb", "instances": 2}))
            .with_ref("subnets", "network", "private_subnet_ids")
            .with_secret("master_username", "env://DB_USERNAME")
            .with_secret("master_password", "env://DB_PASSWORD"),
        ResourceNode::new("network", "vpc").with_state(json!({"cidr": "10.0.0.0/16"})),
    ]
}
