//! Attribute futures
//!
//! Every attribute a consumer references is a write-once placeholder. The
//! node that owns the attribute resolves it after its provider call has been
//! committed; consumers await it instead of polling the provider. A failed
//! owner fails its futures so that waiting consumers fail instead of hanging.

use crate::error::AlreadyResolvedError;
use crate::graph::DependencyGraph;
use crate::model::{AttributeRef, ID_ATTRIBUTE};
use serde_json::Value;
use stackflow_cloud::Attributes;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub enum FutureState {
    Pending,
    Resolved { value: Value, at: Instant },
    Failed { reason: String, at: Instant },
}

impl FutureState {
    pub fn is_pending(&self) -> bool {
        matches!(self, FutureState::Pending)
    }
}

/// Returned to a consumer whose producer will never deliver the value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{key} is unavailable: {reason}")]
pub struct FutureFailure {
    pub key: AttributeRef,
    pub reason: String,
}

/// Placeholder for one attribute of one resource
#[derive(Debug, Clone)]
pub struct AttributeFuture {
    key: AttributeRef,
    tx: Arc<watch::Sender<FutureState>>,
}

impl AttributeFuture {
    pub fn new(key: AttributeRef) -> Self {
        let (tx, _rx) = watch::channel(FutureState::Pending);
        Self {
            key,
            tx: Arc::new(tx),
        }
    }

    pub fn key(&self) -> &AttributeRef {
        &self.key
    }

    /// Deliver the value. Only the first settlement wins.
    pub fn resolve(&self, value: Value) -> Result<(), AlreadyResolvedError> {
        self.settle(FutureState::Resolved {
            value,
            at: Instant::now(),
        })
    }

    /// Mark the value as never arriving
    pub fn fail(&self, reason: impl Into<String>) -> Result<(), AlreadyResolvedError> {
        self.settle(FutureState::Failed {
            reason: reason.into(),
            at: Instant::now(),
        })
    }

    /// Fail only if still pending; returns whether the future was failed
    pub fn fail_if_pending(&self, reason: impl Into<String>) -> bool {
        self.fail(reason).is_ok()
    }

    fn settle(&self, next: FutureState) -> Result<(), AlreadyResolvedError> {
        let settled = self.tx.send_if_modified(|state| {
            if state.is_pending() {
                *state = next;
                true
            } else {
                false
            }
        });
        if settled {
            Ok(())
        } else {
            Err(AlreadyResolvedError {
                owner: self.key.owner.clone(),
                attribute: self.key.attribute.clone(),
            })
        }
    }

    /// Suspend until the future settles
    pub async fn await_value(&self) -> Result<Value, FutureFailure> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| !state.is_pending())
            .await
            .map(|state| (*state).clone())
            .unwrap_or(FutureState::Failed {
                reason: "future was dropped".to_string(),
                at: Instant::now(),
            });
        match state {
            FutureState::Resolved { value, .. } => Ok(value),
            FutureState::Failed { reason, .. } => Err(FutureFailure {
                key: self.key.clone(),
                reason,
            }),
            FutureState::Pending => Err(FutureFailure {
                key: self.key.clone(),
                reason: "future was never settled".to_string(),
            }),
        }
    }

    /// Current value without waiting
    pub fn peek(&self) -> Option<Value> {
        match &*self.tx.borrow() {
            FutureState::Resolved { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> FutureState {
        self.tx.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.tx.borrow().is_pending()
    }

    pub fn resolved_at(&self) -> Option<Instant> {
        match &*self.tx.borrow() {
            FutureState::Resolved { at, .. } => Some(*at),
            _ => None,
        }
    }
}

/// All futures of one run, keyed by attribute
#[derive(Debug, Default)]
pub struct FutureTable {
    futures: BTreeMap<AttributeRef, AttributeFuture>,
}

impl FutureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// One future per referenced attribute plus the identity of every node
    pub fn for_graph(graph: &DependencyGraph) -> Self {
        let keys = graph.nodes().flat_map(|node| {
            std::iter::once(AttributeRef::identity_of(&node.id)).chain(node.references())
        });
        Self::from_keys(keys)
    }

    pub fn from_keys(keys: impl IntoIterator<Item = AttributeRef>) -> Self {
        let futures = keys
            .into_iter()
            .map(|key| (key.clone(), AttributeFuture::new(key)))
            .collect();
        Self { futures }
    }

    pub fn get(&self, key: &AttributeRef) -> Option<&AttributeFuture> {
        self.futures.get(key)
    }

    /// Resolved value of `key`, if any
    pub fn value(&self, key: &AttributeRef) -> Option<Value> {
        self.get(key).and_then(AttributeFuture::peek)
    }

    pub fn owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a AttributeFuture> {
        self.futures
            .iter()
            .filter(move |(key, _)| key.owner == owner)
            .map(|(_, future)| future)
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Resolve every future owned by `owner` from a committed resource.
    /// Attributes the provider did not return are failed.
    pub fn resolve_owner(
        &self,
        owner: &str,
        identity: &str,
        attributes: &Attributes,
    ) -> Result<(), AlreadyResolvedError> {
        for future in self.owned_by(owner) {
            let attribute = future.key().attribute.as_str();
            if attribute == ID_ATTRIBUTE {
                future.resolve(Value::String(identity.to_string()))?;
            } else if let Some(value) = attributes.get(attribute) {
                future.resolve(value.clone())?;
            } else {
                future.fail(format!("{} does not expose attribute '{}'", owner, attribute))?;
            }
        }
        Ok(())
    }

    /// Fail every future owned by `owner`
    pub fn fail_owner(&self, owner: &str, reason: &str) -> Result<(), AlreadyResolvedError> {
        for future in self.owned_by(owner) {
            future.fail(reason)?;
        }
        Ok(())
    }

    /// Fail whatever is still pending for `owner`; returns how many were failed
    pub fn fail_pending_owner(&self, owner: &str, reason: &str) -> usize {
        self.owned_by(owner)
            .filter(|future| future.fail_if_pending(reason))
            .count()
    }

    /// When the identity of `owner` was resolved
    pub fn resolved_at(&self, owner: &str) -> Option<Instant> {
        self.get(&AttributeRef::identity_of(owner))
            .and_then(AttributeFuture::resolved_at)
    }
}

/// Fails the owner's pending futures when dropped without being disarmed,
/// so a task that panics or is aborted never leaves consumers waiting
pub struct PendingGuard {
    table: Arc<FutureTable>,
    owner: String,
    armed: bool,
}

impl PendingGuard {
    pub fn new(table: Arc<FutureTable>, owner: impl Into<String>) -> Self {
        Self {
            table,
            owner: owner.into(),
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Fail the owner's pending futures now and disarm
    pub fn fail_pending(&mut self, reason: &str) -> usize {
        self.armed = false;
        self.table.fail_pending_owner(&self.owner, reason)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            let failed = self
                .table
                .fail_pending_owner(&self.owner, "task ended before resolving its attributes");
            if failed > 0 {
                tracing::warn!(owner = %self.owner, failed, "Failed pending attribute futures");
            }
        }
    }
}
