//! Provisioning scheduler
//!
//! Every node gets its own task. A task suspends on the attribute futures
//! of its producers, then competes for one of `parallelism` permits before
//! calling the provider. Nothing is dispatched in waves: a node starts as
//! soon as its own producers are done, independent of unrelated branches.
//!
//! Failures travel along edges only. A failed node fails its futures, so its
//! transitive consumers fail without a provider call while unrelated nodes
//! keep going. Deletions run consumers-first, and a producer whose consumer
//! could not be deleted is kept.
//!
//! A kind change on a resource that others depend on creates the new
//! resource first. The old one stays recorded as retired and is deleted
//! once every consumer has converged onto the replacement.

use crate::compensator::Compensator;
use crate::config::EngineConfig;
use crate::error::{AlreadyResolvedError, Result};
use crate::fingerprint::node_fingerprint;
use crate::future::{FutureFailure, FutureTable, PendingGuard};
use crate::graph::{DependencyGraph, deletion_order};
use crate::inputs::{render_payload, resolve_inputs, wait_for_references};
use crate::model::{AttributeRef, ResourceNode};
use futures_util::future::join_all;
use serde_json::Value;
use stackflow_cloud::{
    ActionType, ApplyResult, Attributes, ConvergenceRecord, ConvergenceStore, NodeOutcome,
    ResourceProvider, RetiredResource, SecretSource,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Attribute used to signal that a resource has been deleted
const DELETED: &str = "deleted";

/// Stops dispatch of nodes that have not started their provider call yet.
/// In-flight calls are allowed to finish and be recorded.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

pub struct Scheduler {
    provider: Arc<dyn ResourceProvider>,
    secrets: Arc<dyn SecretSource>,
    store: Arc<ConvergenceStore>,
    config: EngineConfig,
    cancel: CancelHandle,
}

impl Scheduler {
    pub fn new(
        provider: Arc<dyn ResourceProvider>,
        secrets: Arc<dyn SecretSource>,
        store: Arc<ConvergenceStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            secrets,
            store,
            config,
            cancel: CancelHandle::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConvergenceStore> {
        &self.store
    }

    /// Handle to cancel a running apply or destroy from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Converge the live resources to `graph`, then delete recorded
    /// resources that are no longer declared
    pub async fn apply(&self, graph: &DependencyGraph) -> Result<ApplyResult> {
        self.apply_with(graph, Arc::new(FutureTable::for_graph(graph)))
            .await
    }

    /// Like [`Scheduler::apply`] with a caller-provided future table, so the
    /// caller can observe resolution
    pub async fn apply_with(
        &self,
        graph: &DependencyGraph,
        futures: Arc<FutureTable>,
    ) -> Result<ApplyResult> {
        self.config.validate()?;
        let started = Instant::now();
        let run = self.run_context(futures);
        info!(
            nodes = graph.len(),
            parallelism = self.config.parallelism,
            provider = self.provider.name(),
            "Starting apply"
        );

        let recorded = self.store.records().await;
        let mut tasks = Vec::with_capacity(graph.len());
        for node in graph.nodes() {
            let provisional = provisional_action(self.store.get(&node.id).await.as_ref(), &node.kind);
            let dependencies: Vec<String> = graph.producers_of(&node.id).cloned().collect();
            let has_consumers = graph.consumers_of(&node.id).next().is_some()
                || recorded
                    .iter()
                    .any(|r| r.logical_id != node.id && r.dependencies.contains(&node.id));
            let span = info_span!("node", logical_id = %node.id, kind = %node.kind);
            let handle = tokio::spawn(
                Arc::clone(&run)
                    .converge(node.clone(), provisional, dependencies, has_consumers)
                    .instrument(span),
            );
            tasks.push(Task {
                logical_id: node.id.clone(),
                kind: node.kind.clone(),
                action: provisional,
                handle,
            });
        }
        let mut result = join_tasks(tasks).await?;

        let (orphans, retained): (Vec<_>, Vec<_>) = self
            .store
            .records()
            .await
            .into_iter()
            .partition(|record| !graph.contains(&record.logical_id));
        if !orphans.is_empty() {
            info!(count = orphans.len(), "Deleting resources no longer declared");
            result.extend(self.delete_records(&run, orphans, &retained).await?);
        }
        self.retire_superseded(&run, &mut result).await;

        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(summary = %result.summary(), "Apply finished");
        Ok(result)
    }

    /// Delete every recorded resource, consumers first
    pub async fn destroy(&self) -> Result<ApplyResult> {
        self.config.validate()?;
        let started = Instant::now();
        let run = self.run_context(Arc::new(FutureTable::new()));
        let targets = self.store.records().await;
        info!(resources = targets.len(), provider = self.provider.name(), "Starting destroy");

        let mut result = self.delete_records(&run, targets, &[]).await?;
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(summary = %result.summary(), "Destroy finished");
        Ok(result)
    }

    fn run_context(&self, futures: Arc<FutureTable>) -> Arc<RunContext> {
        Arc::new(RunContext {
            provider: Arc::clone(&self.provider),
            secrets: Arc::clone(&self.secrets),
            store: Arc::clone(&self.store),
            compensator: Compensator::new(self.config.retry.clone()),
            permits: Arc::new(Semaphore::new(self.config.parallelism)),
            futures,
            cancel: self.cancel.clone(),
            failures: AtomicUsize::new(0),
            max_failures: self.config.max_failures,
        })
    }

    /// Delete replaced resources whose consumers all converged in this run
    async fn retire_superseded(&self, run: &Arc<RunContext>, result: &mut ApplyResult) {
        let records = self.store.records().await;
        for record in records.iter().filter(|r| !r.retired.is_empty()) {
            let pending: Vec<&str> = records
                .iter()
                .filter(|other| other.dependencies.contains(&record.logical_id))
                .filter(|other| {
                    !result
                        .outcome(&other.logical_id)
                        .is_some_and(NodeOutcome::is_success)
                })
                .map(|other| other.logical_id.as_str())
                .collect();
            if !pending.is_empty() {
                warn!(
                    logical_id = %record.logical_id,
                    consumers = %pending.join(", "),
                    "Keeping replaced resource until its consumers converge"
                );
                continue;
            }
            if let Some(failed) = run.retire(&record.logical_id).await {
                result.push(failed);
            }
        }
    }

    async fn delete_records(
        &self,
        run: &Arc<RunContext>,
        targets: Vec<ConvergenceRecord>,
        retained: &[ConvergenceRecord],
    ) -> Result<ApplyResult> {
        let order = deletion_order(&targets);
        let signals = Arc::new(FutureTable::from_keys(
            targets.iter().map(|t| AttributeRef::new(&t.logical_id, DELETED)),
        ));
        let targets: BTreeMap<String, ConvergenceRecord> = targets
            .into_iter()
            .map(|t| (t.logical_id.clone(), t))
            .collect();

        let mut tasks = Vec::with_capacity(order.len());
        for id in order {
            let Some(target) = targets.get(&id) else { continue };
            // consumers being deleted in this run must go first
            let blockers: Vec<String> = targets
                .values()
                .filter(|other| other.dependencies.contains(&id))
                .map(|other| other.logical_id.clone())
                .collect();
            // consumers that stay make the resource undeletable
            let holders: Vec<String> = retained
                .iter()
                .filter(|other| other.dependencies.contains(&id))
                .map(|other| other.logical_id.clone())
                .collect();

            let span = info_span!("delete", logical_id = %target.logical_id, kind = %target.kind);
            let handle = tokio::spawn(
                Arc::clone(run)
                    .delete(target.clone(), blockers, holders, Arc::clone(&signals))
                    .instrument(span),
            );
            tasks.push(Task {
                logical_id: target.logical_id.clone(),
                kind: target.kind.clone(),
                action: ActionType::Delete,
                handle,
            });
        }
        join_tasks(tasks).await
    }
}

/// Shared state of one run
struct RunContext {
    provider: Arc<dyn ResourceProvider>,
    secrets: Arc<dyn SecretSource>,
    store: Arc<ConvergenceStore>,
    compensator: Compensator,
    permits: Arc<Semaphore>,
    futures: Arc<FutureTable>,
    cancel: CancelHandle,
    failures: AtomicUsize,
    max_failures: Option<usize>,
}

struct Task {
    logical_id: String,
    kind: String,
    action: ActionType,
    handle: JoinHandle<std::result::Result<NodeOutcome, AlreadyResolvedError>>,
}

struct Converged {
    identity: String,
    attributes: Attributes,
    action: ActionType,
    attempts: u32,
}

struct NodeFailure {
    action: ActionType,
    message: String,
    attempts: u32,
}

impl RunContext {
    async fn converge(
        self: Arc<Self>,
        node: ResourceNode,
        provisional: ActionType,
        dependencies: Vec<String>,
        has_consumers: bool,
    ) -> std::result::Result<NodeOutcome, AlreadyResolvedError> {
        let mut guard = PendingGuard::new(Arc::clone(&self.futures), node.id.clone());

        let waited = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            waited = wait_for_references(&node, &self.futures) => Some(waited),
        };
        match waited {
            None => return Ok(self.skip_cancelled(&node.id, &node.kind, provisional, &mut guard)),
            Some(Err(failure)) => {
                let reason = format!("dependency '{}' failed", failure.key.owner);
                warn!(dependency = %failure.key, cause = %failure.reason, "Not dispatching, {}", reason);
                self.futures.fail_owner(&node.id, &reason)?;
                guard.disarm();
                return Ok(NodeOutcome::failed(
                    &node.id,
                    &node.kind,
                    provisional,
                    format!("{}: {}", reason, failure.reason),
                    0,
                ));
            }
            Some(Ok(())) => {}
        }

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            return Ok(self.skip_cancelled(&node.id, &node.kind, provisional, &mut guard));
        };
        if self.cancel.is_cancelled() {
            return Ok(self.skip_cancelled(&node.id, &node.kind, provisional, &mut guard));
        }

        match self.provision(&node, dependencies, has_consumers).await {
            Ok(converged) => {
                self.futures
                    .resolve_owner(&node.id, &converged.identity, &converged.attributes)?;
                guard.disarm();
                info!(
                    action = %converged.action,
                    identity = %converged.identity,
                    attempts = converged.attempts,
                    "Resource converged"
                );
                Ok(NodeOutcome::succeeded(
                    &node.id,
                    &node.kind,
                    converged.action,
                    Some(converged.identity),
                    converged.attempts,
                ))
            }
            Err(failure) => {
                error!(action = %failure.action, error = %failure.message, "Resource failed");
                self.futures.fail_owner(&node.id, &failure.message)?;
                guard.disarm();
                self.record_failure();
                Ok(NodeOutcome::failed(
                    &node.id,
                    &node.kind,
                    failure.action,
                    failure.message,
                    failure.attempts,
                ))
            }
        }
    }

    /// Decide create/update/replace/no-op from the actually resolved inputs
    /// and run it under the record's single-writer lock
    async fn provision(
        &self,
        node: &ResourceNode,
        dependencies: Vec<String>,
        has_consumers: bool,
    ) -> std::result::Result<Converged, NodeFailure> {
        let lock = self.store.lock(&node.id).await;
        let current = lock.current().await;
        let retired = current.as_ref().map(|r| r.retired.clone()).unwrap_or_default();
        let provisional = provisional_action(current.as_ref(), &node.kind);
        let fail = |message: String, attempts: u32| NodeFailure {
            action: provisional,
            message,
            attempts,
        };

        let futures = &self.futures;
        let inputs = resolve_inputs(node, |key| futures.value(key), self.secrets.as_ref())
            .await
            .map_err(|e| fail(e.to_string(), 0))?;
        let payload = render_payload(&node.desired_state, &inputs);
        let fingerprint = node_fingerprint(node, &inputs, &self.store.fingerprint_salt().await);
        let record = |identity: &str, attributes: &Attributes| {
            ConvergenceRecord::new(&node.id, &node.kind, identity, &fingerprint)
                .with_attributes(attributes.clone())
                .with_dependencies(dependencies.clone())
                .with_retired(retired.clone())
        };

        match current {
            Some(existing)
                if existing.kind == node.kind && existing.input_fingerprint == fingerprint =>
            {
                debug!(identity = %existing.provider_identity, "Fingerprint unchanged, skipping provider call");
                if existing.dependencies != dependencies {
                    let refreshed = ConvergenceRecord {
                        dependencies: dependencies.clone(),
                        ..existing.clone()
                    };
                    lock.commit(refreshed)
                        .await
                        .map_err(|e| fail(e.to_string(), 0))?;
                }
                Ok(Converged {
                    identity: existing.provider_identity,
                    attributes: existing.attributes,
                    action: ActionType::NoOp,
                    attempts: 0,
                })
            }
            Some(existing) if existing.kind == node.kind => {
                info!(identity = %existing.provider_identity, "Updating resource");
                let identity = existing.provider_identity.as_str();
                let updated = self
                    .compensator
                    .call(&node.id, node.lag_sensitive, || {
                        self.provider.update(identity, &node.kind, &payload)
                    })
                    .await
                    .map_err(|f| fail(f.to_string(), f.attempts))?;
                lock.commit(record(identity, &updated.value))
                    .await
                    .map_err(|e| fail(e.to_string(), updated.attempts))?;
                Ok(Converged {
                    identity: existing.provider_identity.clone(),
                    attributes: updated.value,
                    action: ActionType::Update,
                    attempts: updated.attempts,
                })
            }
            Some(existing) if has_consumers => {
                info!(
                    previous_kind = %existing.kind,
                    identity = %existing.provider_identity,
                    "Kind changed, creating replacement before retiring the old resource"
                );
                let created = self
                    .compensator
                    .call(&node.id, node.lag_sensitive, || {
                        self.provider.create(&node.kind, &payload)
                    })
                    .await
                    .map_err(|f| fail(f.to_string(), f.attempts))?;
                let attempts = created.attempts;
                let created = created.value;
                let mut superseded = retired.clone();
                superseded.push(RetiredResource {
                    provider_identity: existing.provider_identity.clone(),
                    kind: existing.kind.clone(),
                });
                lock.commit(record(&created.identity, &created.attributes).with_retired(superseded))
                    .await
                    .map_err(|e| {
                        error!(identity = %created.identity, "Replacement was created but could not be recorded");
                        fail(e.to_string(), attempts)
                    })?;
                Ok(Converged {
                    identity: created.identity,
                    attributes: created.attributes,
                    action: ActionType::Replace,
                    attempts,
                })
            }
            Some(existing) => {
                info!(
                    previous_kind = %existing.kind,
                    identity = %existing.provider_identity,
                    "Kind changed, replacing resource"
                );
                let deleted = self
                    .compensator
                    .call(&node.id, node.lag_sensitive, || {
                        self.provider
                            .delete(&existing.provider_identity, &existing.kind)
                    })
                    .await
                    .map_err(|f| fail(f.to_string(), f.attempts))?;
                lock.remove()
                    .await
                    .map_err(|e| fail(e.to_string(), deleted.attempts))?;

                let created = self
                    .compensator
                    .call(&node.id, node.lag_sensitive, || {
                        self.provider.create(&node.kind, &payload)
                    })
                    .await
                    .map_err(|f| fail(f.to_string(), deleted.attempts + f.attempts))?;
                let attempts = deleted.attempts + created.attempts;
                let created = created.value;
                lock.commit(record(&created.identity, &created.attributes))
                    .await
                    .map_err(|e| fail(e.to_string(), attempts))?;
                Ok(Converged {
                    identity: created.identity,
                    attributes: created.attributes,
                    action: ActionType::Replace,
                    attempts,
                })
            }
            None => {
                info!("Creating resource");
                let created = self
                    .compensator
                    .call(&node.id, node.lag_sensitive, || {
                        self.provider.create(&node.kind, &payload)
                    })
                    .await
                    .map_err(|f| fail(f.to_string(), f.attempts))?;
                let attempts = created.attempts;
                let created = created.value;
                lock.commit(record(&created.identity, &created.attributes))
                    .await
                    .map_err(|e| {
                        error!(identity = %created.identity, "Resource was created but could not be recorded");
                        fail(e.to_string(), attempts)
                    })?;
                Ok(Converged {
                    identity: created.identity,
                    attributes: created.attributes,
                    action: ActionType::Create,
                    attempts,
                })
            }
        }
    }

    /// Delete the retired resources of `logical_id`. Returns a failed
    /// outcome when any of them is still alive afterwards.
    async fn retire(&self, logical_id: &str) -> Option<NodeOutcome> {
        let lock = self.store.lock(logical_id).await;
        let current = lock.current().await?;
        if current.retired.is_empty() {
            return None;
        }

        let (remaining, errors) = self.delete_retired(logical_id, &current.retired).await;
        let kind = current.kind.clone();
        if let Err(e) = lock.commit(current.with_retired(remaining)).await {
            self.record_failure();
            return Some(NodeOutcome::failed(logical_id, kind, ActionType::Delete, e.to_string(), 0));
        }
        if errors.is_empty() {
            return None;
        }
        self.record_failure();
        Some(NodeOutcome::failed(
            logical_id,
            kind,
            ActionType::Delete,
            format!("replaced resource could not be deleted: {}", errors.join("; ")),
            0,
        ))
    }

    /// Delete each retired resource, returning the ones still alive and why
    async fn delete_retired(
        &self,
        logical_id: &str,
        retired: &[RetiredResource],
    ) -> (Vec<RetiredResource>, Vec<String>) {
        let mut remaining = Vec::new();
        let mut errors = Vec::new();
        for old in retired {
            info!(identity = %old.provider_identity, kind = %old.kind, "Deleting replaced resource");
            let deleted = self
                .compensator
                .call(logical_id, false, || {
                    self.provider.delete(&old.provider_identity, &old.kind)
                })
                .await;
            if let Err(failure) = deleted {
                error!(identity = %old.provider_identity, error = %failure, "Replaced resource could not be deleted");
                errors.push(failure.to_string());
                remaining.push(old.clone());
            }
        }
        (remaining, errors)
    }

    async fn delete(
        self: Arc<Self>,
        target: ConvergenceRecord,
        blockers: Vec<String>,
        holders: Vec<String>,
        signals: Arc<FutureTable>,
    ) -> std::result::Result<NodeOutcome, AlreadyResolvedError> {
        let id = target.logical_id.clone();
        let mut guard = PendingGuard::new(Arc::clone(&signals), id.clone());
        let refused = |reason: String,
                       signals: &FutureTable|
         -> std::result::Result<NodeOutcome, AlreadyResolvedError> {
            signals.fail_owner(&id, &reason)?;
            Ok(NodeOutcome::failed(&id, &target.kind, ActionType::Delete, reason, 0))
        };

        if !holders.is_empty() {
            guard.disarm();
            let reason = format!("still used by {}", holders.join(", "));
            warn!("Keeping resource, {}", reason);
            return refused(reason, &signals);
        }

        let waits = blockers.iter().map(|blocker| {
            let signals = Arc::clone(&signals);
            let key = AttributeRef::new(blocker, DELETED);
            async move {
                match signals.get(&key) {
                    Some(signal) => signal.await_value().await.map(|_| ()),
                    None => Ok(()),
                }
            }
        });
        let waited: Option<std::result::Result<Vec<()>, FutureFailure>> = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            waited = futures_util::future::try_join_all(waits) => Some(waited),
        };
        match waited {
            None => {
                return Ok(self.skip_cancelled(&id, &target.kind, ActionType::Delete, &mut guard));
            }
            Some(Err(failure)) => {
                guard.disarm();
                let reason = format!("dependent '{}' was not deleted", failure.key.owner);
                warn!("Keeping resource, {}", reason);
                return refused(reason, &signals);
            }
            Some(Ok(_)) => {}
        }

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            return Ok(self.skip_cancelled(&id, &target.kind, ActionType::Delete, &mut guard));
        };
        if self.cancel.is_cancelled() {
            return Ok(self.skip_cancelled(&id, &target.kind, ActionType::Delete, &mut guard));
        }

        let lock = self.store.lock(&id).await;
        let Some(current) = lock.current().await else {
            debug!("Record already gone");
            signal_deleted(&signals, &id)?;
            guard.disarm();
            return Ok(NodeOutcome::succeeded(&id, &target.kind, ActionType::Delete, None, 0));
        };

        if !current.retired.is_empty() {
            let (remaining, errors) = self.delete_retired(&id, &current.retired).await;
            if let Err(e) = lock.commit(current.clone().with_retired(remaining)).await {
                warn!(error = %e, "Could not record deleted replaced resources");
            }
            if !errors.is_empty() {
                let message = format!("replaced resource could not be deleted: {}", errors.join("; "));
                signals.fail_owner(&id, &message)?;
                self.record_failure();
                guard.disarm();
                return Ok(NodeOutcome::failed(&id, &current.kind, ActionType::Delete, message, 0));
            }
        }

        info!(identity = %current.provider_identity, "Deleting resource");
        let deleted = self
            .compensator
            .call(&id, false, || {
                self.provider.delete(&current.provider_identity, &current.kind)
            })
            .await;
        let outcome = match deleted {
            Ok(deleted) => match lock.remove().await {
                Ok(_) => {
                    signal_deleted(&signals, &id)?;
                    NodeOutcome::succeeded(
                        &id,
                        &current.kind,
                        ActionType::Delete,
                        Some(current.provider_identity.clone()),
                        deleted.attempts,
                    )
                }
                Err(e) => {
                    signals.fail_owner(&id, &e.to_string())?;
                    self.record_failure();
                    NodeOutcome::failed(&id, &current.kind, ActionType::Delete, e.to_string(), deleted.attempts)
                }
            },
            Err(failure) => {
                error!(error = %failure, "Resource could not be deleted");
                signals.fail_owner(&id, &failure.to_string())?;
                self.record_failure();
                NodeOutcome::failed(
                    &id,
                    &current.kind,
                    ActionType::Delete,
                    failure.to_string(),
                    failure.attempts,
                )
            }
        };
        guard.disarm();
        Ok(outcome)
    }

    fn skip_cancelled(
        &self,
        logical_id: &str,
        kind: &str,
        action: ActionType,
        guard: &mut PendingGuard,
    ) -> NodeOutcome {
        debug!("Run cancelled before dispatch");
        guard.fail_pending("run cancelled");
        NodeOutcome::cancelled(logical_id, kind, action)
    }

    fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(max) = self.max_failures
            && failures >= max
            && !self.cancel.is_cancelled()
        {
            warn!(failures, max, "Failure ceiling reached, cancelling remaining nodes");
            self.cancel.cancel();
        }
    }
}

fn signal_deleted(signals: &FutureTable, logical_id: &str) -> std::result::Result<(), AlreadyResolvedError> {
    match signals.get(&AttributeRef::new(logical_id, DELETED)) {
        Some(signal) => signal.resolve(Value::Bool(true)),
        None => Ok(()),
    }
}

fn provisional_action(record: Option<&ConvergenceRecord>, kind: &str) -> ActionType {
    match record {
        None => ActionType::Create,
        Some(record) if record.kind != kind => ActionType::Replace,
        Some(_) => ActionType::Update,
    }
}

async fn join_tasks(tasks: Vec<Task>) -> Result<ApplyResult> {
    let (meta, handles): (Vec<_>, Vec<_>) = tasks
        .into_iter()
        .map(|task| ((task.logical_id, task.kind, task.action), task.handle))
        .unzip();

    let mut result = ApplyResult::new();
    for ((logical_id, kind, action), joined) in meta.into_iter().zip(join_all(handles).await) {
        match joined {
            Ok(Ok(outcome)) => result.push(outcome),
            Ok(Err(violation)) => return Err(violation.into()),
            Err(join_error) => {
                error!(logical_id = %logical_id, error = %join_error, "Node task aborted");
                result.push(NodeOutcome::failed(
                    logical_id,
                    kind,
                    action,
                    format!("task aborted: {}", join_error),
                    0,
                ));
            }
        }
    }
    result.outcomes.sort_by_key(|outcome| outcome.finished_at);
    Ok(result)
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}
