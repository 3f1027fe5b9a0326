//! Change planning
//!
//! Computes what an apply would do without calling the provider. Nodes are
//! visited producers-first; a node's inputs are only known when every
//! producer it references is unchanged, in which case the fingerprint can be
//! compared against the record. Otherwise the final create/update/no-op
//! decision is deferred to dispatch time.

use crate::fingerprint::node_fingerprint;
use crate::graph::DependencyGraph;
use crate::inputs::{InputError, resolve_inputs};
use crate::model::{AttributeRef, ID_ATTRIBUTE};
use serde_json::{Value, json};
use stackflow_cloud::{
    Action, ActionType, ConvergenceRecord, ConvergenceStore, Plan, SecretSource,
};
use std::collections::BTreeMap;
use tracing::debug;

pub async fn plan(
    graph: &DependencyGraph,
    store: &ConvergenceStore,
    secrets: &dyn SecretSource,
) -> Plan {
    let records = store.records().await;
    let salt = store.fingerprint_salt().await;
    let recorded: BTreeMap<&str, &ConvergenceRecord> = records
        .iter()
        .map(|r| (r.logical_id.as_str(), r))
        .collect();

    // records of nodes that stay untouched; their attributes are known now
    let mut known: BTreeMap<&str, &ConvergenceRecord> = BTreeMap::new();
    let mut actions = Vec::new();

    for id in graph.topological_order() {
        let Some(node) = graph.node(&id) else { continue };

        let unknown: Vec<String> = node
            .references()
            .into_iter()
            .filter(|key| lookup(&known, key).is_none())
            .map(|key| key.to_string())
            .collect();

        let action = match recorded.get(id.as_str()).copied() {
            None => Action::new(ActionType::Create, &node.kind, &id),
            Some(record) if record.kind != node.kind => {
                Action::new(ActionType::Replace, &node.kind, &id)
                    .with_detail("previous_kind", json!(record.kind))
            }
            Some(record) if !unknown.is_empty() => Action::new(ActionType::Update, &node.kind, &id)
                .with_detail("provider_identity", json!(record.provider_identity)),
            Some(record) => {
                let resolved =
                    resolve_inputs(node, |key| lookup(&known, key), secrets).await;
                match resolved {
                    Ok(inputs) => {
                        let current = node_fingerprint(node, &inputs, &salt);
                        if current == record.input_fingerprint {
                            known.insert(record.logical_id.as_str(), record);
                            Action::new(ActionType::NoOp, &node.kind, &id)
                        } else {
                            Action::new(ActionType::Update, &node.kind, &id)
                                .with_detail("provider_identity", json!(record.provider_identity))
                        }
                    }
                    Err(InputError::Secret { param, source }) => {
                        debug!(logical_id = %id, param = %param, error = %source, "Secret unavailable while planning");
                        Action::new(ActionType::Update, &node.kind, &id)
                            .deferred(true)
                            .with_detail("unresolved_secret", json!(param))
                    }
                    Err(InputError::Unknown(key)) => Action::new(ActionType::Update, &node.kind, &id)
                        .deferred(true)
                        .with_detail("known_after_apply", json!([key.to_string()])),
                }
            }
        };

        let action = if unknown.is_empty() {
            action
        } else {
            action
                .deferred(true)
                .with_detail("known_after_apply", json!(unknown))
        };
        actions.push(action);
    }

    for id in graph.diff(&records).removed {
        if let Some(record) = recorded.get(id.as_str()) {
            actions.push(
                Action::new(ActionType::Delete, &record.kind, &id)
                    .with_detail("provider_identity", json!(record.provider_identity)),
            );
        }
    }

    Plan::new(actions)
}

/// Destroy plan: every recorded resource, consumers first
pub async fn plan_destroy(store: &ConvergenceStore) -> Plan {
    let records = store.records().await;
    let actions = crate::graph::deletion_order(&records)
        .into_iter()
        .filter_map(|id| records.iter().find(|r| r.logical_id == id))
        .map(|record| {
            Action::new(ActionType::Delete, &record.kind, &record.logical_id)
                .with_detail("provider_identity", json!(record.provider_identity))
        })
        .collect();
    Plan::new(actions)
}

fn lookup(known: &BTreeMap<&str, &ConvergenceRecord>, key: &AttributeRef) -> Option<Value> {
    let record = known.get(key.owner.as_str())?;
    if key.attribute == ID_ATTRIBUTE {
        Some(Value::String(record.provider_identity.clone()))
    } else {
        record.attributes.get(&key.attribute).cloned()
    }
}
