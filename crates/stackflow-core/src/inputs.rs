//! Input resolution
//!
//! Turns a node's declared inputs into concrete values once its producers
//! have settled, and merges them into the desired state to form the payload
//! handed to the provider.

use crate::future::{FutureFailure, FutureTable};
use crate::model::{AttributeRef, Input, ResourceNode};
use futures_util::future::try_join_all;
use serde_json::Value;
use stackflow_cloud::{CloudError, SecretSource};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    /// The value is not known yet (planning only)
    #[error("{0} is known only after apply")]
    Unknown(AttributeRef),

    #[error("secret for input '{param}' could not be resolved: {source}")]
    Secret {
        param: String,
        #[source]
        source: CloudError,
    },
}

/// Wait until every attribute the node references has settled.
/// Returns the first failure as soon as any producer fails.
pub async fn wait_for_references(
    node: &ResourceNode,
    futures: &FutureTable,
) -> Result<(), FutureFailure> {
    let waits = node.references().into_iter().map(|key| async move {
        match futures.get(&key) {
            Some(future) => future.await_value().await.map(|_| ()),
            None => Err(FutureFailure {
                reason: "no future registered for this attribute".to_string(),
                key,
            }),
        }
    });
    try_join_all(waits).await.map(|_| ())
}

/// Resolve every input of `node`.
///
/// `lookup` answers attribute references; secrets are fetched from `secrets`.
/// The returned map contains plaintext secret values and must never be
/// persisted.
pub async fn resolve_inputs<F>(
    node: &ResourceNode,
    lookup: F,
    secrets: &dyn SecretSource,
) -> Result<BTreeMap<String, Value>, InputError>
where
    F: Fn(&AttributeRef) -> Option<Value>,
{
    let mut resolved = BTreeMap::new();
    for (param, input) in &node.inputs {
        let value = match input {
            Input::Value(value) => value.clone(),
            Input::Ref(key) => lookup(key).ok_or_else(|| InputError::Unknown(key.clone()))?,
            Input::Template(template) => {
                Value::String(template.render(&lookup).map_err(InputError::Unknown)?)
            }
            Input::Secret(reference) => {
                let secret = secrets
                    .resolve(reference)
                    .await
                    .map_err(|source| InputError::Secret {
                        param: param.clone(),
                        source,
                    })?;
                Value::String(secret.expose().to_string())
            }
        };
        resolved.insert(param.clone(), value);
    }
    Ok(resolved)
}

/// Desired state with resolved inputs merged in; input keys win
pub fn render_payload(desired_state: &Value, inputs: &BTreeMap<String, Value>) -> Value {
    let mut payload = match desired_state {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    for (param, value) in inputs {
        payload.insert(param.clone(), value.clone());
    }
    Value::Object(payload)
}
