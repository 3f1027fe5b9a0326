//! Input fingerprints
//!
//! A fingerprint is the SHA-256 of the canonical JSON encoding (object keys
//! sorted, no whitespace) of a node's kind, desired state and resolved
//! inputs. Equal fingerprints mean the provider call can be skipped.
//!
//! Secret inputs never enter the hash in plaintext. They are first sealed
//! with the state file's salt, so a stored fingerprint cannot be checked
//! against guessed secrets without that salt.

use crate::model::{Input, ResourceNode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub fn fingerprint(kind: &str, desired_state: &Value, inputs: &BTreeMap<String, Value>) -> String {
    let mut canonical = String::new();
    canonical.push_str("{\"desired_state\":");
    write_canonical(desired_state, &mut canonical);
    canonical.push_str(",\"inputs\":{");
    for (i, (param, value)) in inputs.iter().enumerate() {
        if i > 0 {
            canonical.push(',');
        }
        canonical.push_str(&Value::String(param.clone()).to_string());
        canonical.push(':');
        write_canonical(value, &mut canonical);
    }
    canonical.push_str("},\"kind\":");
    canonical.push_str(&Value::String(kind.to_string()).to_string());
    canonical.push('}');

    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/// Fingerprint of `node` with its resolved `inputs`, sealing secret inputs with `salt`
pub fn node_fingerprint(node: &ResourceNode, inputs: &BTreeMap<String, Value>, salt: &str) -> String {
    let sealed: BTreeMap<String, Value> = inputs
        .iter()
        .map(|(param, value)| match node.inputs.get(param) {
            Some(Input::Secret(_)) => (param.clone(), Value::String(seal(salt, value))),
            _ => (param.clone(), value.clone()),
        })
        .collect();
    fingerprint(&node.kind, &node.desired_state, &sealed)
}

fn seal(salt: &str, value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    format!("sealed:{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, value)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(
            "vpc",
            &json!({"cidr": "10.0.0.0/16", "tags": {"env": "dev", "app": "weather"}}),
            &inputs(&[("zone", json!("a"))]),
        );
        let b = fingerprint(
            "vpc",
            &json!({"tags": {"app": "weather", "env": "dev"}, "cidr": "10.0.0.0/16"}),
            &inputs(&[("zone", json!("a"))]),
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_any_part() {
        let state = json!({"cidr": "10.0.0.0/16"});
        let base = fingerprint("vpc", &state, &inputs(&[("zone", json!("a"))]));

        assert_ne!(base, fingerprint("subnet", &state, &inputs(&[("zone", json!("a"))])));
        assert_ne!(
            base,
            fingerprint("vpc", &json!({"cidr": "10.1.0.0/16"}), &inputs(&[("zone", json!("a"))]))
        );
        assert_ne!(base, fingerprint("vpc", &state, &inputs(&[("zone", json!("b"))])));
        assert_ne!(base, fingerprint("vpc", &state, &inputs(&[])));
    }

    #[test]
    fn test_array_order_matters() {
        let a = fingerprint("x", &json!({"ids": [1, 2]}), &BTreeMap::new());
        let b = fingerprint("x", &json!({"ids": [2, 1]}), &BTreeMap::new());
        assert_ne!(a, b);
    }

    #[test]
    fn test_secret_inputs_are_salted() {
        let node = ResourceNode::new("database", "docdb-cluster")
            .with_secret("password", "env://DB_PASSWORD")
            .with_value("port", json!(27017));
        let resolved = inputs(&[("password", json!("hunter2")), ("port", json!(27017))]);

        let salted = node_fingerprint(&node, &resolved, "salt-a");
        assert_eq!(salted, node_fingerprint(&node, &resolved, "salt-a"));
        assert_ne!(salted, node_fingerprint(&node, &resolved, "salt-b"));
        // the unsalted hash of the plaintext is not what gets stored
        assert_ne!(salted, fingerprint(&node.kind, &node.desired_state, &resolved));
        // a rotated secret still changes the fingerprint
        let rotated = inputs(&[("password", json!("hunter3")), ("port", json!(27017))]);
        assert_ne!(salted, node_fingerprint(&node, &rotated, "salt-a"));
    }

    #[test]
    fn test_plain_inputs_are_not_sealed() {
        let node = ResourceNode::new("network", "vpc").with_value("zone", json!("a"));
        let resolved = inputs(&[("zone", json!("a"))]);
        assert_eq!(
            node_fingerprint(&node, &resolved, "salt"),
            fingerprint("vpc", &node.desired_state, &resolved)
        );
    }
}
