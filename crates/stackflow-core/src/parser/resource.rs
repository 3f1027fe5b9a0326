//! resource ノードのパース

use super::value::{children_to_object, kdl_to_json};
use crate::error::{FlowError, Result};
use crate::model::{AttributeRef, Input, ResourceNode};
use kdl::KdlNode;
use serde_json::Value;

/// resource ノードをパース
///
/// ```kdl
/// resource "database" kind="docdb-cluster" lag-sensitive=#true {
///     depends-on "network"
///     state { engine "docdb" }
///     input "subnet_ids" ref="network.private_subnet_ids"
/// }
/// ```
pub fn parse_resource(node: &KdlNode) -> Result<ResourceNode> {
    let id = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| FlowError::InvalidConfig("resource には名前が必要です".to_string()))?
        .to_string();

    let kind = node
        .get("kind")
        .and_then(|v| v.as_string())
        .ok_or_else(|| {
            FlowError::InvalidConfig(format!("resource '{}' には kind が必要です", id))
        })?
        .to_string();

    let lag_sensitive = node
        .get("lag-sensitive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut resource = ResourceNode::new(id, kind).lag_sensitive(lag_sensitive);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "depends-on" => {
                    // depends-on "a" "b" 形式で複数指定可能
                    for entry in child.entries().iter().filter(|e| e.name().is_none()) {
                        if let Some(producer) = entry.value().as_string() {
                            resource.depends_on.push(producer.to_string());
                        }
                    }
                }
                "state" => {
                    let mut state = children_to_object(child)?;
                    // state engine="docdb" のようなプロパティ形式も許可
                    for entry in child.entries() {
                        if let Some(name) = entry.name() {
                            state.insert(name.value().to_string(), kdl_to_json(entry.value())?);
                        }
                    }
                    resource.desired_state = Value::Object(state);
                }
                "input" => {
                    let (param, input) = parse_input(&resource.id, child)?;
                    resource.inputs.insert(param, input);
                }
                other => {
                    return Err(FlowError::InvalidConfig(format!(
                        "resource '{}' に不明な子ノードがあります: {}",
                        resource.id, other
                    )));
                }
            }
        }
    }

    Ok(resource)
}

/// input ノードをパース
///
/// - `input "p" ref="owner.attr"`
/// - `input "p" secret="env://NAME"`
/// - `input "p" template="...${owner.attr}..."`
/// - `input "p" 27017` (リテラル)
fn parse_input(resource_id: &str, node: &KdlNode) -> Result<(String, Input)> {
    let mut args = node.entries().iter().filter(|e| e.name().is_none());
    let param = args
        .next()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| {
            FlowError::InvalidConfig(format!(
                "resource '{}' の input には名前が必要です",
                resource_id
            ))
        })?
        .to_string();

    let invalid = |reason: &str| {
        FlowError::InvalidConfig(format!(
            "resource '{}' の input '{}': {}",
            resource_id, param, reason
        ))
    };

    let input = if let Some(reference) = node.get("ref") {
        let reference = reference
            .as_string()
            .ok_or_else(|| invalid("ref には文字列を指定してください"))?;
        let key = AttributeRef::parse(reference)
            .ok_or_else(|| invalid("ref は owner.attribute 形式で指定してください"))?;
        Input::Ref(key)
    } else if let Some(secret) = node.get("secret") {
        let secret = secret
            .as_string()
            .ok_or_else(|| invalid("secret には文字列を指定してください"))?;
        Input::secret(secret)
    } else if let Some(template) = node.get("template") {
        let template = template
            .as_string()
            .ok_or_else(|| invalid("template には文字列を指定してください"))?;
        Input::template(template)
    } else {
        // 名前以降の位置引数・子ノードをリテラル値として扱う
        let rest: Vec<Value> = args
            .map(|e| kdl_to_json(e.value()))
            .collect::<Result<_>>()?;
        let value = if node.children().is_some() {
            Value::Object(children_to_object(node)?)
        } else {
            match rest.len() {
                0 => return Err(invalid("値を指定してください (ref / secret / template / リテラル)")),
                1 => rest.into_iter().next().unwrap_or(Value::Null),
                _ => Value::Array(rest),
            }
        };
        Input::Value(value)
    };

    Ok((param, input))
}
