//! tags ノードのパースと各リソースへの適用

use super::value::kdl_to_json;
use crate::error::{FlowError, Result};
use crate::model::ResourceNode;
use kdl::KdlNode;
use serde_json::Value;
use std::collections::BTreeMap;

/// tags ノードをパース
///
/// ```kdl
/// tags PROJECT="WeatherAlertingSystem" {
///     owner "platform"
/// }
/// ```
pub fn parse_tags(node: &KdlNode) -> Result<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();

    for entry in node.entries() {
        let Some(key) = entry.name() else {
            return Err(FlowError::InvalidConfig(
                "tags には キー=値 の形式で指定してください".to_string(),
            ));
        };
        tags.insert(key.value().to_string(), tag_value(key.value(), entry.value())?);
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value();
            let value = child.entries().first().ok_or_else(|| {
                FlowError::InvalidConfig(format!("タグ {} に値がありません", key))
            })?;
            tags.insert(key.to_string(), tag_value(key, value.value())?);
        }
    }

    Ok(tags)
}

fn tag_value(key: &str, value: &kdl::KdlValue) -> Result<String> {
    match kdl_to_json(value)? {
        Value::String(s) => Ok(s),
        Value::Null => Err(FlowError::InvalidConfig(format!(
            "タグ {} に null は指定できません",
            key
        ))),
        other => Ok(other.to_string()),
    }
}

/// スタック共通タグを desired state の `tags` に合成する。
/// リソース側で同じキーを指定した場合はリソース側が優先されます。
pub fn apply_stack_tags(resource: &mut ResourceNode, tags: &BTreeMap<String, String>) -> Result<()> {
    if tags.is_empty() {
        return Ok(());
    }

    if resource.desired_state.is_null() {
        resource.desired_state = Value::Object(Default::default());
    }
    let Value::Object(state) = &mut resource.desired_state else {
        return Err(FlowError::InvalidConfig(format!(
            "リソース {} の state がオブジェクトではないためタグを付与できません",
            resource.id
        )));
    };

    let merged = state
        .entry("tags")
        .or_insert_with(|| Value::Object(Default::default()));
    let Value::Object(merged) = merged else {
        return Err(FlowError::InvalidConfig(format!(
            "リソース {} の tags はオブジェクトで指定してください",
            resource.id
        )));
    };
    for (key, value) in tags {
        merged
            .entry(key.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }
    Ok(())
}
