//! KDLの値とノードをJSONに変換

use crate::error::{FlowError, Result};
use kdl::{KdlNode, KdlValue};
use serde_json::{Map, Number, Value};

/// KDLの値をJSONに変換
pub fn kdl_to_json(value: &KdlValue) -> Result<Value> {
    Ok(match value {
        KdlValue::String(s) => Value::String(s.clone()),
        KdlValue::Integer(i) => {
            let n = i64::try_from(*i).map_err(|_| {
                FlowError::InvalidConfig(format!("整数が大きすぎます: {}", i))
            })?;
            Value::Number(Number::from(n))
        }
        KdlValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| FlowError::InvalidConfig(format!("無効な数値: {}", f)))?,
        KdlValue::Bool(b) => Value::Bool(*b),
        KdlValue::Null => Value::Null,
    })
}

/// 位置引数をJSONに変換 (1つなら値、複数なら配列)
fn arguments_to_json(node: &KdlNode) -> Result<Option<Value>> {
    let args = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| kdl_to_json(e.value()))
        .collect::<Result<Vec<_>>>()?;
    Ok(match args.len() {
        0 => None,
        1 => args.into_iter().next(),
        _ => Some(Value::Array(args)),
    })
}

/// ノードの子をJSONオブジェクトに変換
///
/// ```kdl
/// state {
///     engine "docdb"
///     tags { env "dev" }
///     subnets "a" "b"
/// }
/// ```
///
/// 同じキーが複数回現れた場合は配列になります。
pub fn children_to_object(node: &KdlNode) -> Result<Map<String, Value>> {
    let mut object = Map::new();
    let Some(children) = node.children() else {
        return Ok(object);
    };

    for child in children.nodes() {
        let key = child.name().value().to_string();
        let value = node_to_json(child)?;
        if is_repeated(children.nodes(), &key) {
            if let Value::Array(items) = object
                .entry(key)
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                items.push(value);
            }
        } else {
            object.insert(key, value);
        }
    }
    Ok(object)
}

/// 引数・プロパティ・子ノードを1つのJSON値にまとめる
fn node_to_json(node: &KdlNode) -> Result<Value> {
    let mut props = Map::new();
    for entry in node.entries() {
        if let Some(name) = entry.name() {
            props.insert(name.value().to_string(), kdl_to_json(entry.value())?);
        }
    }
    let children = children_to_object(node)?;
    let args = arguments_to_json(node)?;

    if props.is_empty() && node.children().is_none() {
        return Ok(args.unwrap_or(Value::Null));
    }

    let mut object = props;
    object.extend(children);
    if let Some(args) = args {
        object.insert("value".to_string(), args);
    }
    Ok(Value::Object(object))
}

fn is_repeated(nodes: &[KdlNode], key: &str) -> bool {
    nodes.iter().filter(|n| n.name().value() == key).count() > 1
}
