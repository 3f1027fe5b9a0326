//! engine ノードのパース

use crate::config::EngineConfig;
use crate::error::{FlowError, Result};
use kdl::KdlNode;
use std::time::Duration;

/// engine ノードをパース
///
/// ```kdl
/// engine {
///     parallelism 4
///     max-failures 0
///     retry { max-attempts 3; initial-delay-ms 500; max-delay-ms 10000; multiplier 2.0 }
/// }
/// ```
pub fn parse_engine(node: &KdlNode) -> Result<EngineConfig> {
    let mut config = EngineConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "parallelism" => {
                    config.parallelism = usize::try_from(positive_integer(child)?).map_err(|_| {
                        FlowError::InvalidConfig("parallelism が大きすぎます".to_string())
                    })?;
                }
                "max-failures" => {
                    // 0 は無制限
                    let max = integer(child)?;
                    config.max_failures = match max {
                        0 => None,
                        n => Some(usize::try_from(n).map_err(|_| {
                            FlowError::InvalidConfig("max-failures が大きすぎます".to_string())
                        })?),
                    };
                }
                "retry" => parse_retry(child, &mut config)?,
                other => {
                    return Err(FlowError::InvalidConfig(format!(
                        "engine に不明な設定があります: {}",
                        other
                    )));
                }
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn parse_retry(node: &KdlNode, config: &mut EngineConfig) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        match child.name().value() {
            "max-attempts" => {
                config.retry.max_attempts =
                    u32::try_from(positive_integer(child)?).map_err(|_| {
                        FlowError::InvalidConfig(format!(
                            "retry.max-attempts は {} 以下である必要があります",
                            u32::MAX
                        ))
                    })?;
            }
            "initial-delay-ms" => {
                config.retry.initial_delay = Duration::from_millis(integer(child)?)
            }
            "max-delay-ms" => config.retry.max_delay = Duration::from_millis(integer(child)?),
            "multiplier" => {
                let value = child.entries().first().map(|e| e.value());
                config.retry.backoff_multiplier = value
                    .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
                    .ok_or_else(|| {
                        FlowError::InvalidConfig("retry.multiplier には数値を指定してください".to_string())
                    })?;
            }
            other => {
                return Err(FlowError::InvalidConfig(format!(
                    "retry に不明な設定があります: {}",
                    other
                )));
            }
        }
    }
    Ok(())
}

/// 0以上の整数
fn integer(node: &KdlNode) -> Result<u64> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| {
            FlowError::InvalidConfig(format!(
                "{} には 0 以上の整数を指定してください",
                node.name().value()
            ))
        })
}

fn positive_integer(node: &KdlNode) -> Result<u64> {
    match integer(node)? {
        0 => Err(FlowError::InvalidConfig(format!(
            "{} は 1 以上である必要があります",
            node.name().value()
        ))),
        n => Ok(n),
    }
}
