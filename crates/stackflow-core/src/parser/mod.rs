//! KDLパーサー
//!
//! StackFlowの宣言ファイル (stack.kdl) をパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod engine;
mod resource;
mod tags;
mod value;

use engine::parse_engine;
use resource::parse_resource;
use tags::{apply_stack_tags, parse_tags};

use crate::error::Result;
use crate::model::StackDeclaration;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてStackDeclarationを生成
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<StackDeclaration> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_stack_string(&content, name)
}

/// KDL文字列をパース
pub fn parse_stack_string(content: &str, default_name: String) -> Result<StackDeclaration> {
    let doc: KdlDocument = content.parse()?;

    let mut declaration = StackDeclaration {
        name: default_name,
        ..Default::default()
    };

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) =
                    node.entries().first().and_then(|e| e.value().as_string())
                {
                    declaration.name = project_name.to_string();
                }
            }
            "engine" => {
                declaration.engine = parse_engine(node)?;
            }
            "tags" => {
                declaration.tags.extend(parse_tags(node)?);
            }
            "resource" => {
                declaration.resources.push(parse_resource(node)?);
            }
            other => {
                // 不明なノードはスキップ
                tracing::warn!(node = %other, "Ignoring unknown top-level node");
            }
        }
    }

    for resource in &mut declaration.resources {
        apply_stack_tags(resource, &declaration.tags)?;
    }

    Ok(declaration)
}

#[cfg(test)]
mod tests;
