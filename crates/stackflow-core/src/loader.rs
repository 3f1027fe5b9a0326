//! 統合ローダー
//!
//! 宣言ファイルの読み込み、パース、依存グラフの構築を統合

use crate::config::EngineConfig;
use crate::error::{FlowError, Result};
use crate::graph::DependencyGraph;
use crate::parser::parse_stack_string;
use std::path::Path;
use tracing::{debug, info, instrument};

/// 検証済みの宣言
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub engine: EngineConfig,
    pub graph: DependencyGraph,
}

/// 宣言ファイルを読み込んで Stack を生成
///
/// 以下の処理を実行:
/// 1. ファイル読み込み
/// 2. KDLパース
/// 3. 依存グラフの構築と検証 (循環検出を含む)
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_stack(path: &Path) -> Result<Stack> {
    info!("Starting stack load");

    debug!("Step 1: Reading declaration file");
    let content = std::fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // `.stackflow/stack.kdl` is named after the project directory
    let dir = match path.parent() {
        Some(dir) if dir.file_name().is_some_and(|n| n == stackflow_cloud::state::STATE_DIR) => {
            dir.parent()
        }
        other => other,
    };
    let name = dir
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    load_stack_from_str(&content, name)
}

/// 文字列から Stack を生成
#[instrument(skip(content))]
pub fn load_stack_from_str(content: &str, default_name: String) -> Result<Stack> {
    debug!("Step 2: Parsing KDL");
    let declaration = parse_stack_string(content, default_name)?;

    debug!("Step 3: Building dependency graph");
    let graph = DependencyGraph::build(declaration.resources)?;
    info!(
        project = %declaration.name,
        resources = graph.len(),
        "Stack loaded successfully"
    );

    Ok(Stack {
        name: declaration.name,
        engine: declaration.engine,
        graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeclarationError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_stack_from_file() {
        let temp_dir = tempdir().unwrap();
        let project = temp_dir.path().join("weather");
        fs::create_dir(&project).unwrap();
        let path = project.join("stack.kdl");
        fs::write(
            &path,
            r#"
            resource "network" kind="vpc"
            resource "database" kind="docdb-cluster" {
                input "vpc" ref="network.vpc_id"
            }
            "#,
        )
        .unwrap();

        let stack = load_stack(&path).unwrap();
        assert_eq!(stack.name, "weather");
        assert_eq!(stack.graph.topological_order(), vec!["network", "database"]);
    }

    #[test]
    fn test_project_dir_file_takes_project_name() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path().join("weather").join(".stackflow");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stack.kdl");
        fs::write(&path, r#"resource "network" kind="vpc""#).unwrap();

        let stack = load_stack(&path).unwrap();
        assert_eq!(stack.name, "weather");
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempdir().unwrap();
        let result = load_stack(&temp_dir.path().join("stack.kdl"));
        assert!(matches!(result, Err(FlowError::IoError { .. })));
    }

    #[test]
    fn test_cycle_is_rejected_at_load() {
        let result = load_stack_from_str(
            r#"
            resource "a" kind="x" { input "p" ref="b.out" }
            resource "b" kind="x" { input "p" ref="a.out" }
            "#,
            "test".to_string(),
        );
        match result {
            Err(FlowError::Declaration(err @ DeclarationError::Cycle { .. })) => {
                assert_eq!(err.cycle_members().unwrap().len(), 2);
            }
            other => panic!("expected cycle error, got {:?}", other.map(|s| s.name)),
        }
    }
}
