use std::path::PathBuf;
use thiserror::Error;

/// Errors detected while building the declaration set, before any provider call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("循環依存が検出されました: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("リソース名が重複しています: {0}")]
    DuplicateId(String),

    #[error("無効なリソース名: '{0}' (英数字, '-', '_' のみ使用できます)")]
    InvalidLogicalId(String),

    #[error("'{consumer}' が未定義のリソース '{producer}' を参照しています")]
    UnknownReference { consumer: String, producer: String },

    #[error("'{logical_id}' の state はオブジェクトである必要があります: {reason}")]
    InvalidDesiredState { logical_id: String, reason: String },

    #[error("'{logical_id}' の input '{param}' が不正です: {reason}")]
    InvalidInput {
        logical_id: String,
        param: String,
        reason: String,
    },
}

impl DeclarationError {
    /// Nodes on the cycle, without the repeated closing node
    pub fn cycle_members(&self) -> Option<&[String]> {
        match self {
            DeclarationError::Cycle { path } if !path.is_empty() => Some(&path[..path.len() - 1]),
            _ => None,
        }
    }
}

/// A future was resolved twice; always an orchestrator bug
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("attribute {owner}.{attribute} was already resolved")]
pub struct AlreadyResolvedError {
    pub owner: String,
    pub attribute: String,
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("宣言エラー: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("内部不変条件の違反: {0}")]
    AlreadyResolved(#[from] AlreadyResolvedError),

    #[error("クラウドエラー: {0}")]
    Cloud(#[from] stackflow_cloud::CloudError),

    #[error("スケジューラエラー: {0}")]
    Scheduler(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
