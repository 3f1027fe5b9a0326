pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

/// 宣言ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";

/// プロジェクトローカルの作業ディレクトリ名 (state.json, lock.json, sandbox.json)
pub const PROJECT_DIR: &str = ".stackflow";

/// カレントディレクトリと .stackflow/ で探すファイル名 (優先順)
pub const CANDIDATES: [&str; 4] = [
    "stack.local.kdl",
    ".stack.local.kdl",
    "stack.kdl",
    ".stack.kdl",
];

/// 宣言ファイルがどこで見つかったか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFileSource {
    /// STACKFLOW_CONFIG_PATH
    Env,
    /// カレントディレクトリ
    CurrentDir,
    /// ./.stackflow/
    ProjectDir,
    /// ~/.config/stackflow/stack.kdl
    Global,
}

impl std::fmt::Display for StackFileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StackFileSource::Env => "環境変数",
            StackFileSource::CurrentDir => "カレントディレクトリ",
            StackFileSource::ProjectDir => "./.stackflow/",
            StackFileSource::Global => "グローバル設定",
        };
        f.write_str(label)
    }
}

/// 発見された宣言ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFile {
    pub path: PathBuf,
    pub source: StackFileSource,
}

/// StackFlowのグローバル設定ディレクトリを取得 (~/.config/stackflow)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトの stack.kdl ファイルを探す
///
/// 以下の優先順位で宣言ファイルを検索:
/// 1. 環境変数 STACKFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. ./.stackflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackflow/stack.kdl (グローバル設定)
pub fn find_stack_file() -> Result<StackFile> {
    let current_dir = std::env::current_dir()?;
    find_stack_file_from(&current_dir)
}

/// 指定ディレクトリを起点に宣言ファイルを探す
pub fn find_stack_file_from(current_dir: &Path) -> Result<StackFile> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(&config_path);
        if path.exists() {
            return Ok(StackFile {
                path,
                source: StackFileSource::Env,
            });
        }
        // 明示指定されたパスが無い場合は他の場所にフォールバックしない
        return Err(ConfigError::EnvPathNotFound(config_path));
    }

    // 2. カレントディレクトリで検索
    if let Some(path) = first_existing(current_dir) {
        return Ok(StackFile {
            path,
            source: StackFileSource::CurrentDir,
        });
    }

    // 3. ./.stackflow/ ディレクトリで検索
    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = first_existing(&project_dir)
    {
        return Ok(StackFile {
            path,
            source: StackFileSource::ProjectDir,
        });
    }

    // 4. グローバル設定ファイル (~/.config/stackflow/stack.kdl)
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackflow").join("stack.kdl");
        if global_config.exists() {
            return Ok(StackFile {
                path: global_config,
                source: StackFileSource::Global,
            });
        }
    }

    Err(ConfigError::StackFileNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
}

/// state.json などを置くプロジェクトルートを決定
///
/// - ./.stackflow/ 内の宣言ファイル → その親ディレクトリ
/// - グローバル設定 → カレントディレクトリ
/// - それ以外 → 宣言ファイルのあるディレクトリ
pub fn project_root(stack_file: &StackFile, current_dir: &Path) -> PathBuf {
    let parent = stack_file.path.parent().map(Path::to_path_buf);
    match stack_file.source {
        StackFileSource::Global => current_dir.to_path_buf(),
        _ => match parent {
            Some(dir) if dir.file_name().is_some_and(|n| n == PROJECT_DIR) => dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| current_dir.to_path_buf()),
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => current_dir.to_path_buf(),
        },
    }
}
