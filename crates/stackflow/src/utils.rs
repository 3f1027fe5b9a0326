use colored::{ColoredString, Colorize};
use stackflow_cloud::{
    ActionType, ApplyResult, ConvergenceStore, OutcomeStatus, Plan, SecretRouter, SecretSource,
    StateLock, StateManager,
};
use stackflow_config::StackFile;
use stackflow_core::{CancelHandle, Stack};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// 読み込み済みのプロジェクト
pub struct Project {
    pub root: PathBuf,
    pub stack_file: StackFile,
    pub stack: Stack,
}

/// 宣言ファイルを探索して読み込む（共通ロジック）
pub fn load_project() -> anyhow::Result<Project> {
    let current_dir = std::env::current_dir()?;
    let stack_file = stackflow_config::find_stack_file_from(&current_dir)?;
    let root = stackflow_config::project_root(&stack_file, &current_dir);
    let stack = stackflow_core::load_stack(&stack_file.path)?;
    Ok(Project {
        root,
        stack_file,
        stack,
    })
}

/// 読み込んだ宣言ファイル情報を表示
pub fn print_loaded_stack_file(stack_file: &StackFile) {
    println!("📄 読み込んだ宣言ファイル:");
    println!(
        "  • {} ({})",
        stack_file.path.display().to_string().cyan(),
        stack_file.source
    );
}

pub fn secret_router() -> Arc<dyn SecretSource> {
    Arc::new(SecretRouter::standard())
}

/// プロジェクトの `.stackflow/state.json` を開く
pub async fn open_store(project: &Project) -> anyhow::Result<Arc<ConvergenceStore>> {
    let store = ConvergenceStore::open(StateManager::new(&project.root)).await?;
    Ok(Arc::new(store))
}

/// 状態ロックを取得してから `.stackflow/state.json` を開く
pub async fn open_store_locked(
    project: &Project,
) -> anyhow::Result<(Arc<ConvergenceStore>, StateLock)> {
    let (store, lock) = ConvergenceStore::open_exclusive(StateManager::new(&project.root)).await?;
    debug!(root = %project.root.display(), "Acquired state lock");
    Ok((Arc::new(store), lock))
}

/// Ctrl-C で実行中の apply/destroy を中断する
pub fn cancel_on_ctrl_c(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "中断を受け付けました。実行中のプロバイダー呼び出しの完了を待っています...".yellow()
            );
            warn!("Cancellation requested from terminal");
            cancel.cancel();
        }
    });
}

fn action_symbol(action_type: ActionType) -> ColoredString {
    match action_type {
        ActionType::Create => "+".green().bold(),
        ActionType::Update => "~".yellow().bold(),
        ActionType::Replace => "-/+".magenta().bold(),
        ActionType::Delete => "-".red().bold(),
        ActionType::NoOp => "=".dimmed(),
    }
}

/// 実行計画を表示
pub fn print_plan(plan: &Plan) {
    println!();
    println!("{}", "実行計画:".bold());
    if plan.actions.is_empty() {
        println!("  (リソースなし)");
    }
    for action in &plan.actions {
        let mut line = format!(
            "  {} {} ({})",
            action_symbol(action.action_type),
            action.logical_id.cyan(),
            action.resource_kind
        );
        if action.deferred {
            line.push_str(&format!(" {}", "[適用時に確定]".dimmed()));
        }
        println!("{}", line);

        if let Some(refs) = action.details.get("known_after_apply").and_then(|v| v.as_array()) {
            let refs: Vec<&str> = refs.iter().filter_map(|r| r.as_str()).collect();
            println!("      適用後に判明: {}", refs.join(", "));
        }
        if let Some(reason) = action.details.get("unresolved_secret").and_then(|v| v.as_str()) {
            println!("      {} {}", "⚠ シークレット未解決:".yellow(), reason);
        }
        if let Some(previous) = action.details.get("previous_kind").and_then(|v| v.as_str()) {
            println!("      種別の変更: {} → {}", previous, action.resource_kind);
        }
    }
    println!();
    println!("サマリー: {}", plan.summary());
}

/// 実行結果を表示
pub fn print_outcomes(result: &ApplyResult) {
    println!();
    println!("{}", "実行結果:".bold());
    for outcome in &result.outcomes {
        match outcome.status {
            OutcomeStatus::Succeeded => {
                let identity = outcome.provider_identity.as_deref().unwrap_or("-");
                let retries = if outcome.attempts > 1 {
                    format!(" ({}回目で成功)", outcome.attempts)
                } else {
                    String::new()
                };
                println!(
                    "  {} {} {} [{}]{}",
                    "✓".green(),
                    outcome.logical_id.cyan(),
                    outcome.action,
                    identity,
                    retries
                );
            }
            OutcomeStatus::Failed => {
                println!(
                    "  {} {} {}",
                    "✗".red(),
                    outcome.logical_id.cyan(),
                    outcome.action
                );
                if let Some(error) = &outcome.error {
                    println!("      {}", error.red());
                }
            }
            OutcomeStatus::Cancelled => {
                println!(
                    "  {} {} (中断のため未実行)",
                    "-".yellow(),
                    outcome.logical_id.cyan()
                );
            }
        }
    }
    println!();
    let summary = format!("サマリー: {} ({}ms)", result.summary(), result.duration_ms);
    if result.is_success() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
}
