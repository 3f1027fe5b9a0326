use crate::utils::{self, Project};
use colored::Colorize;
use stackflow_cloud_local::SandboxProvider;
use stackflow_core::Scheduler;
use std::sync::Arc;

/// 戻り値は終了コード
pub async fn handle(
    project: &Project,
    yes: bool,
    parallelism: Option<usize>,
) -> anyhow::Result<i32> {
    println!("{}", "スタックを適用します...".blue().bold());
    utils::print_loaded_stack_file(&project.stack_file);
    println!("スタック: {}", project.stack.name.cyan());

    let mut config = project.stack.engine.clone();
    if let Some(parallelism) = parallelism {
        config = config.with_parallelism(parallelism);
    }
    config.validate()?;

    // 実行する場合は状態を読む前にロックを取る
    let (store, lock) = if yes {
        let (store, lock) = utils::open_store_locked(project).await?;
        (store, Some(lock))
    } else {
        (utils::open_store(project).await?, None)
    };
    let secrets = utils::secret_router();
    let plan = stackflow_core::plan(&project.stack.graph, &store, secrets.as_ref()).await;
    utils::print_plan(&plan);

    if !plan.has_changes {
        println!("{}", "✓ 変更はありません".green());
        return Ok(0);
    }

    // 確認（--yesが指定されていない場合）
    let Some(lock) = lock else {
        println!();
        println!("{}", "警告: 上記の変更をプロバイダーに適用します。".yellow());
        println!("実行するには --yes オプションを指定してください");
        return Ok(0);
    };

    let provider = SandboxProvider::open(&project.root).await?;
    println!();
    println!(
        "{} (並列数: {})",
        "適用中...".blue(),
        config.parallelism.to_string().cyan()
    );

    let scheduler = Scheduler::new(Arc::new(provider), secrets, store, config);
    utils::cancel_on_ctrl_c(scheduler.cancel_handle());
    let result = scheduler.apply(&project.stack.graph).await;
    lock.release().await?;
    let result = result?;

    utils::print_outcomes(&result);
    Ok(result.exit_code())
}
