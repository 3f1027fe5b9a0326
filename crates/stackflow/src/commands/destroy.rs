use crate::utils::{self, Project};
use colored::Colorize;
use stackflow_cloud_local::SandboxProvider;
use stackflow_core::Scheduler;
use std::sync::Arc;

/// 戻り値は終了コード
pub async fn handle(project: &Project, yes: bool) -> anyhow::Result<i32> {
    println!("{}", "スタックを削除します...".yellow().bold());
    utils::print_loaded_stack_file(&project.stack_file);
    println!("スタック: {}", project.stack.name.cyan());

    // 実行する場合は状態を読む前にロックを取る
    let (store, lock) = if yes {
        let (store, lock) = utils::open_store_locked(project).await?;
        (store, Some(lock))
    } else {
        (utils::open_store(project).await?, None)
    };
    let plan = stackflow_core::plan_destroy(&store).await;
    utils::print_plan(&plan);

    if !plan.has_changes {
        println!("{}", "✓ 削除するリソースはありません".green());
        return Ok(0);
    }

    let Some(lock) = lock else {
        println!();
        println!(
            "{}",
            "警告: 記録されている全リソースを削除します。この操作は元に戻せません。".yellow()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(0);
    };

    let provider = SandboxProvider::open(&project.root).await?;
    println!();
    println!("{}", "削除中...".yellow());

    let scheduler = Scheduler::new(
        Arc::new(provider),
        utils::secret_router(),
        store,
        project.stack.engine.clone(),
    );
    utils::cancel_on_ctrl_c(scheduler.cancel_handle());
    let result = scheduler.destroy().await;
    lock.release().await?;
    let result = result?;

    utils::print_outcomes(&result);
    Ok(result.exit_code())
}
