use crate::utils::{self, Project};
use colored::Colorize;

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    println!("{}", "実行計画を作成中...".blue());
    utils::print_loaded_stack_file(&project.stack_file);
    println!("スタック: {}", project.stack.name.cyan());

    let store = utils::open_store(project).await?;
    let secrets = utils::secret_router();
    let plan = stackflow_core::plan(&project.stack.graph, &store, secrets.as_ref()).await;

    utils::print_plan(&plan);
    if !plan.has_changes {
        println!("{}", "✓ 変更はありません".green());
    }
    Ok(())
}
