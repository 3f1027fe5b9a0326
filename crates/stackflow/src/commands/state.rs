use crate::utils::{self, Project};
use colored::Colorize;

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    let store = utils::open_store(project).await?;
    let records = store.records().await;

    println!(
        "{}",
        format!("収束状態: {} ({} 件)", project.stack.name, records.len()).bold()
    );
    if records.is_empty() {
        println!("  記録されたリソースはありません");
        return Ok(());
    }

    for record in &records {
        let declared = if project.stack.graph.contains(&record.logical_id) {
            String::new()
        } else {
            format!(" {}", "[宣言から削除済み]".yellow())
        };
        println!();
        println!(
            "  {} ({}){}",
            record.logical_id.cyan().bold(),
            record.kind,
            declared
        );
        println!("    ID:           {}", record.provider_identity);
        println!(
            "    フィンガープリント: {}",
            record.input_fingerprint.chars().take(12).collect::<String>()
        );
        println!(
            "    最終適用:     {}",
            record.last_applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if !record.dependencies.is_empty() {
            println!("    依存:         {}", record.dependencies.join(", "));
        }
        for (key, value) in &record.attributes {
            println!("    {} = {}", key.dimmed(), value);
        }
    }
    Ok(())
}
