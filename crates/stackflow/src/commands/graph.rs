use crate::utils::{self, Project};
use colored::Colorize;

pub fn handle(project: &Project) {
    utils::print_loaded_stack_file(&project.stack_file);
    let graph = &project.stack.graph;

    println!();
    println!(
        "{}",
        format!("依存グラフ: {} ({} リソース)", project.stack.name, graph.len()).bold()
    );

    // 同じレベルのリソースは並列に実行されうる
    for (depth, level) in graph.levels().iter().enumerate() {
        println!();
        println!("{}", format!("レベル {}", depth).blue());
        for id in level {
            let Some(node) = graph.node(id) else {
                continue;
            };
            let producers: Vec<&str> = graph.producers_of(id).map(String::as_str).collect();
            if producers.is_empty() {
                println!("  • {} ({})", id.cyan(), node.kind);
            } else {
                println!(
                    "  • {} ({}) ← {}",
                    id.cyan(),
                    node.kind,
                    producers.join(", ")
                );
            }
        }
    }
}
