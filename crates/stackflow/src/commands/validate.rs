use colored::Colorize;

pub fn handle() -> anyhow::Result<()> {
    println!("{}", "宣言を検証中...".blue());

    let current_dir = std::env::current_dir()?;
    let stack_file = match stackflow_config::find_stack_file_from(&current_dir) {
        Ok(stack_file) => stack_file,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 宣言ファイルが見つかりません".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };
    println!(
        "宣言ファイル: {} ({})",
        stack_file.path.display().to_string().cyan(),
        stack_file.source
    );

    match stackflow_core::load_stack(&stack_file.path) {
        Ok(stack) => {
            println!("{}", "✓ 宣言は正常です！".green().bold());
            println!();
            println!("サマリー:");
            println!("  スタック: {}", stack.name.cyan());
            println!("  リソース: {}個", stack.graph.len());
            for node in stack.graph.nodes() {
                let lag = if node.lag_sensitive {
                    " [伝播待ちあり]"
                } else {
                    ""
                };
                println!("    - {} ({}){}", node.id.cyan(), node.kind, lag);
            }
            println!("  レベル: {}段", stack.graph.levels().len());
            println!(
                "  エンジン: 並列数 {}, 再試行 {}回",
                stack.engine.parallelism, stack.engine.retry.max_attempts
            );
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 宣言エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
