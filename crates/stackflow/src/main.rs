mod commands;
mod utils;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "宣言する。つながる。インフラは、依存の順に収束する。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 実行計画を表示
    Plan,
    /// 宣言どおりにリソースを作成・更新・削除
    Apply {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
        /// 同時に実行するプロバイダー呼び出しの上限 (engine の設定を上書き)
        #[arg(short = 'j', long, env = "STACKFLOW_PARALLELISM")]
        parallelism: Option<usize>,
    },
    /// 記録されている全リソースを依存の逆順に削除
    Destroy {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 宣言ファイルを検証
    Validate,
    /// 依存グラフを表示
    Graph,
    /// 記録済みの収束状態を表示
    State,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderr、進捗表示はstdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    // Versionコマンドは宣言ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Validateは読み込みエラー自体を報告する
    if matches!(cli.command, Commands::Validate) {
        return commands::validate::handle();
    }

    let project = utils::load_project()?;

    let exit_code = match cli.command {
        Commands::Plan => {
            commands::plan::handle(&project).await?;
            0
        }
        Commands::Apply { yes, parallelism } => {
            commands::apply::handle(&project, yes, parallelism).await?
        }
        Commands::Destroy { yes } => commands::destroy::handle(&project, yes).await?,
        Commands::Graph => {
            commands::graph::handle(&project);
            0
        }
        Commands::State => {
            commands::state::handle(&project).await?;
            0
        }
        Commands::Validate => {
            unreachable!("Validate is handled before project loading");
        }
        Commands::Version => {
            unreachable!("Version is handled before project loading");
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
