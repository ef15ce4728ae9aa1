// src/main.rs - noveler entry point

use clap::Parser;

use noveler::cli::ask::{run_ask, AskArgs};
use noveler::cli::{Cli, Commands};
use noveler::infra::config::Config;
use noveler::infra::{logger, paths};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Respects RUST_LOG; writes to stderr
    logger::init_logging(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load config (falls back to defaults if no config.toml)
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config_path = cli.config.clone().unwrap_or_else(paths::config_file_path);
    paths::ensure_dirs().await?;

    match cli.command {
        Commands::Chat => noveler::cli::chat::run_chat(config, config_path).await,
        Commands::Bridge => noveler::cli::bridge::run_bridge(config, config_path).await,
        Commands::Ask {
            command,
            file,
            line,
            selection,
        } => {
            run_ask(
                config,
                config_path,
                AskArgs {
                    command,
                    file,
                    line,
                    selection,
                },
            )
            .await
        }
        Commands::Sessions { action } => noveler::cli::sessions::run_sessions(action, &config).await,
    }
}
