use std::path::Path;

use clap::Parser;

use pathwatch::cli::commands;
use pathwatch::cli::{Cli, Commands};
use pathwatch::{FilePath, Settings, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init runs before any settings file exists
    if let Commands::Init { force } = cli.command {
        commands::init::run_init(Path::new("."), force)?;
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    logging::init_with_config(&config.logging, cli.verbose);

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Config => commands::init::run_config(&config),
        Commands::Watch {
            path,
            recursive,
            no_recursive,
            json,
        } => {
            let recursive = Commands::watch_recursive(recursive, no_recursive);
            commands::watch::run(FilePath::new(path), recursive, json, &config).await
        }
        Commands::Download { path, if_needed } => {
            commands::download::run(FilePath::new(path), if_needed, &config).await
        }
        Commands::Ls {
            path,
            recursive,
            ext,
        } => commands::ls::run(FilePath::new(path), recursive, ext.as_deref()),
    }
}
