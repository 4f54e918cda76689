use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use logroute_cli::cli::{Cli, Commands};
use logroute_cli::commands;
use logroute_cli::logging;
use logroute_cli::output::OutputWriter;
use logroute_core::config::GeneralConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Logging settings come from the config when it loads; command handlers
    // report load failures themselves.
    let mut general = commands::load_config(config_path)
        .await
        .map(|c| c.general)
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Some(level) = cli.log_level {
        general.log_level = level;
    }
    logging::init_tracing(&general)?;

    let writer = OutputWriter::new(cli.output);
    let result = match cli.command {
        Commands::Route(args) => commands::route::execute(args, config_path, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, config_path, &writer).await,
        Commands::Config(args) => commands::config::execute(args, config_path, &writer).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
    Ok(())
}
