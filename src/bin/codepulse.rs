//! codepulse CLI - repository metrics, duplicate clusters and dependency graphs
//!
//! Runs analysis jobs against local checkouts through the same orchestrator
//! the library exposes, and manages configuration and saved jobs.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Analyze(args) => cli::analyze_command(*args, config_path).await?,
        Commands::Resume(args) => cli::resume_command(args, config_path).await?,
        Commands::ListJobs => cli::list_jobs(config_path).await?,
        Commands::SweepCache => cli::sweep_cache(config_path).await?,
        Commands::PrintDefaultConfig => cli::print_default_config().await?,
        Commands::InitConfig(args) => cli::init_config(args).await?,
        Commands::ValidateConfig(args) => cli::validate_config(args).await?,
        Commands::ListLanguages => cli::list_languages().await?,
    }

    Ok(())
}
