//! CLI argument structures.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repository analysis: complexity, duplicates and dependency graphs
#[derive(Parser)]
#[command(name = "codepulse")]
#[command(version = VERSION)]
#[command(about = "codepulse - repository metrics, duplicate clusters and dependency graphs")]
#[command(long_about = "
Analyze a source tree across Python, JavaScript, TypeScript, Rust and Go.

Common Usage:

  # Analyze the current directory and print a summary
  codepulse analyze

  # Write the full result as JSON
  codepulse analyze ./service --format json --out result.json

  # Resume an interrupted job (requires persistence.job_store_dir)
  codepulse resume <JOB_ID> ./service
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "CODEPULSE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a local checkout
    Analyze(Box<AnalyzeArgs>),

    /// Continue an unfinished job from its saved checkpoint
    Resume(ResumeArgs),

    /// List saved jobs that never reached a terminal state
    #[command(name = "list-jobs")]
    ListJobs,

    /// Remove expired entries from the configured cache
    #[command(name = "sweep-cache")]
    SweepCache,

    /// Print default configuration in YAML format
    #[command(name = "print-default-config")]
    PrintDefaultConfig,

    /// Initialize a configuration file with defaults
    #[command(name = "init-config")]
    InitConfig(InitConfigArgs),

    /// Validate a configuration file
    #[command(name = "validate-config")]
    ValidateConfig(ValidateConfigArgs),

    /// List supported languages and their file extensions
    #[command(name = "list-languages")]
    ListLanguages,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Directory to analyze
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Commit identity used as cache key [default: digest of the file contents]
    #[arg(long)]
    pub commit: Option<String>,

    /// Repository identity as owner/name [default: local/<directory name>]
    #[arg(long)]
    pub repo: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Classify files against the complexity thresholds
    #[arg(long)]
    pub enrich: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Id of the job to resume
    pub job_id: Uuid,

    /// Directory the job was analyzing
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct InitConfigArgs {
    /// Output configuration file name
    #[arg(short, long, default_value = ".codepulse.yml")]
    pub output: PathBuf,

    /// Overwrite existing configuration file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateConfigArgs {
    /// Configuration file to validate
    pub config: PathBuf,

    /// Show every setting
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Tables on the console
    Summary,
    /// Full result as pretty JSON
    Json,
}
