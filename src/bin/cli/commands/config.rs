//! Configuration management commands.

use std::path::Path;

use owo_colors::OwoColorize;
use tabled::{settings::Style as TableStyle, Table, Tabled};

use crate::cli::args::{InitConfigArgs, ValidateConfigArgs};
use codepulse::core::config::PulseConfig;
use codepulse::lang::registry::registered_languages;

/// Load configuration from `path`, or defaults, and validate it.
pub async fn load_configuration(path: Option<&Path>) -> anyhow::Result<PulseConfig> {
    let config = match path {
        Some(path) => PulseConfig::from_yaml_file(path)?,
        None => PulseConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Print default configuration in YAML format
pub async fn print_default_config() -> anyhow::Result<()> {
    println!("{}", "# Default codepulse configuration".dimmed());
    println!("{}", "# Usage: codepulse --config your-config.yml analyze".dimmed());
    println!();

    let yaml_output = serde_yaml::to_string(&PulseConfig::default())?;
    println!("{}", yaml_output);
    Ok(())
}

/// Initialize a configuration file with defaults
pub async fn init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Configuration file already exists: {}. Use --force to overwrite or choose a different name with --output",
            args.output.display()
        ));
    }

    PulseConfig::default().to_yaml_file(&args.output)?;

    println!(
        "{} {}",
        "Configuration saved to:".bright_green().bold(),
        args.output.display().to_string().cyan()
    );
    println!(
        "Run analysis with: {}",
        format!("codepulse --config {} analyze <path>", args.output.display()).cyan()
    );
    Ok(())
}

#[derive(Tabled)]
struct SettingRow {
    setting: &'static str,
    value: String,
}

fn setting_rows(config: &PulseConfig) -> Vec<SettingRow> {
    let optional = |path: &Option<std::path::PathBuf>| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    vec![
        SettingRow {
            setting: "orchestrator.max_local_files",
            value: config.orchestrator.max_local_files.to_string(),
        },
        SettingRow {
            setting: "orchestrator.timeout_base_ms",
            value: config.orchestrator.timeout_base_ms.to_string(),
        },
        SettingRow {
            setting: "orchestrator.timeout_per_file_ms",
            value: config.orchestrator.timeout_per_file_ms.to_string(),
        },
        SettingRow {
            setting: "orchestrator.checkpoint_interval",
            value: config.orchestrator.checkpoint_interval.to_string(),
        },
        SettingRow {
            setting: "pool.workers",
            value: config.pool.worker_count().to_string(),
        },
        SettingRow {
            setting: "pool.channel_capacity",
            value: config.pool.channel_capacity.to_string(),
        },
        SettingRow {
            setting: "pool.max_file_bytes",
            value: config.pool.max_file_bytes.to_string(),
        },
        SettingRow {
            setting: "pool.tolerate_syntax_errors",
            value: config.pool.tolerate_syntax_errors.to_string(),
        },
        SettingRow {
            setting: "cache.backend",
            value: format!("{:?}", config.cache.backend).to_lowercase(),
        },
        SettingRow {
            setting: "cache.ttl_secs",
            value: config.cache.ttl_secs.to_string(),
        },
        SettingRow {
            setting: "duplicates.min_nodes",
            value: config.duplicates.min_nodes.to_string(),
        },
        SettingRow {
            setting: "duplicates.detect_near",
            value: config.duplicates.detect_near.to_string(),
        },
        SettingRow {
            setting: "complexity.cyclomatic_threshold",
            value: config.complexity.cyclomatic_threshold.to_string(),
        },
        SettingRow {
            setting: "complexity.nesting_threshold",
            value: config.complexity.nesting_threshold.to_string(),
        },
        SettingRow {
            setting: "persistence.job_store_dir",
            value: optional(&config.persistence.job_store_dir),
        },
        SettingRow {
            setting: "persistence.result_log_path",
            value: optional(&config.persistence.result_log_path),
        },
    ]
}

/// Validate a configuration file
pub async fn validate_config(args: ValidateConfigArgs) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "Validating configuration:".bright_blue().bold(),
        args.config.display().to_string().cyan()
    );

    let config = match load_configuration(Some(&args.config)).await {
        Ok(config) => {
            println!("{}", "Configuration file is valid".bright_green().bold());
            config
        }
        Err(e) => {
            eprintln!("{} {}", "Configuration validation failed:".red(), e);
            eprintln!(
                "{}",
                "Tip: use 'codepulse print-default-config' to see the valid format".dimmed()
            );
            return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
        }
    };

    if args.verbose {
        let mut table = Table::new(setting_rows(&config));
        table.with(TableStyle::rounded());
        println!("{}", table);
    }
    Ok(())
}

/// List supported languages
pub async fn list_languages() -> anyhow::Result<()> {
    #[derive(Tabled)]
    struct LanguageRow {
        language: &'static str,
        tag: String,
        extensions: String,
    }

    let rows: Vec<LanguageRow> = registered_languages()
        .iter()
        .map(|info| LanguageRow {
            language: info.name,
            tag: info.tag.to_string(),
            extensions: info
                .extensions
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
    Ok(())
}
