//! Analysis, resumption and saved-job commands.

use std::path::Path;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tracing::info;

use crate::cli::args::{AnalyzeArgs, OutputFormat, ResumeArgs};
use crate::cli::commands::config::load_configuration;
use crate::cli::output::{display_jobs, display_summary, write_output};
use codepulse::api::engine::{local_repository_id, working_tree_identity, PulseEngine};
use codepulse::api::enrichment::{EnrichedResult, Enricher, ThresholdScorer};
use codepulse::core::model::{FileRecord, RepositoryId};
use codepulse::core::pipeline::{
    CompletedJob, InMemorySource, JobEvent, JobHandle, LocalDirectorySource, RepositorySource,
};
use codepulse::io::cache::cache_from_config;

fn parse_repository(spec: &str) -> anyhow::Result<RepositoryId> {
    match spec.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
            Ok(RepositoryId::new(owner, name))
        }
        _ => Err(anyhow::anyhow!("Repository must be given as owner/name, got '{}'", spec)),
    }
}

fn progress_bar(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let bar = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")
    {
        bar.set_style(style.progress_chars("##-"));
    }
    Some(bar)
}

/// Follow job events on the progress bar, then return the outcome.
async fn follow(mut handle: JobHandle, quiet: bool) -> anyhow::Result<CompletedJob> {
    let bar = progress_bar(quiet);
    while let Some(event) = handle.next_event().await {
        let Some(bar) = &bar else { continue };
        match event {
            JobEvent::StateChanged { to, .. } => bar.set_message(to.to_string()),
            JobEvent::Progress { percent, .. } => bar.set_position(u64::from(percent)),
            JobEvent::Completed { from_cache, .. } => {
                bar.set_position(100);
                let message = if from_cache { "cached result" } else { "analysis complete" };
                bar.finish_with_message(message);
                break;
            }
            JobEvent::Failed { failure } => {
                bar.abandon_with_message(format!("failed: {}", failure.reason()));
                break;
            }
        }
    }

    handle
        .outcome()
        .await
        .map_err(|failure| anyhow::anyhow!("Analysis job failed ({}): {}", failure.reason(), failure))
}

async fn emit(
    completed: &CompletedJob,
    enriched: Option<&EnrichedResult>,
    format: OutputFormat,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Summary => {
            display_summary(completed, enriched);
            Ok(())
        }
        OutputFormat::Json => {
            let json = match enriched {
                Some(enriched) => serde_json::to_string_pretty(enriched)?,
                None => completed.result.to_json_pretty()?,
            };
            write_output(&json, out).await
        }
    }
}

/// Analyze a local checkout
pub async fn analyze_command(args: AnalyzeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_configuration(config_path).await?;
    let complexity = config.complexity.clone();
    let engine = PulseEngine::new(config)?;

    if !args.path.is_dir() {
        return Err(anyhow::anyhow!("Not a directory: {}", args.path.display()));
    }
    let repository = match &args.repo {
        Some(spec) => parse_repository(spec)?,
        None => local_repository_id(&args.path),
    };

    let files: Vec<FileRecord> = LocalDirectorySource::new(&args.path)
        .fetch(&repository, args.commit.as_deref().unwrap_or("HEAD"))
        .await?;
    let commit = args
        .commit
        .clone()
        .unwrap_or_else(|| working_tree_identity(&files));
    info!("Analyzing {}@{} ({} files)", repository, commit, files.len());

    let handle = engine.analyze(repository, commit, InMemorySource::shared(files.clone()));
    println!(
        "{} {}",
        "Job".bright_blue().bold(),
        handle.job_id().to_string().cyan()
    );
    let completed = follow(handle, args.quiet).await?;

    let enriched = if args.enrich {
        let enricher = Enricher::new().with_scoring(Arc::new(ThresholdScorer::new(complexity)));
        Some(enricher.enrich(Arc::clone(&completed.result), &files).await)
    } else {
        None
    };

    emit(&completed, enriched.as_ref(), args.format, args.out.as_deref()).await
}

/// Resume an unfinished job
pub async fn resume_command(args: ResumeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_configuration(config_path).await?;
    if config.persistence.job_store_dir.is_none() {
        eprintln!(
            "{}",
            "persistence.job_store_dir is not set; only jobs of this process can be resumed".yellow()
        );
    }
    let engine = PulseEngine::new(config)?;
    let source: Arc<dyn RepositorySource> = LocalDirectorySource::shared(&args.path);
    let handle = engine.orchestrator().resume(args.job_id, source).await?;
    let completed = follow(handle, false).await?;
    emit(&completed, None, args.format, None).await
}

/// List saved unfinished jobs
pub async fn list_jobs(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_configuration(config_path).await?;
    if config.persistence.job_store_dir.is_none() {
        println!(
            "{}",
            "No job store configured (persistence.job_store_dir); nothing to list".dimmed()
        );
        return Ok(());
    }
    let engine = PulseEngine::new(config)?;
    let jobs = engine.unfinished_jobs().await?;
    display_jobs(&jobs);
    Ok(())
}

/// Remove expired cache entries
pub async fn sweep_cache(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_configuration(config_path).await?;
    let cache = cache_from_config(&config.cache)?;
    let removed = cache.sweep_expired().await?;
    println!("{} {}", "Expired entries removed:".bright_green(), removed);
    Ok(())
}
