//! Console tables and result writers.

use std::path::Path;

use owo_colors::OwoColorize;
use tabled::{settings::Style as TableStyle, Table, Tabled};

use codepulse::api::enrichment::EnrichedResult;
use codepulse::core::pipeline::{CompletedJob, JobRecord};

#[derive(Tabled)]
struct MetricRow {
    metric: &'static str,
    value: String,
}

#[derive(Tabled)]
struct IssueRow {
    file: String,
    function: String,
    line: usize,
    kind: String,
    value: u32,
    threshold: u32,
}

#[derive(Tabled)]
struct ClusterRow {
    kind: String,
    members: usize,
    functions: String,
}

#[derive(Tabled)]
struct ClassificationRow {
    file: String,
    category: String,
    confidence: String,
}

#[derive(Tabled)]
struct JobRow {
    job: String,
    repository: String,
    commit: String,
    state: String,
    files: usize,
    checkpointed: usize,
    updated: String,
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
}

/// Print the summary, top issues, clusters and cycles of a result.
pub fn display_summary(completed: &CompletedJob, enriched: Option<&EnrichedResult>) {
    let result = &completed.result;
    let summary = &result.summary;

    println!();
    println!(
        "{} {}@{} ({:?}{})",
        "Analysis of".bright_blue().bold(),
        result.repository,
        result.commit,
        completed.routing,
        if completed.from_cache { ", cached" } else { "" }
    );

    print_table(vec![
        MetricRow {
            metric: "Files analyzed",
            value: format!("{} / {}", summary.files_analyzed, summary.files_submitted),
        },
        MetricRow {
            metric: "Files failed",
            value: summary.files_failed.to_string(),
        },
        MetricRow {
            metric: "Files skipped",
            value: summary.files_skipped.to_string(),
        },
        MetricRow {
            metric: "Lines of code",
            value: summary.total_loc.to_string(),
        },
        MetricRow {
            metric: "Functions",
            value: summary.total_functions.to_string(),
        },
        MetricRow {
            metric: "Cyclomatic (max / total / mean)",
            value: format!(
                "{} / {} / {:.2}",
                summary.max_cyclomatic, summary.total_cyclomatic, summary.mean_cyclomatic
            ),
        },
        MetricRow {
            metric: "Max nesting",
            value: summary.max_nesting.to_string(),
        },
        MetricRow {
            metric: "Duplicate clusters",
            value: format!(
                "{} ({} functions)",
                summary.duplicate_clusters, summary.duplicated_functions
            ),
        },
        MetricRow {
            metric: "Dependency edges (internal / external)",
            value: format!(
                "{} / {}",
                summary.dependency_edges, summary.external_dependencies
            ),
        },
        MetricRow {
            metric: "Import cycles",
            value: summary.dependency_cycles.to_string(),
        },
    ]);

    if !summary.top_issues.is_empty() {
        println!("{}", "Top issues".bright_yellow().bold());
        print_table(
            summary
                .top_issues
                .iter()
                .map(|issue| IssueRow {
                    file: issue.path.clone(),
                    function: issue.function.clone(),
                    line: issue.start_line,
                    kind: format!("{:?}", issue.issue_type).to_lowercase(),
                    value: issue.value,
                    threshold: issue.threshold,
                })
                .collect(),
        );
    }

    if !result.duplicates.is_empty() {
        println!("{}", "Duplicate clusters".bright_yellow().bold());
        print_table(
            result
                .duplicates
                .iter()
                .map(|cluster| ClusterRow {
                    kind: format!("{:?}", cluster.kind).to_lowercase(),
                    members: cluster.size(),
                    functions: cluster
                        .members
                        .iter()
                        .map(|m| format!("{}:{} {}", m.path, m.start_line, m.function))
                        .collect::<Vec<_>>()
                        .join("\n"),
                })
                .collect(),
        );
    }

    for cycle in &result.dependencies.cycles {
        println!("{} {}", "cycle:".red(), cycle.join(" -> "));
    }

    for failure in &result.failures {
        println!("{} {}: {}", "failed:".red(), failure.path, failure.reason);
    }

    if let Some(enriched) = enriched {
        let rows: Vec<ClassificationRow> = enriched
            .files
            .iter()
            .filter_map(|file| {
                file.classification.as_ref().map(|c| ClassificationRow {
                    file: file.path.clone(),
                    category: c.category.clone(),
                    confidence: format!("{:.2}", c.confidence),
                })
            })
            .filter(|row| row.category != "healthy")
            .collect();
        if !rows.is_empty() {
            println!("{}", "Classifications".bright_blue().bold());
            print_table(rows);
        }
    }
}

/// Print saved unfinished jobs.
pub fn display_jobs(jobs: &[JobRecord]) {
    if jobs.is_empty() {
        println!("{}", "No unfinished jobs".dimmed());
        return;
    }
    print_table(
        jobs.iter()
            .map(|job| JobRow {
                job: job.job_id.to_string(),
                repository: job.repository.to_string(),
                commit: job.commit.clone(),
                state: job.state.to_string(),
                files: job.file_count,
                checkpointed: job.checkpoint.accounted(),
                updated: job.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .collect(),
    );
}

/// Write `content` to `out`, or stdout when no path is given.
pub async fn write_output(content: &str, out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, content).await?;
            println!(
                "{} {}",
                "Result written to".bright_green(),
                path.display().to_string().cyan()
            );
        }
        None => println!("{}", content),
    }
    Ok(())
}
