//! Identity-keyed accumulation of per-file outcomes and the one-shot merge
//! into an [`AnalysisResult`].

use std::collections::BTreeSet;

use chrono::Utc;
use indexmap::IndexMap;
use tracing::{debug, info};

use super::job::{JobCheckpoint, RoutingDecision};
use super::results::{AnalysisResult, AnalysisSummary, FileFailure, SkipReason, SkippedFile};
use crate::core::ast::FileMetrics;
use crate::core::config::{ComplexityConfig, DuplicatesConfig};
use crate::core::errors::{PulseError, Result};
use crate::core::model::{FileRecord, RepositoryId};
use crate::detectors::complexity::rank_top_issues;
use crate::detectors::duplicates::{DuplicateCluster, DuplicateDetector};
use crate::detectors::graph::{DependencyGraph, DependencyGraphBuilder, ModuleRoots};

/// Everything the merge needs besides the accumulated outcomes.
pub struct AggregationInputs<'a> {
    pub repository: &'a RepositoryId,
    pub commit: &'a str,
    pub routing: RoutingDecision,
    /// Full input file set of the job, manifests included
    pub files: &'a [FileRecord],
    pub duplicates: &'a DuplicatesConfig,
    pub complexity: &'a ComplexityConfig,
}

/// Collects outcomes keyed by path. Duplicate and unknown paths are ignored,
/// so a file is counted at most once however many times it is reported.
#[derive(Debug)]
pub struct Aggregator {
    expected: BTreeSet<String>,
    metrics: IndexMap<String, FileMetrics>,
    failures: IndexMap<String, String>,
    skipped: IndexMap<String, SkipReason>,
    finalized: bool,
}

impl Aggregator {
    pub fn new<I, S>(expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: expected.into_iter().map(Into::into).collect(),
            metrics: IndexMap::new(),
            failures: IndexMap::new(),
            skipped: IndexMap::new(),
            finalized: false,
        }
    }

    fn accepts(&self, path: &str) -> bool {
        self.expected.contains(path)
            && !self.metrics.contains_key(path)
            && !self.failures.contains_key(path)
            && !self.skipped.contains_key(path)
    }

    pub fn record_metrics(&mut self, metrics: FileMetrics) -> bool {
        if !self.accepts(&metrics.path) {
            debug!("Ignoring repeated or foreign result for {}", metrics.path);
            return false;
        }
        self.metrics.insert(metrics.path.clone(), metrics);
        true
    }

    pub fn record_failure(&mut self, path: String, reason: String) -> bool {
        if !self.accepts(&path) {
            return false;
        }
        self.failures.insert(path, reason);
        true
    }

    pub fn record_skip(&mut self, path: String, reason: SkipReason) -> bool {
        if !self.accepts(&path) {
            return false;
        }
        self.skipped.insert(path, reason);
        true
    }

    /// Restore outcomes persisted by an earlier run of the same job.
    pub fn seed(&mut self, checkpoint: JobCheckpoint) {
        for metrics in checkpoint.completed {
            self.record_metrics(metrics);
        }
        for failure in checkpoint.failures {
            self.record_failure(failure.path, failure.reason);
        }
        for skipped in checkpoint.skipped {
            self.record_skip(skipped.path, skipped.reason);
        }
    }

    /// Take the per-file outcomes of a remotely produced result.
    pub fn absorb(&mut self, result: AnalysisResult) {
        for metrics in result.files {
            self.record_metrics(metrics);
        }
        for failure in result.failures {
            self.record_failure(failure.path, failure.reason);
        }
        for skipped in result.skipped {
            self.record_skip(skipped.path, skipped.reason);
        }
    }

    pub fn completed(&self) -> usize {
        self.metrics.len() + self.failures.len() + self.skipped.len()
    }

    pub fn expected(&self) -> usize {
        self.expected.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completed() >= self.expected.len()
    }

    pub fn analyzed(&self) -> usize {
        self.metrics.len()
    }

    /// Input files with no outcome yet, in input order.
    pub fn remaining(&self, files: &[FileRecord]) -> Vec<FileRecord> {
        files
            .iter()
            .filter(|file| self.accepts(&file.path))
            .cloned()
            .collect()
    }

    pub fn checkpoint(&self) -> JobCheckpoint {
        JobCheckpoint {
            completed: self.metrics.values().cloned().collect(),
            failures: self.failure_list(),
            skipped: self.skip_list(),
        }
    }

    /// Record a failure for every expected path without an outcome.
    pub fn mark_missing(&mut self, reason: &str) -> usize {
        let missing: Vec<String> = self
            .expected
            .iter()
            .filter(|path| self.accepts(path))
            .cloned()
            .collect();
        let count = missing.len();
        for path in missing {
            self.failures.insert(path, reason.to_string());
        }
        count
    }

    fn failure_list(&self) -> Vec<FileFailure> {
        self.failures
            .iter()
            .map(|(path, reason)| FileFailure {
                path: path.clone(),
                reason: reason.clone(),
            })
            .collect()
    }

    fn skip_list(&self) -> Vec<SkippedFile> {
        self.skipped
            .iter()
            .map(|(path, reason)| SkippedFile {
                path: path.clone(),
                reason: *reason,
            })
            .collect()
    }

    /// Run the cross-file detectors and build the final result. Allowed once.
    pub fn finalize(&mut self, inputs: AggregationInputs<'_>) -> Result<AnalysisResult> {
        if self.finalized {
            return Err(PulseError::pipeline(
                "aggregating",
                "aggregation already finalized",
            ));
        }
        self.finalized = true;

        let mut files: Vec<FileMetrics> = self.metrics.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let mut failures = self.failure_list();
        failures.sort_by(|a, b| a.path.cmp(&b.path));
        let mut skipped = self.skip_list();
        skipped.sort_by(|a, b| a.path.cmp(&b.path));

        let duplicates = DuplicateDetector::new(inputs.duplicates).detect(&files);

        let paths: BTreeSet<String> = inputs.files.iter().map(|f| f.path.clone()).collect();
        let roots = ModuleRoots::discover(inputs.files);
        let dependencies = DependencyGraphBuilder::new(&paths, &roots).build(&files);

        let summary = summarize(
            self.expected.len(),
            &files,
            &failures,
            &skipped,
            &duplicates,
            &dependencies,
            inputs.complexity,
        );

        info!(
            "Aggregated {}@{}: {} analyzed, {} failed, {} skipped, {} clusters, {} edges",
            inputs.repository,
            inputs.commit,
            summary.files_analyzed,
            summary.files_failed,
            summary.files_skipped,
            summary.duplicate_clusters,
            summary.dependency_edges
        );

        Ok(AnalysisResult {
            repository: inputs.repository.clone(),
            commit: inputs.commit.to_string(),
            routing: inputs.routing,
            generated_at: Utc::now(),
            summary,
            files,
            failures,
            skipped,
            duplicates,
            dependencies,
        })
    }
}

fn summarize(
    submitted: usize,
    files: &[FileMetrics],
    failures: &[FileFailure],
    skipped: &[SkippedFile],
    duplicates: &[DuplicateCluster],
    dependencies: &DependencyGraph,
    complexity: &ComplexityConfig,
) -> AnalysisSummary {
    let max_cyclomatic = files.iter().map(|f| f.cyclomatic).max().unwrap_or(0);
    let total_cyclomatic = files.iter().map(|f| f.cyclomatic_sum).sum();
    let mean_cyclomatic = if files.is_empty() {
        0.0
    } else {
        files.iter().map(|f| f64::from(f.cyclomatic)).sum::<f64>() / files.len() as f64
    };

    let duplicated: BTreeSet<(&str, usize)> = duplicates
        .iter()
        .flat_map(|cluster| cluster.members.iter())
        .map(|member| (member.path.as_str(), member.start_line))
        .collect();
    let internal_edges = dependencies.internal_edges().count();

    AnalysisSummary {
        files_submitted: submitted,
        files_analyzed: files.len(),
        files_failed: failures.len(),
        files_skipped: skipped.len(),
        total_loc: files.iter().map(|f| f.loc).sum(),
        total_functions: files.iter().map(FileMetrics::function_count).sum(),
        max_cyclomatic,
        total_cyclomatic,
        mean_cyclomatic,
        max_nesting: files.iter().map(|f| f.max_nesting).max().unwrap_or(0),
        duplicate_clusters: duplicates.len(),
        duplicated_functions: duplicated.len(),
        dependency_edges: internal_edges,
        external_dependencies: dependencies.edges.len() - internal_edges,
        dependency_cycles: dependencies.cycles.len(),
        top_issues: rank_top_issues(files, complexity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::registry::LanguageTag;

    fn metrics(path: &str, cyclomatic: u32) -> FileMetrics {
        FileMetrics {
            path: path.to_string(),
            language: LanguageTag::Python,
            size_bytes: 10,
            loc: 3,
            cyclomatic,
            cyclomatic_sum: cyclomatic + 1,
            max_nesting: 1,
            functions: Vec::new(),
            imports: Vec::new(),
            hashes: Vec::new(),
        }
    }

    fn finalize(aggregator: &mut Aggregator, files: &[FileRecord]) -> Result<AnalysisResult> {
        let repository = RepositoryId::new("acme", "widgets");
        aggregator.finalize(AggregationInputs {
            repository: &repository,
            commit: "c1",
            routing: RoutingDecision::Local,
            files,
            duplicates: &DuplicatesConfig::default(),
            complexity: &ComplexityConfig::default(),
        })
    }

    #[test]
    fn duplicate_and_unknown_paths_are_ignored() {
        let mut aggregator = Aggregator::new(["a.py", "b.py"]);
        assert!(aggregator.record_metrics(metrics("a.py", 2)));
        assert!(!aggregator.record_metrics(metrics("a.py", 9)));
        assert!(!aggregator.record_failure("a.py".into(), "late".into()));
        assert!(!aggregator.record_metrics(metrics("zzz.py", 1)));
        assert_eq!(aggregator.completed(), 1);
        assert!(!aggregator.is_complete());

        assert!(aggregator.record_skip("b.py".into(), SkipReason::TooLarge));
        assert!(aggregator.is_complete());
    }

    #[test]
    fn summary_reports_max_sum_and_mean() {
        let files = vec![FileRecord::new("a.py", ""), FileRecord::new("b.py", "")];
        let mut aggregator = Aggregator::new(files.iter().map(|f| f.path.clone()));
        aggregator.record_metrics(metrics("b.py", 4));
        aggregator.record_metrics(metrics("a.py", 2));

        let result = finalize(&mut aggregator, &files).unwrap();
        assert_eq!(result.files[0].path, "a.py");
        assert_eq!(result.summary.max_cyclomatic, 4);
        assert_eq!(result.summary.total_cyclomatic, 8);
        assert!((result.summary.mean_cyclomatic - 3.0).abs() < f64::EPSILON);
        assert_eq!(result.summary.files_submitted, 2);
    }

    #[test]
    fn finalize_runs_once() {
        let files = vec![FileRecord::new("a.py", "")];
        let mut aggregator = Aggregator::new(["a.py"]);
        aggregator.record_metrics(metrics("a.py", 1));
        finalize(&mut aggregator, &files).unwrap();
        assert!(matches!(
            finalize(&mut aggregator, &files),
            Err(PulseError::Pipeline { .. })
        ));
    }

    #[test]
    fn checkpoint_seeds_and_remaining_excludes_done_files() {
        let files: Vec<FileRecord> = ["a.py", "b.py", "c.py"]
            .iter()
            .map(|p| FileRecord::new(*p, ""))
            .collect();
        let mut first = Aggregator::new(files.iter().map(|f| f.path.clone()));
        first.record_metrics(metrics("a.py", 1));
        first.record_failure("b.py".into(), "syntax error at line 1".into());

        let mut resumed = Aggregator::new(files.iter().map(|f| f.path.clone()));
        resumed.seed(first.checkpoint());
        let remaining: Vec<String> = resumed.remaining(&files).into_iter().map(|f| f.path).collect();
        assert_eq!(remaining, vec!["c.py"]);

        assert_eq!(resumed.mark_missing("timed out"), 1);
        assert!(resumed.is_complete());
    }
}
