//! The cacheable output of a job and its summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::RoutingDecision;
use crate::core::ast::FileMetrics;
use crate::core::model::RepositoryId;
use crate::detectors::complexity::TopIssue;
use crate::detectors::duplicates::DuplicateCluster;
use crate::detectors::graph::DependencyGraph;

/// Why a file was not analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedLanguage,
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// A file whose parse or extraction failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Job-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub files_submitted: usize,
    pub files_analyzed: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub total_loc: usize,
    pub total_functions: usize,
    pub max_cyclomatic: u32,
    pub total_cyclomatic: u32,
    /// Mean of the per-file maxima
    pub mean_cyclomatic: f64,
    pub max_nesting: u32,
    pub duplicate_clusters: usize,
    pub duplicated_functions: usize,
    pub dependency_edges: usize,
    pub external_dependencies: usize,
    pub dependency_cycles: usize,
    pub top_issues: Vec<TopIssue>,
}

/// Final merged output of a job. Superseded by newer results, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub repository: RepositoryId,
    pub commit: String,
    pub routing: RoutingDecision,
    pub generated_at: DateTime<Utc>,
    pub summary: AnalysisSummary,
    /// Sorted by path
    pub files: Vec<FileMetrics>,
    pub failures: Vec<FileFailure>,
    pub skipped: Vec<SkippedFile>,
    pub duplicates: Vec<DuplicateCluster>,
    pub dependencies: DependencyGraph,
}

impl AnalysisResult {
    pub fn file(&self, path: &str) -> Option<&FileMetrics> {
        self.files
            .binary_search_by(|m| m.path.as_str().cmp(path))
            .ok()
            .map(|index| &self.files[index])
    }

    pub fn to_json_pretty(&self) -> crate::core::errors::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
