//! Threshold checks that turn per-function metrics into ranked issues.

use serde::{Deserialize, Serialize};

use crate::core::ast::FileMetrics;
use crate::core::config::ComplexityConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityIssueType {
    Cyclomatic,
    Nesting,
}

/// A function exceeding one of the configured thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopIssue {
    pub path: String,
    pub function: String,
    pub start_line: usize,
    pub issue_type: ComplexityIssueType,
    pub value: u32,
    pub threshold: u32,
    /// `value / threshold`, used for ranking
    pub severity: f64,
}

/// Collect issues across all files, worst first, capped at the configured limit.
pub fn rank_top_issues(files: &[FileMetrics], config: &ComplexityConfig) -> Vec<TopIssue> {
    let mut issues = Vec::new();

    for file in files {
        for function in &file.functions {
            let checks = [
                (
                    ComplexityIssueType::Cyclomatic,
                    function.cyclomatic,
                    config.cyclomatic_threshold,
                ),
                (
                    ComplexityIssueType::Nesting,
                    function.nesting,
                    config.nesting_threshold,
                ),
            ];
            for (issue_type, value, threshold) in checks {
                if threshold == 0 || value <= threshold {
                    continue;
                }
                issues.push(TopIssue {
                    path: file.path.clone(),
                    function: function.name.clone(),
                    start_line: function.start_line,
                    issue_type,
                    value,
                    threshold,
                    severity: f64::from(value) / f64::from(threshold),
                });
            }
        }
    }

    issues.sort_by(|a, b| {
        b.severity
            .total_cmp(&a.severity)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.start_line.cmp(&b.start_line))
    });
    issues.truncate(config.top_issue_limit);
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::FunctionSpan;
    use crate::lang::registry::LanguageTag;

    fn file(path: &str, functions: Vec<(&str, u32, u32)>) -> FileMetrics {
        FileMetrics {
            path: path.to_string(),
            language: LanguageTag::Python,
            size_bytes: 0,
            loc: 0,
            cyclomatic: 1,
            cyclomatic_sum: 1,
            max_nesting: 0,
            functions: functions
                .into_iter()
                .enumerate()
                .map(|(i, (name, cyclomatic, nesting))| FunctionSpan {
                    name: name.to_string(),
                    start_line: i + 1,
                    end_line: i + 1,
                    cyclomatic,
                    nesting,
                })
                .collect(),
            imports: Vec::new(),
            hashes: Vec::new(),
        }
    }

    #[test]
    fn issues_are_ranked_by_severity() {
        let files = vec![
            file("a.py", vec![("ok", 3, 1), ("busy", 15, 2)]),
            file("b.py", vec![("deep", 4, 8), ("worst", 30, 1)]),
        ];
        let issues = rank_top_issues(&files, &ComplexityConfig::default());
        let names: Vec<&str> = issues.iter().map(|i| i.function.as_str()).collect();
        assert_eq!(names, vec!["worst", "deep", "busy"]);
        assert_eq!(issues[1].issue_type, ComplexityIssueType::Nesting);
    }

    #[test]
    fn limit_truncates_issue_list() {
        let config = ComplexityConfig {
            top_issue_limit: 1,
            ..ComplexityConfig::default()
        };
        let files = vec![file("a.py", vec![("x", 20, 0), ("y", 25, 0)])];
        let issues = rank_top_issues(&files, &config);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].function, "y");
    }
}
