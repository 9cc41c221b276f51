//! Optional per-file annotations layered on a finished result.
//!
//! Classification and explanation come from external services. Their
//! failures never invalidate the result: the affected fields stay empty.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::ast::FileMetrics;
use crate::core::config::ComplexityConfig;
use crate::core::errors::Result;
use crate::core::model::FileRecord;
use crate::core::pipeline::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    /// In `[0, 1]`
    pub confidence: f64,
}

#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, metrics: &FileMetrics) -> Result<Classification>;
}

#[async_trait]
pub trait ExplanationService: Send + Sync {
    async fn explain(&self, metrics: &FileMetrics, excerpt: &str) -> Result<String>;
}

/// Local scorer that buckets files by the configured complexity thresholds.
#[derive(Debug, Clone)]
pub struct ThresholdScorer {
    thresholds: ComplexityConfig,
}

impl ThresholdScorer {
    pub fn new(thresholds: ComplexityConfig) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl ScoringService for ThresholdScorer {
    async fn score(&self, metrics: &FileMetrics) -> Result<Classification> {
        let cyclomatic = ratio(metrics.cyclomatic, self.thresholds.cyclomatic_threshold);
        let nesting = ratio(metrics.max_nesting, self.thresholds.nesting_threshold);

        let (category, pressure) = if cyclomatic > 1.0 && cyclomatic >= nesting {
            ("complex", cyclomatic)
        } else if nesting > 1.0 {
            ("deeply_nested", nesting)
        } else {
            ("healthy", 1.0 - cyclomatic.max(nesting))
        };
        // Confidence grows with the distance from the threshold.
        let confidence = if category == "healthy" {
            0.5 + pressure / 2.0
        } else {
            1.0 - 0.5 / pressure
        };

        Ok(Classification {
            category: category.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

fn ratio(value: u32, threshold: u32) -> f64 {
    if threshold == 0 {
        0.0
    } else {
        f64::from(value) / f64::from(threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEnrichment {
    pub path: String,
    pub classification: Option<Classification>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichedResult {
    pub result: Arc<AnalysisResult>,
    /// Same order as `result.files`
    pub files: Vec<FileEnrichment>,
}

impl EnrichedResult {
    pub fn enrichment(&self, path: &str) -> Option<&FileEnrichment> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// Runs the configured services over every analyzed file.
#[derive(Clone)]
pub struct Enricher {
    scoring: Option<Arc<dyn ScoringService>>,
    explanation: Option<Arc<dyn ExplanationService>>,
    excerpt_lines: usize,
    concurrency: usize,
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher {
    pub fn new() -> Self {
        Self {
            scoring: None,
            explanation: None,
            excerpt_lines: 40,
            concurrency: 8,
        }
    }

    pub fn with_scoring(mut self, service: Arc<dyn ScoringService>) -> Self {
        self.scoring = Some(service);
        self
    }

    pub fn with_explanation(mut self, service: Arc<dyn ExplanationService>) -> Self {
        self.explanation = Some(service);
        self
    }

    pub fn excerpt_lines(mut self, lines: usize) -> Self {
        self.excerpt_lines = lines;
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// `sources` supplies excerpts for explanations; files without a source
    /// get an empty excerpt.
    pub async fn enrich(&self, result: Arc<AnalysisResult>, sources: &[FileRecord]) -> EnrichedResult {
        let texts: HashMap<&str, &str> = sources
            .iter()
            .map(|file| (file.path.as_str(), file.text.as_str()))
            .collect();

        let files = stream::iter(result.files.iter())
            .map(|metrics| {
                let excerpt = texts
                    .get(metrics.path.as_str())
                    .map(|text| excerpt(text, self.excerpt_lines))
                    .unwrap_or_default();
                self.enrich_file(metrics, excerpt)
            })
            .buffered(self.concurrency.max(1))
            .collect()
            .await;

        EnrichedResult { result, files }
    }

    async fn enrich_file(&self, metrics: &FileMetrics, excerpt: String) -> FileEnrichment {
        let classification = match &self.scoring {
            Some(service) => match service.score(metrics).await {
                Ok(classification) => Some(classification),
                Err(e) => {
                    warn!("Scoring failed for {}: {}", metrics.path, e);
                    None
                }
            },
            None => None,
        };
        let explanation = match &self.explanation {
            Some(service) => match service.explain(metrics, &excerpt).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Explanation failed for {}: {}", metrics.path, e);
                    None
                }
            },
            None => None,
        };
        debug!("Enriched {}", metrics.path);

        FileEnrichment {
            path: metrics.path.clone(),
            classification,
            explanation,
        }
    }
}

fn excerpt(text: &str, lines: usize) -> String {
    text.lines().take(lines).collect::<Vec<_>>().join("\n")
}
