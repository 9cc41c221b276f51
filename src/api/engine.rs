//! Main analysis engine: a thin façade over the orchestrator for callers that
//! want one call per analysis.

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::core::config::PulseConfig;
use crate::core::errors::{PulseError, Result};
use crate::core::model::{FileRecord, RepositoryId};
use crate::core::pipeline::{
    CompletedJob, InMemorySource, JobFailure, JobHandle, JobRecord, LocalDirectorySource,
    Orchestrator, RepositorySource,
};
use crate::lang::registry::registered_languages;

/// Commit identity used for working trees without one.
pub const WORKING_TREE_PREFIX: &str = "worktree-";

/// Main codepulse analysis engine
#[derive(Clone)]
pub struct PulseEngine {
    orchestrator: Orchestrator,
}

impl PulseEngine {
    /// Create an engine whose collaborators are all derived from `config`
    pub fn new(config: PulseConfig) -> Result<Self> {
        info!("Initializing codepulse engine");
        let orchestrator = Orchestrator::builder(config).build()?;
        Ok(Self { orchestrator })
    }

    pub fn with_orchestrator(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &PulseConfig {
        self.orchestrator.config()
    }

    /// Start a job and return its handle.
    pub fn analyze(
        &self,
        repository: RepositoryId,
        commit: impl Into<String>,
        source: Arc<dyn RepositorySource>,
    ) -> JobHandle {
        self.orchestrator.analyze(repository, commit, source)
    }

    /// Analyze a local checkout and wait for the result.
    ///
    /// Without an explicit commit the job is keyed by a digest of the file
    /// contents, so an unchanged tree hits the cache.
    pub async fn analyze_directory(
        &self,
        path: impl AsRef<Path>,
        commit: Option<&str>,
    ) -> Result<CompletedJob> {
        let path = path.as_ref();
        info!("Starting directory analysis: {}", path.display());

        if !path.exists() {
            return Err(PulseError::io(
                format!("Path does not exist: {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::NotFound, "Path not found"),
            ));
        }
        if !path.is_dir() {
            return Err(PulseError::validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        let repository = local_repository_id(path);

        let files = LocalDirectorySource::new(path)
            .fetch(&repository, commit.unwrap_or("HEAD"))
            .await
            .map_err(|e| PulseError::pipeline("fetch", e.to_string()))?;
        let commit = match commit {
            Some(commit) => commit.to_string(),
            None => working_tree_identity(&files),
        };

        let handle = self.analyze(repository, commit, InMemorySource::shared(files));
        wait(handle).await
    }

    /// Continue an unfinished job and wait for it.
    pub async fn resume(
        &self,
        job_id: Uuid,
        source: Arc<dyn RepositorySource>,
    ) -> Result<CompletedJob> {
        let handle = self.orchestrator.resume(job_id, source).await?;
        wait(handle).await
    }

    pub async fn unfinished_jobs(&self) -> Result<Vec<JobRecord>> {
        self.orchestrator.unfinished_jobs().await
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            workers: self.orchestrator.pool().size(),
            active_jobs: self.orchestrator.active_jobs().len(),
            supported_languages: registered_languages()
                .iter()
                .map(|info| info.name.to_string())
                .collect(),
        }
    }
}

async fn wait(handle: JobHandle) -> Result<CompletedJob> {
    handle.outcome().await.map_err(failure_to_error)
}

fn failure_to_error(failure: JobFailure) -> PulseError {
    PulseError::pipeline(failure.reason(), failure.to_string())
}

/// `local/<directory name>` for a checkout on disk.
pub fn local_repository_id(path: &Path) -> RepositoryId {
    let name = path
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "workspace".to_string());
    RepositoryId::new("local", name)
}

/// Content digest of a file set, stable across file order.
pub fn working_tree_identity(files: &[FileRecord]) -> String {
    let mut sorted: Vec<&FileRecord> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = blake3::Hasher::new();
    for file in sorted {
        hasher.update(file.path.as_bytes());
        hasher.update(&[0]);
        hasher.update(file.text.as_bytes());
        hasher.update(&[0]);
    }
    let hex = hasher.finalize().to_hex();
    format!("{WORKING_TREE_PREFIX}{}", &hex[..16])
}

/// Engine status information
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub workers: usize,
    pub active_jobs: usize,
    pub supported_languages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_tree_identity_ignores_order() {
        let a = FileRecord::new("a.py", "x = 1\n");
        let b = FileRecord::new("b.py", "y = 2\n");
        assert_eq!(
            working_tree_identity(&[a.clone(), b.clone()]),
            working_tree_identity(&[b.clone(), a.clone()])
        );
        let changed = FileRecord::new("b.py", "y = 3\n");
        assert_ne!(
            working_tree_identity(&[a.clone(), b]),
            working_tree_identity(&[a, changed])
        );
    }

    #[tokio::test]
    async fn analyze_directory_caches_unchanged_trees() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("app.py"),
            "def main(x):\n    if x:\n        return 1\n    return 0\n",
        )
        .unwrap();

        let engine = PulseEngine::new(PulseConfig::default()).unwrap();
        let first = engine.analyze_directory(dir.path(), None).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.result.summary.files_analyzed, 1);
        assert_eq!(first.result.files[0].cyclomatic, 2);

        let second = engine.analyze_directory(dir.path(), None).await.unwrap();
        assert!(second.from_cache);
        assert!(Arc::ptr_eq(&first.result, &second.result));
    }

    #[tokio::test]
    async fn analyze_directory_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.py");
        std::fs::write(&file, "x = 1\n").unwrap();
        let engine = PulseEngine::new(PulseConfig::default()).unwrap();
        let err = engine.analyze_directory(&file, None).await.unwrap_err();
        assert!(matches!(err, PulseError::Validation { .. }));
    }

    #[test]
    fn status_lists_languages() {
        let engine = PulseEngine::new(PulseConfig::default()).unwrap();
        let status = engine.status();
        assert!(status.workers >= 1);
        assert_eq!(status.active_jobs, 0);
        assert!(status.supported_languages.iter().any(|l| l == "Rust"));
    }
}
