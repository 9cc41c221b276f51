//! Collaborator contracts consumed by the orchestrator, plus the built-in
//! repository sources.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::job::JobRecord;
use super::results::AnalysisResult;
use crate::core::errors::Result;
use crate::core::file_utils::FileReader;
use crate::core::model::{CacheKey, FileRecord, RepositoryId};
use crate::lang::registry::extension_is_supported;

/// Manifest files collected alongside sources for module-root discovery.
pub const MANIFEST_FILES: &[&str] = &["package.json", "Cargo.toml", "go.mod"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    NotFound,
    RateLimited,
    NetworkError,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::NetworkError => "network_error",
        })
    }
}

/// Failure reported by a [`RepositorySource`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NetworkError, message)
    }
}

/// Service producing the input files of a repository at a commit.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn fetch(
        &self,
        repository: &RepositoryId,
        commit: &str,
    ) -> std::result::Result<Vec<FileRecord>, FetchError>;
}

/// Fixed list of files, returned for every request.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    files: Vec<FileRecord>,
}

impl InMemorySource {
    pub fn new(files: Vec<FileRecord>) -> Self {
        Self { files }
    }

    pub fn shared(files: Vec<FileRecord>) -> Arc<dyn RepositorySource> {
        Arc::new(Self::new(files))
    }
}

#[async_trait]
impl RepositorySource for InMemorySource {
    async fn fetch(
        &self,
        _repository: &RepositoryId,
        _commit: &str,
    ) -> std::result::Result<Vec<FileRecord>, FetchError> {
        Ok(self.files.clone())
    }
}

/// Gitignore-aware walk of a local checkout.
///
/// Collects files with a supported extension plus the manifests used for
/// module-root discovery. Binary files are left out.
#[derive(Debug, Clone)]
pub struct LocalDirectorySource {
    root: PathBuf,
}

impl LocalDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn shared(root: impl Into<PathBuf>) -> Arc<dyn RepositorySource> {
        Arc::new(Self::new(root))
    }

    fn collect(root: &Path) -> std::result::Result<Vec<FileRecord>, FetchError> {
        if !root.is_dir() {
            return Err(FetchError::not_found(format!(
                "directory does not exist: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkBuilder::new(root).hidden(true).git_ignore(true).build() {
            let entry = entry.map_err(|e| FetchError::network(e.to_string()))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            if !is_collected(path) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            match FileReader::read_to_string(path) {
                Ok(text) => files.push(FileRecord::new(relative.to_string_lossy(), text)),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!("Collected {} files from {}", files.len(), root.display());
        Ok(files)
    }
}

fn is_collected(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if MANIFEST_FILES.contains(&name) {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(extension_is_supported)
        .unwrap_or(false)
}

#[async_trait]
impl RepositorySource for LocalDirectorySource {
    async fn fetch(
        &self,
        _repository: &RepositoryId,
        _commit: &str,
    ) -> std::result::Result<Vec<FileRecord>, FetchError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::collect(&root))
            .await
            .map_err(|e| FetchError::network(format!("directory walk aborted: {e}")))?
    }
}

/// Event delivered on a remote job subscription.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    Progress { percent: u8 },
    Complete(Box<AnalysisResult>),
    Failed { reason: String },
}

pub type RemoteSubscription = BoxStream<'static, RemoteEvent>;

/// External queue that analyzes large repositories out of process.
#[async_trait]
pub trait RemoteJobQueue: Send + Sync {
    async fn enqueue(
        &self,
        job_id: Uuid,
        repository: &RepositoryId,
        commit: &str,
        files: Vec<FileRecord>,
    ) -> Result<RemoteSubscription>;

    /// Release the subscription and stop remote work for `job_id`.
    async fn cancel(&self, job_id: Uuid) -> Result<()>;
}

/// Append-only durable store of completed results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn append(&self, key: &CacheKey, result: &AnalysisResult) -> Result<()>;
}

/// Durable job records keyed by job id.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save(&self, record: &JobRecord) -> Result<()>;
    async fn load(&self, job_id: Uuid) -> Result<Option<JobRecord>>;
    async fn list_unfinished(&self) -> Result<Vec<JobRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_directory_source_collects_sources_and_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.ts"), "export const a = 1;\n").unwrap();
        std::fs::write(dir.path().join("package.json"), "{\"name\":\"app\"}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = LocalDirectorySource::new(dir.path());
        let files = source
            .fetch(&RepositoryId::new("local", "app"), "HEAD")
            .await
            .unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["package.json", "src/app.ts"]);
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let source = LocalDirectorySource::new("/no/such/checkout");
        let err = source
            .fetch(&RepositoryId::new("local", "x"), "HEAD")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::NotFound);
    }
}
