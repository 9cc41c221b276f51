//! Durable job records and the append-only result log.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::errors::{PulseError, Result, ResultExt};
use crate::core::file_utils::{read_json_optional, write_json_atomic};
use crate::core::model::CacheKey;
use crate::core::pipeline::{AnalysisResult, JobRecord, JobStore, ResultStore};

/// Finished records a [`MemoryJobStore`] keeps unless told otherwise.
pub const DEFAULT_TERMINAL_RETENTION: usize = 1024;

/// Job records held in process memory.
///
/// Unfinished records are kept until they finish. At most
/// `terminal_capacity` finished records are kept; saving one more drops the
/// least recently updated.
#[derive(Debug)]
pub struct MemoryJobStore {
    records: RwLock<HashMap<Uuid, JobRecord>>,
    terminal_capacity: usize,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::with_terminal_capacity(DEFAULT_TERMINAL_RETENTION)
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terminal_capacity(terminal_capacity: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            terminal_capacity: terminal_capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn prune_terminal(records: &mut HashMap<Uuid, JobRecord>, capacity: usize) {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = records
            .values()
            .filter(|record| record.state.is_terminal())
            .map(|record| (record.updated_at, record.job_id))
            .collect();
        if finished.len() <= capacity {
            return;
        }
        finished.sort();
        let excess = finished.len() - capacity;
        for (_, job_id) in finished.into_iter().take(excess) {
            records.remove(&job_id);
        }
        debug!("Dropped {} finished job records", excess);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn save(&self, record: &JobRecord) -> Result<()> {
        let mut records = self.records.write();
        records.insert(record.job_id, record.clone());
        if record.state.is_terminal() {
            Self::prune_terminal(&mut records, self.terminal_capacity);
        }
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        Ok(self.records.read().get(&job_id).cloned())
    }

    async fn list_unfinished(&self) -> Result<Vec<JobRecord>> {
        let mut records: Vec<JobRecord> = self
            .records
            .read()
            .values()
            .filter(|record| !record.state.is_terminal())
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

/// One `<job id>.json` file per job, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    directory: PathBuf,
}

impl FileJobStore {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| {
            PulseError::io(
                format!("Failed to create job store: {}", directory.display()),
                e,
            )
        })?;
        Ok(Self { directory })
    }

    fn record_path(&self, job_id: Uuid) -> PathBuf {
        self.directory.join(format!("{job_id}.json"))
    }

    fn scan(directory: &Path) -> Result<Vec<JobRecord>> {
        let entries = fs::read_dir(directory).map_err(|e| {
            PulseError::io(format!("Failed to list jobs: {}", directory.display()), e)
        })?;
        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json_optional::<JobRecord>(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable job record {}: {}", path.display(), e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(record.job_id);
        let job_id = record.job_id;
        let record = record.clone();
        tokio::task::spawn_blocking(move || write_json_atomic(&path, &record))
            .await?
            .with_context(|| format!("Failed to save job {job_id}"))
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let path = self.record_path(job_id);
        tokio::task::spawn_blocking(move || read_json_optional(&path)).await?
    }

    async fn list_unfinished(&self) -> Result<Vec<JobRecord>> {
        let directory = self.directory.clone();
        let mut records = tokio::task::spawn_blocking(move || Self::scan(&directory)).await??;
        records.retain(|record| !record.state.is_terminal());
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

/// One line of the result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub key: CacheKey,
    pub stored_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

/// Append-only JSON Lines log of completed results.
#[derive(Debug)]
pub struct JsonlResultStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored line in append order. Blank lines are skipped.
    pub async fn read_all(&self) -> Result<Vec<StoredResult>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PulseError::io(
                    format!("Failed to read result log: {}", self.path.display()),
                    e,
                ))
            }
        };
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("{} line {}", self.path.display(), index + 1)
                })
            })
            .collect()
    }
}

#[async_trait]
impl ResultStore for JsonlResultStore {
    async fn append(&self, key: &CacheKey, result: &AnalysisResult) -> Result<()> {
        let line = StoredResult {
            key: key.clone(),
            stored_at: Utc::now(),
            result: result.clone(),
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                PulseError::io(format!("Failed to open result log: {}", self.path.display()), e)
            })?;
        file.write_all(&bytes)
            .await
            .context("Failed to append to result log")?;
        file.flush().await.context("Failed to flush result log")?;
        debug!("Appended result for {} to {}", key, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::RepositoryId;
    use crate::core::pipeline::{AnalysisJob, AnalysisSummary, JobCheckpoint, JobState, RoutingDecision};
    use crate::detectors::graph::DependencyGraph;

    fn record(state: JobState) -> JobRecord {
        let mut job = AnalysisJob::new(Uuid::new_v4(), RepositoryId::new("acme", "widgets"), "c1");
        job.state = state;
        job.record(JobCheckpoint::default(), None)
    }

    fn result() -> AnalysisResult {
        AnalysisResult {
            repository: RepositoryId::new("acme", "widgets"),
            commit: "c1".to_string(),
            routing: RoutingDecision::Local,
            generated_at: Utc::now(),
            summary: AnalysisSummary::default(),
            files: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            duplicates: Vec::new(),
            dependencies: DependencyGraph::default(),
        }
    }

    #[tokio::test]
    async fn memory_store_lists_only_unfinished_jobs() {
        let store = MemoryJobStore::new();
        let running = record(JobState::LocalDispatch);
        store.save(&running).await.unwrap();
        store.save(&record(JobState::Done)).await.unwrap();

        let unfinished = store.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].job_id, running.job_id);
        assert_eq!(store.load(running.job_id).await.unwrap(), Some(running));
    }

    #[tokio::test]
    async fn memory_store_drops_oldest_finished_records_past_capacity() {
        let store = MemoryJobStore::with_terminal_capacity(2);
        let running = record(JobState::LocalDispatch);
        store.save(&running).await.unwrap();

        let mut finished = Vec::new();
        for offset in 0..3 {
            let mut done = record(JobState::Done);
            done.updated_at = Utc::now() + chrono::Duration::seconds(offset);
            store.save(&done).await.unwrap();
            finished.push(done);
        }

        assert_eq!(store.len(), 3);
        assert!(store.load(finished[0].job_id).await.unwrap().is_none());
        assert!(store.load(finished[1].job_id).await.unwrap().is_some());
        assert!(store.load(finished[2].job_id).await.unwrap().is_some());
        assert_eq!(store.load(running.job_id).await.unwrap(), Some(running));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let running = record(JobState::Aggregating);
        {
            let store = FileJobStore::new(dir.path()).unwrap();
            store.save(&running).await.unwrap();
            store.save(&record(JobState::Error)).await.unwrap();
        }

        let reopened = FileJobStore::new(dir.path()).unwrap();
        assert_eq!(reopened.load(running.job_id).await.unwrap(), Some(running.clone()));
        assert!(reopened.load(Uuid::new_v4()).await.unwrap().is_none());
        let unfinished = reopened.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].state, JobState::Aggregating);
    }

    #[tokio::test]
    async fn result_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlResultStore::new(dir.path().join("logs/results.jsonl"));
        let key = CacheKey::new(RepositoryId::new("acme", "widgets"), "c1");
        store.append(&key, &result()).await.unwrap();
        store.append(&key, &result()).await.unwrap();

        let stored = store.read_all().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].key, key);
        assert_eq!(stored[1].result.commit, "c1");
    }

    #[tokio::test]
    async fn corrupt_result_log_line_is_reported_with_its_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let store = JsonlResultStore::new(path.clone());
        let key = CacheKey::new(RepositoryId::new("acme", "widgets"), "c1");
        store.append(&key, &result()).await.unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("\n{not json\n");
        std::fs::write(&path, content).unwrap();

        let err = store.read_all().await.unwrap_err();
        assert!(matches!(err, PulseError::Serialization { .. }));
        assert!(err.to_string().contains("results.jsonl line 3"), "{err}");
    }
}
