//! Shared fixtures for the integration tests: file builders, scripted remote
//! queues and failing sources.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Barrier};
use uuid::Uuid;

use codepulse::core::ast::extract_file_metrics;
use codepulse::core::config::PulseConfig;
use codepulse::core::pipeline::{
    AnalysisResult, FetchError, JobEvent, JobHandle, JobRecord, JobState, JobStore, RemoteEvent,
    RemoteJobQueue, RemoteSubscription, RepositorySource, RoutingDecision, SkipReason,
    SkippedFile,
};
use codepulse::detectors::graph::DependencyGraph;
use codepulse::io::persistence::MemoryJobStore;
use codepulse::lang::registry::GrammarRegistry;
use codepulse::{FileRecord, RepositoryId, Result};

pub fn repo() -> RepositoryId {
    RepositoryId::new("acme", "widgets")
}

/// Defaults with two workers and short timeouts.
pub fn test_config() -> PulseConfig {
    let mut config = PulseConfig::default();
    config.pool.workers = Some(2);
    config.orchestrator.timeout_base_ms = 10_000;
    config.orchestrator.timeout_per_file_ms = 10;
    config
}

pub fn python_module(index: usize) -> FileRecord {
    FileRecord::new(
        format!("pkg/mod_{index:03}.py"),
        format!(
            "def handler_{index}(value):\n    if value > {index}:\n        return value\n    return {index}\n"
        ),
    )
}

pub fn python_modules(count: usize) -> Vec<FileRecord> {
    (0..count).map(python_module).collect()
}

/// Drain every event until the handle's channel closes.
pub async fn collect_events(handle: &mut JobHandle) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

/// Analyze `files` the way an out-of-process worker would.
pub fn remote_result(repository: &RepositoryId, commit: &str, files: &[FileRecord]) -> AnalysisResult {
    let mut registry = GrammarRegistry::new();
    let mut metrics = Vec::new();
    let mut skipped = Vec::new();
    for file in files {
        if !file.language.is_supported() {
            skipped.push(SkippedFile {
                path: file.path.clone(),
                reason: SkipReason::UnsupportedLanguage,
            });
            continue;
        }
        let tree = registry
            .parse(file.language, &file.path, &file.text)
            .expect("remote parse");
        metrics.push(extract_file_metrics(file, &tree).expect("remote metrics"));
    }

    AnalysisResult {
        repository: repository.clone(),
        commit: commit.to_string(),
        routing: RoutingDecision::Remote,
        generated_at: Utc::now(),
        summary: Default::default(),
        files: metrics,
        failures: Vec::new(),
        skipped,
        duplicates: Vec::new(),
        dependencies: DependencyGraph::default(),
    }
}

#[derive(Debug, Clone)]
pub enum QueueBehavior {
    /// Report the given progress values, then a complete result.
    Analyze { progress: Vec<u8> },
    /// Accept the job and never report anything.
    Silent,
    /// Report a failure event.
    Fail(String),
}

/// Remote queue double that records enqueues and cancellations.
pub struct ScriptedQueue {
    behavior: QueueBehavior,
    enqueued: AtomicUsize,
    cancelled: Mutex<Vec<Uuid>>,
}

impl ScriptedQueue {
    pub fn new(behavior: QueueBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            enqueued: AtomicUsize::new(0),
            cancelled: Mutex::new(Vec::new()),
        })
    }

    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> Vec<Uuid> {
        self.cancelled.lock().clone()
    }
}

#[async_trait]
impl RemoteJobQueue for ScriptedQueue {
    async fn enqueue(
        &self,
        _job_id: Uuid,
        repository: &RepositoryId,
        commit: &str,
        files: Vec<FileRecord>,
    ) -> Result<RemoteSubscription> {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        let subscription = match &self.behavior {
            QueueBehavior::Analyze { progress } => {
                let mut events: Vec<RemoteEvent> = progress
                    .iter()
                    .map(|percent| RemoteEvent::Progress { percent: *percent })
                    .collect();
                events.push(RemoteEvent::Complete(Box::new(remote_result(
                    repository, commit, &files,
                ))));
                stream::iter(events).boxed()
            }
            QueueBehavior::Silent => stream::pending::<RemoteEvent>().boxed(),
            QueueBehavior::Fail(reason) => stream::iter(vec![RemoteEvent::Failed {
                reason: reason.clone(),
            }])
            .boxed(),
        };
        Ok(subscription)
    }

    async fn cancel(&self, job_id: Uuid) -> Result<()> {
        self.cancelled.lock().push(job_id);
        Ok(())
    }
}

/// Source whose fetch always fails with `error`.
pub struct FailingSource {
    pub error: FetchError,
}

#[async_trait]
impl RepositorySource for FailingSource {
    async fn fetch(
        &self,
        _repository: &RepositoryId,
        _commit: &str,
    ) -> std::result::Result<Vec<FileRecord>, FetchError> {
        Err(self.error.clone())
    }
}

/// Job store that holds the first local-dispatch checkpoint carrying
/// analyzed files until the test releases it.
pub struct GatedJobStore {
    records: MemoryJobStore,
    reached: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedJobStore {
    /// Returns the store, a receiver that fires when the gate is reached and
    /// the sender that opens it.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let store = Arc::new(Self {
            records: MemoryJobStore::new(),
            reached: Mutex::new(Some(reached_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        (store, reached_rx, release_tx)
    }
}

#[async_trait]
impl JobStore for GatedJobStore {
    async fn save(&self, record: &JobRecord) -> Result<()> {
        self.records.save(record).await?;
        if record.state != JobState::LocalDispatch || record.checkpoint.completed.is_empty() {
            return Ok(());
        }
        let reached = self.reached.lock().take();
        if let Some(reached) = reached {
            let _ = reached.send(());
            let release = self.release.lock().take();
            if let Some(release) = release {
                let _ = release.await;
            }
        }
        Ok(())
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        self.records.load(job_id).await
    }

    async fn list_unfinished(&self) -> Result<Vec<JobRecord>> {
        self.records.list_unfinished().await
    }
}

/// Source whose fetch returns only once `parties` fetches are waiting, so
/// every caller has passed its cache check before any of them finishes.
pub struct RendezvousSource {
    files: Vec<FileRecord>,
    barrier: Barrier,
}

impl RendezvousSource {
    pub fn shared(files: Vec<FileRecord>, parties: usize) -> Arc<Self> {
        Arc::new(Self {
            files,
            barrier: Barrier::new(parties),
        })
    }
}

#[async_trait]
impl RepositorySource for RendezvousSource {
    async fn fetch(
        &self,
        _repository: &RepositoryId,
        _commit: &str,
    ) -> std::result::Result<Vec<FileRecord>, FetchError> {
        self.barrier.wait().await;
        Ok(self.files.clone())
    }
}
