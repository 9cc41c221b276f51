//! Per-job state machine driving cache lookup, routing, dispatch,
//! aggregation and caching.
//!
//! Every call to [`Orchestrator::analyze`] spawns one tokio task owning its
//! [`AnalysisJob`]. The caller gets a [`JobHandle`] carrying the event stream,
//! a cancel switch and the terminal outcome. Jobs never share mutable state
//! except through the cache and the stores.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::aggregator::{AggregationInputs, Aggregator};
use super::job::{
    AnalysisJob, JobCheckpoint, JobEvent, JobFailure, JobRecord, JobState, RoutingDecision,
};
use super::results::AnalysisResult;
use super::services::{JobStore, RemoteEvent, RemoteJobQueue, RepositorySource, ResultStore};
use super::worker_pool::{PoolEvent, WorkerPool};
use crate::core::config::PulseConfig;
use crate::core::errors::{PulseError, Result};
use crate::core::model::{FileRecord, RepositoryId};
use crate::io::cache::{cache_from_config, AnalysisCache};
use crate::io::persistence::{FileJobStore, JsonlResultStore, MemoryJobStore};

/// A job that reached `done`.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub job_id: Uuid,
    pub result: Arc<AnalysisResult>,
    pub from_cache: bool,
    pub routing: RoutingDecision,
}

pub type JobOutcome = std::result::Result<CompletedJob, JobFailure>;

/// Caller side of a running job.
pub struct JobHandle {
    job_id: Uuid,
    events: mpsc::UnboundedReceiver<JobEvent>,
    cancel: CancellationToken,
    outcome: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Request cancellation. Has no effect once the job is caching.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Wait for the terminal outcome. Unread events are discarded.
    pub async fn outcome(self) -> JobOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| Err(JobFailure::internal("job task ended without an outcome")))
    }
}

impl Stream for JobHandle {
    type Item = JobEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

struct Inner {
    config: PulseConfig,
    cache: Arc<dyn AnalysisCache>,
    pool: WorkerPool,
    remote: Option<Arc<dyn RemoteJobQueue>>,
    job_store: Arc<dyn JobStore>,
    result_store: Option<Arc<dyn ResultStore>>,
    active: DashMap<Uuid, CancellationToken>,
}

/// Cheaply cloneable entry point for running analysis jobs.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// Assembles an [`Orchestrator`]. Collaborators not supplied explicitly are
/// derived from the configuration.
pub struct OrchestratorBuilder {
    config: PulseConfig,
    cache: Option<Arc<dyn AnalysisCache>>,
    remote: Option<Arc<dyn RemoteJobQueue>>,
    job_store: Option<Arc<dyn JobStore>>,
    result_store: Option<Arc<dyn ResultStore>>,
}

impl OrchestratorBuilder {
    pub fn new(config: PulseConfig) -> Self {
        Self {
            config,
            cache: None,
            remote: None,
            job_store: None,
            result_store: None,
        }
    }

    pub fn cache(mut self, cache: Arc<dyn AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn remote_queue(mut self, queue: Arc<dyn RemoteJobQueue>) -> Self {
        self.remote = Some(queue);
        self
    }

    pub fn job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(store);
        self
    }

    pub fn result_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.result_store = Some(store);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let cache = match self.cache {
            Some(cache) => cache,
            None => cache_from_config(&self.config.cache)?,
        };
        let job_store: Arc<dyn JobStore> = match (self.job_store, &self.config.persistence.job_store_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileJobStore::new(dir)?),
            (None, None) => Arc::new(MemoryJobStore::new()),
        };
        let result_store = match (self.result_store, &self.config.persistence.result_log_path) {
            (Some(store), _) => Some(store),
            (None, Some(path)) => Some(Arc::new(JsonlResultStore::new(path)) as Arc<dyn ResultStore>),
            (None, None) => None,
        };
        let pool = WorkerPool::new(&self.config.pool);

        info!(
            "Orchestrator ready: {} workers, remote queue {}",
            pool.size(),
            if self.remote.is_some() { "configured" } else { "absent" }
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                cache,
                pool,
                remote: self.remote,
                job_store,
                result_store,
                active: DashMap::new(),
            }),
        })
    }
}

impl Orchestrator {
    pub fn builder(config: PulseConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &PulseConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Start analyzing `repository` at `commit`. Must be called inside a
    /// tokio runtime.
    pub fn analyze(
        &self,
        repository: RepositoryId,
        commit: impl Into<String>,
        source: Arc<dyn RepositorySource>,
    ) -> JobHandle {
        let job = AnalysisJob::new(Uuid::new_v4(), repository, commit);
        self.spawn(job, source, None)
    }

    /// Continue a job from its last saved record, keeping its id.
    pub async fn resume(&self, job_id: Uuid, source: Arc<dyn RepositorySource>) -> Result<JobHandle> {
        if self.inner.active.contains_key(&job_id) {
            return Err(PulseError::concurrency(format!("job {job_id} is still running")));
        }
        let record = self
            .inner
            .job_store
            .load(job_id)
            .await?
            .ok_or_else(|| PulseError::validation(format!("no saved record for job {job_id}")))?;
        if record.state.is_terminal() {
            return Err(PulseError::validation(format!(
                "job {job_id} already finished in state {}",
                record.state
            )));
        }

        info!(
            "Resuming job {} for {}@{} from {} ({} files checkpointed)",
            job_id,
            record.repository,
            record.commit,
            record.state,
            record.checkpoint.accounted()
        );
        let mut job = AnalysisJob::new(job_id, record.repository, record.commit);
        job.created_at = record.created_at;
        Ok(self.spawn(job, source, Some(record.checkpoint)))
    }

    /// Cancel a running job by id. Returns false when it is not running.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.inner.active.get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_jobs(&self) -> Vec<Uuid> {
        self.inner.active.iter().map(|entry| *entry.key()).collect()
    }

    pub async fn unfinished_jobs(&self) -> Result<Vec<JobRecord>> {
        self.inner.job_store.list_unfinished().await
    }

    fn spawn(
        &self,
        job: AnalysisJob,
        source: Arc<dyn RepositorySource>,
        seed: Option<JobCheckpoint>,
    ) -> JobHandle {
        let job_id = job.id;
        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        self.inner.active.insert(job_id, cancel.clone());
        debug!("Spawning job {} for {}@{}", job_id, job.repository, job.commit);

        let run = JobRun {
            inner: Arc::clone(&self.inner),
            timeout_ms: 0,
            aggregator: Aggregator::new(Vec::<String>::new()),
            job,
            source,
            events: event_tx,
            cancel: cancel.clone(),
            seed,
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = run.run().await;
            inner.active.remove(&job_id);
            let _ = outcome_tx.send(outcome);
        });

        JobHandle {
            job_id,
            events: event_rx,
            cancel,
            outcome: outcome_rx,
        }
    }
}

/// State owned by the task running one job.
struct JobRun {
    inner: Arc<Inner>,
    job: AnalysisJob,
    source: Arc<dyn RepositorySource>,
    aggregator: Aggregator,
    events: mpsc::UnboundedSender<JobEvent>,
    cancel: CancellationToken,
    seed: Option<JobCheckpoint>,
    timeout_ms: u64,
}

type Step<T> = std::result::Result<T, JobFailure>;

impl JobRun {
    async fn run(mut self) -> JobOutcome {
        match self.drive().await {
            Ok(completed) => {
                self.emit(JobEvent::Completed {
                    result: Arc::clone(&completed.result),
                    from_cache: completed.from_cache,
                });
                Ok(completed)
            }
            Err(failure) => {
                warn!("Job {} failed: {}", self.job.id, failure);
                if let Ok(from) = self.job.transition(JobState::Error) {
                    self.emit(JobEvent::StateChanged {
                        from,
                        to: JobState::Error,
                    });
                }
                self.persist(Some(failure.clone())).await;
                self.emit(JobEvent::Failed {
                    failure: failure.clone(),
                });
                Err(failure)
            }
        }
    }

    async fn drive(&mut self) -> Step<CompletedJob> {
        self.advance(JobState::CacheCheck).await?;
        if let Some(result) = self.lookup_cache().await {
            self.job.routing = Some(result.routing);
            self.advance(JobState::Done).await?;
            return Ok(CompletedJob {
                job_id: self.job.id,
                routing: result.routing,
                result,
                from_cache: true,
            });
        }

        self.check_cancelled()?;
        self.advance(JobState::Routing).await?;
        let files = self.fetch().await?;
        let routing = RoutingDecision::for_file_count(
            files.len(),
            self.inner.config.orchestrator.max_local_files,
        );
        info!(
            "Job {} routed {:?} with {} files",
            self.job.id,
            routing,
            files.len()
        );

        self.aggregator = Aggregator::new(files.iter().map(|f| f.path.clone()));
        if let Some(seed) = self.seed.take() {
            self.aggregator.seed(seed);
        }
        self.job.files = files;
        self.job.routing = Some(routing);

        let timeout = self.inner.config.orchestrator.timeout_for(self.job.files.len());
        self.timeout_ms = timeout.as_millis() as u64;
        let deadline = Instant::now() + timeout;

        self.check_cancelled()?;
        match (routing, self.inner.remote.clone()) {
            (RoutingDecision::Remote, Some(queue)) => {
                self.advance(JobState::RemoteDispatch).await?;
                self.dispatch_remote(queue, deadline).await?;
            }
            (RoutingDecision::Remote, None) => {
                warn!(
                    "Job {} selected remote routing but no remote queue is configured; running locally",
                    self.job.id
                );
                self.advance(JobState::LocalDispatch).await?;
                self.dispatch_local(deadline).await?;
            }
            (RoutingDecision::Local, _) => {
                self.advance(JobState::LocalDispatch).await?;
                self.dispatch_local(deadline).await?;
            }
        }

        self.check_cancelled()?;
        self.advance(JobState::Aggregating).await?;
        let result = Arc::new(self.aggregate(routing)?);

        self.advance(JobState::Caching).await?;
        self.store(&result).await;

        self.advance(JobState::Done).await?;
        info!("Job {} done", self.job.id);
        Ok(CompletedJob {
            job_id: self.job.id,
            result,
            from_cache: false,
            routing,
        })
    }

    async fn lookup_cache(&self) -> Option<Arc<AnalysisResult>> {
        let key = self.job.cache_key();
        match self.inner.cache.get(&key).await {
            Ok(Some(result)) => {
                info!("Cache hit for {}", key);
                Some(result)
            }
            Ok(None) => {
                debug!("Cache miss for {}", key);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", key, e);
                None
            }
        }
    }

    async fn fetch(&self) -> Step<Vec<FileRecord>> {
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(JobFailure::Cancelled),
            fetched = self.source.fetch(&self.job.repository, &self.job.commit) => fetched,
        };
        let files = fetched.map_err(|e| JobFailure::FetchFailure {
            kind: e.kind,
            message: e.message,
        })?;

        let mut seen = HashSet::new();
        let before = files.len();
        let files: Vec<FileRecord> = files
            .into_iter()
            .filter(|file| seen.insert(file.path.clone()))
            .collect();
        if files.len() != before {
            warn!(
                "Job {} dropped {} files with duplicate paths",
                self.job.id,
                before - files.len()
            );
        }
        Ok(files)
    }

    async fn dispatch_local(&mut self, deadline: Instant) -> Step<()> {
        let pending = self.aggregator.remaining(&self.job.files);
        if pending.is_empty() {
            return Ok(());
        }

        let pool_cancel = self.cancel.child_token();
        let _stop_pool = pool_cancel.clone().drop_guard();
        let mut stream = self.inner.pool.submit(pending, pool_cancel);
        let interval = self.inner.config.orchestrator.checkpoint_interval.max(1);
        let mut since_checkpoint = 0usize;

        while !self.aggregator.is_complete() {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(JobFailure::Cancelled),
                _ = sleep_until(deadline) => return Err(self.timed_out()),
                event = stream.next_event() => event,
            };

            let recorded = match event {
                Some(PoolEvent::Completed { metrics, .. }) => self.aggregator.record_metrics(metrics),
                Some(PoolEvent::Failed { path, reason }) => {
                    debug!("Job {}: {} failed: {}", self.job.id, path, reason);
                    self.aggregator.record_failure(path, reason)
                }
                Some(PoolEvent::Skipped { path, reason }) => {
                    debug!("Job {}: skipped {} ({:?})", self.job.id, path, reason);
                    self.aggregator.record_skip(path, reason)
                }
                Some(PoolEvent::Error { message }) => {
                    warn!("Worker pool error in job {}: {}", self.job.id, message);
                    break;
                }
                Some(PoolEvent::EndOfStream) | None => break,
            };

            if recorded {
                self.emit_progress();
                since_checkpoint += 1;
                if since_checkpoint >= interval {
                    since_checkpoint = 0;
                    self.persist(None).await;
                }
            }
        }
        Ok(())
    }

    async fn dispatch_remote(&mut self, queue: Arc<dyn RemoteJobQueue>, deadline: Instant) -> Step<()> {
        let pending = self.aggregator.remaining(&self.job.files);
        let enqueued = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.release_remote(&queue).await;
                return Err(JobFailure::Cancelled);
            }
            _ = sleep_until(deadline) => {
                self.release_remote(&queue).await;
                return Err(self.timed_out());
            }
            enqueued = queue.enqueue(self.job.id, &self.job.repository, &self.job.commit, pending) => enqueued,
        };
        let mut subscription = enqueued.map_err(|e| JobFailure::RemoteQueueFailure {
            reason: e.to_string(),
        })?;

        let mut high_water = 0u8;
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.release_remote(&queue).await;
                    return Err(JobFailure::Cancelled);
                }
                _ = sleep_until(deadline) => {
                    self.release_remote(&queue).await;
                    return Err(self.timed_out());
                }
                event = subscription.next() => event,
            };

            match event {
                Some(RemoteEvent::Progress { percent }) => {
                    let percent = percent.min(100);
                    if percent > high_water {
                        high_water = percent;
                        self.emit(JobEvent::Progress {
                            percent,
                            completed: self.aggregator.completed(),
                            total: self.aggregator.expected(),
                        });
                    }
                }
                Some(RemoteEvent::Complete(result)) => {
                    self.aggregator.absorb(*result);
                    return Ok(());
                }
                Some(RemoteEvent::Failed { reason }) => {
                    return Err(JobFailure::RemoteQueueFailure { reason });
                }
                None => {
                    return Err(JobFailure::RemoteQueueFailure {
                        reason: "subscription closed before completion".to_string(),
                    });
                }
            }
        }
    }

    fn aggregate(&mut self, routing: RoutingDecision) -> Step<AnalysisResult> {
        if !self.aggregator.is_complete() {
            let missing = self.aggregator.mark_missing("no result reported by dispatcher");
            warn!("Job {}: {} files never reported", self.job.id, missing);
        }
        if self.aggregator.analyzed() == 0 {
            let checkpoint = self.aggregator.checkpoint();
            return Err(JobFailure::NoFilesAnalyzed {
                skipped: checkpoint.skipped.len(),
                failed: checkpoint.failures.len(),
            });
        }

        let config = &self.inner.config;
        let result = self.aggregator.finalize(AggregationInputs {
            repository: &self.job.repository,
            commit: &self.job.commit,
            routing,
            files: &self.job.files,
            duplicates: &config.duplicates,
            complexity: &config.complexity,
        })?;
        Ok(result)
    }

    /// Write the result to the cache and the durable store. Neither failure
    /// fails the job.
    async fn store(&self, result: &Arc<AnalysisResult>) {
        let key = self.job.cache_key();
        if let Err(e) = self
            .inner
            .cache
            .put(&key, Arc::clone(result), self.inner.config.cache.ttl())
            .await
        {
            warn!("Cache write failed for {}: {}", key, e);
        }
        if let Some(store) = &self.inner.result_store {
            if let Err(e) = store.append(&key, result).await {
                warn!("Result store append failed for {}: {}", key, e);
            }
        }
    }

    async fn release_remote(&self, queue: &Arc<dyn RemoteJobQueue>) {
        if let Err(e) = queue.cancel(self.job.id).await {
            warn!("Releasing remote job {} failed: {}", self.job.id, e);
        }
    }

    fn timed_out(&self) -> JobFailure {
        JobFailure::Timeout {
            after_ms: self.timeout_ms,
        }
    }

    fn check_cancelled(&self) -> Step<()> {
        if self.cancel.is_cancelled() {
            Err(JobFailure::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn advance(&mut self, next: JobState) -> Step<()> {
        let from = self.job.transition(next)?;
        debug!("Job {}: {} -> {}", self.job.id, from, next);
        self.emit(JobEvent::StateChanged { from, to: next });
        self.persist(None).await;
        Ok(())
    }

    async fn persist(&self, failure: Option<JobFailure>) {
        let checkpoint = if self.job.state.is_terminal() {
            JobCheckpoint::default()
        } else {
            self.aggregator.checkpoint()
        };
        let record = self.job.record(checkpoint, failure);
        if let Err(e) = self.inner.job_store.save(&record).await {
            warn!("Saving record for job {} failed: {}", self.job.id, e);
        }
    }

    fn emit_progress(&self) {
        let total = self.aggregator.expected();
        let completed = self.aggregator.completed();
        let percent = if total == 0 {
            100
        } else {
            ((completed * 100) / total).min(100) as u8
        };
        self.emit(JobEvent::Progress {
            percent,
            completed,
            total,
        });
    }

    fn emit(&self, event: JobEvent) {
        // Nobody listening is fine; the outcome channel still reports.
        let _ = self.events.send(event);
    }
}
