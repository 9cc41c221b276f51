//! Fixed-size parse-and-extract pool.
//!
//! Files are partitioned round-robin in submission order and each worker runs
//! on its own blocking thread with its own [`GrammarRegistry`]. Results flow
//! back over one bounded channel as soon as each file is done.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::results::SkipReason;
use crate::core::ast::{extract_file_metrics, first_error_line, FileMetrics};
use crate::core::config::PoolConfig;
use crate::core::model::FileRecord;
use crate::lang::registry::GrammarRegistry;

/// Per-file and terminal notifications produced by a pool submission.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Completed { worker: usize, metrics: FileMetrics },
    Failed { path: String, reason: String },
    Skipped { path: String, reason: SkipReason },
    /// Every worker has drained its partition or stopped on cancellation.
    EndOfStream,
    /// A worker died without finishing its partition.
    Error { message: String },
}

impl PoolEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Error { .. })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    channel_capacity: usize,
    max_file_bytes: u64,
    tolerate_syntax_errors: bool,
    submissions: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            size: config.worker_count().max(1),
            channel_capacity: config.channel_capacity.max(1),
            max_file_bytes: config.max_file_bytes,
            tolerate_syntax_errors: config.tolerate_syntax_errors,
            submissions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of `submit` calls served so far.
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Split `files` so that file `i` lands on worker `i mod n`.
    pub fn partition(&self, files: Vec<FileRecord>) -> Vec<Vec<FileRecord>> {
        let mut partitions: Vec<Vec<FileRecord>> = (0..self.size).map(|_| Vec::new()).collect();
        for (index, file) in files.into_iter().enumerate() {
            partitions[index % self.size].push(file);
        }
        partitions
    }

    /// Start processing `files`. Must be called inside a tokio runtime.
    pub fn submit(&self, files: Vec<FileRecord>, cancel: CancellationToken) -> PoolStream {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let total = files.len();

        let mut handles = Vec::with_capacity(self.size);
        for (worker, partition) in self.partition(files).into_iter().enumerate() {
            let tx = tx.clone();
            let cancel = cancel.clone();
            let settings = self.settings();
            handles.push(tokio::task::spawn_blocking(move || {
                run_worker(worker, partition, settings, tx, cancel)
            }));
        }

        debug!("Submitted {} files to {} workers", total, self.size);

        tokio::spawn(async move {
            let mut failure = None;
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Worker terminated abnormally: {}", e);
                    failure.get_or_insert_with(|| e.to_string());
                }
            }
            let last = match failure {
                Some(message) => PoolEvent::Error { message },
                None => PoolEvent::EndOfStream,
            };
            // The receiver may already be gone when the job was abandoned.
            let _ = tx.send(last).await;
        });

        PoolStream { rx }
    }

    fn settings(&self) -> WorkerSettings {
        WorkerSettings {
            max_file_bytes: self.max_file_bytes,
            tolerate_syntax_errors: self.tolerate_syntax_errors,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    max_file_bytes: u64,
    tolerate_syntax_errors: bool,
}

fn run_worker(
    worker: usize,
    files: Vec<FileRecord>,
    settings: WorkerSettings,
    tx: mpsc::Sender<PoolEvent>,
    cancel: CancellationToken,
) {
    let mut registry = GrammarRegistry::new();
    let assigned = files.len();
    let mut processed = 0usize;

    for file in files {
        if cancel.is_cancelled() {
            debug!("Worker {} cancelled after {}/{} files", worker, processed, assigned);
            return;
        }
        let event = process_file(worker, &mut registry, &file, settings);
        processed += 1;
        if tx.blocking_send(event).is_err() {
            debug!("Worker {} lost its receiver", worker);
            return;
        }
    }

    debug!(
        "Worker {} finished {} files with {} grammars loaded",
        worker,
        processed,
        registry.grammars_loaded()
    );
}

fn process_file(
    worker: usize,
    registry: &mut GrammarRegistry,
    file: &FileRecord,
    settings: WorkerSettings,
) -> PoolEvent {
    if !file.language.is_supported() {
        return PoolEvent::Skipped {
            path: file.path.clone(),
            reason: SkipReason::UnsupportedLanguage,
        };
    }
    if file.size_bytes > settings.max_file_bytes {
        return PoolEvent::Skipped {
            path: file.path.clone(),
            reason: SkipReason::TooLarge,
        };
    }

    let tree = match registry.parse(file.language, &file.path, &file.text) {
        Ok(tree) => tree,
        Err(e) => {
            return PoolEvent::Failed {
                path: file.path.clone(),
                reason: e.to_string(),
            }
        }
    };

    if !settings.tolerate_syntax_errors {
        if let Some(line) = first_error_line(&tree) {
            return PoolEvent::Failed {
                path: file.path.clone(),
                reason: format!("syntax error at line {line}"),
            };
        }
    }

    match extract_file_metrics(file, &tree) {
        Ok(metrics) => PoolEvent::Completed { worker, metrics },
        Err(e) => PoolEvent::Failed {
            path: file.path.clone(),
            reason: e.to_string(),
        },
    }
}

/// Receiving side of a pool submission.
pub struct PoolStream {
    rx: mpsc::Receiver<PoolEvent>,
}

impl PoolStream {
    pub async fn next_event(&mut self) -> Option<PoolEvent> {
        self.rx.recv().await
    }
}

impl Stream for PoolStream {
    type Item = PoolEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
