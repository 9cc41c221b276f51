//! Analysis job pipeline.
//!
//! ## Key Components
//!
//! - **Orchestrator**: per-job state machine (cache check, routing, dispatch,
//!   aggregation, caching)
//! - **WorkerPool**: fixed-size parse-and-extract workers streaming per-file results
//! - **Aggregator**: identity-keyed accumulation and the one-shot merge
//! - **Services**: repository sources, remote queue and durable store contracts
//!
//! ## Usage
//!
//! ```ignore
//! use codepulse::core::pipeline::{InMemorySource, Orchestrator};
//!
//! let orchestrator = Orchestrator::builder(PulseConfig::default()).build()?;
//! let handle = orchestrator.analyze(repository, "HEAD", InMemorySource::shared(files));
//! let completed = handle.outcome().await?;
//! println!("{} files analyzed", completed.result.summary.files_analyzed);
//! ```

pub use aggregator::{AggregationInputs, Aggregator};
pub use job::{
    AnalysisJob, JobCheckpoint, JobEvent, JobFailure, JobRecord, JobState, RoutingDecision,
};
pub use orchestrator::{CompletedJob, JobHandle, JobOutcome, Orchestrator, OrchestratorBuilder};
pub use results::{AnalysisResult, AnalysisSummary, FileFailure, SkipReason, SkippedFile};
pub use services::{
    FetchError, FetchErrorKind, InMemorySource, JobStore, LocalDirectorySource, RemoteEvent,
    RemoteJobQueue, RemoteSubscription, RepositorySource, ResultStore, MANIFEST_FILES,
};
pub use worker_pool::{PoolEvent, PoolStream, WorkerPool};

mod aggregator;
mod job;
mod orchestrator;
mod results;
mod services;
mod worker_pool;
