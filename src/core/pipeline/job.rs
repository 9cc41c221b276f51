//! Job state machine, typed job failures and the durable job record.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::results::{AnalysisResult, FileFailure, SkippedFile};
use super::services::FetchErrorKind;
use crate::core::ast::FileMetrics;
use crate::core::errors::{PulseError, Result};
use crate::core::model::{CacheKey, FileRecord, RepositoryId};

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    CacheCheck,
    Routing,
    LocalDispatch,
    RemoteDispatch,
    Aggregating,
    Caching,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        if next == Error {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Received, CacheCheck)
                | (CacheCheck, Done)
                | (CacheCheck, Routing)
                | (Routing, LocalDispatch)
                | (Routing, RemoteDispatch)
                | (LocalDispatch, Aggregating)
                | (RemoteDispatch, Aggregating)
                | (Aggregating, Caching)
                | (Caching, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::CacheCheck => "cache_check",
            Self::Routing => "routing",
            Self::LocalDispatch => "local_dispatch",
            Self::RemoteDispatch => "remote_dispatch",
            Self::Aggregating => "aggregating",
            Self::Caching => "caching",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the parsing work of a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDecision {
    Local,
    Remote,
}

impl RoutingDecision {
    /// Local below `max_local_files`, remote at or above it.
    pub fn for_file_count(file_count: usize, max_local_files: usize) -> Self {
        if file_count < max_local_files {
            Self::Local
        } else {
            Self::Remote
        }
    }
}

/// Job-fatal failure carried by the `error` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum JobFailure {
    #[error("fetch failed ({kind}): {message}")]
    FetchFailure { kind: FetchErrorKind, message: String },

    #[error("remote queue failed: {reason}")]
    RemoteQueueFailure { reason: String },

    #[error("timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("no files analyzed ({skipped} skipped, {failed} failed)")]
    NoFilesAnalyzed { skipped: usize, failed: usize },

    #[error("job cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl JobFailure {
    /// Stable machine-readable reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FetchFailure { .. } => "fetch_failure",
            Self::RemoteQueueFailure { .. } => "remote_queue_failure",
            Self::Timeout { .. } => "timeout",
            Self::NoFilesAnalyzed { .. } => "no_files_analyzed",
            Self::Cancelled => "cancelled",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<PulseError> for JobFailure {
    fn from(err: PulseError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Progress notifications emitted while a job runs.
#[derive(Debug, Clone)]
pub enum JobEvent {
    StateChanged { from: JobState, to: JobState },
    Progress {
        percent: u8,
        completed: usize,
        total: usize,
    },
    Completed {
        result: Arc<AnalysisResult>,
        from_cache: bool,
    },
    Failed { failure: JobFailure },
}

/// Per-file outcomes accumulated so far, persisted for resumption.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCheckpoint {
    pub completed: Vec<FileMetrics>,
    pub failures: Vec<FileFailure>,
    pub skipped: Vec<SkippedFile>,
}

impl JobCheckpoint {
    pub fn accounted(&self) -> usize {
        self.completed.len() + self.failures.len() + self.skipped.len()
    }
}

/// Durable projection of an [`AnalysisJob`], without file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub repository: RepositoryId,
    pub commit: String,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
    pub file_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    #[serde(default)]
    pub checkpoint: JobCheckpoint,
}

/// One analysis run. Owned by the task driving it.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub repository: RepositoryId,
    pub commit: String,
    pub files: Vec<FileRecord>,
    pub routing: Option<RoutingDecision>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn new(id: Uuid, repository: RepositoryId, commit: impl Into<String>) -> Self {
        Self {
            id,
            repository,
            commit: commit.into(),
            files: Vec::new(),
            routing: None,
            state: JobState::Received,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.repository.clone(), self.commit.clone())
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&mut self, next: JobState) -> Result<JobState> {
        if !self.state.can_transition_to(next) {
            return Err(PulseError::pipeline(
                self.state.as_str(),
                format!("invalid transition {} -> {}", self.state, next),
            ));
        }
        let previous = self.state;
        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(previous)
    }

    pub fn record(&self, checkpoint: JobCheckpoint, failure: Option<JobFailure>) -> JobRecord {
        JobRecord {
            job_id: self.id,
            repository: self.repository.clone(),
            commit: self.commit.clone(),
            state: self.state,
            routing: self.routing,
            file_count: self.files.len(),
            created_at: self.created_at,
            updated_at: Utc::now(),
            completed_at: self.completed_at,
            failure,
            checkpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        let path = [
            JobState::Received,
            JobState::CacheCheck,
            JobState::Routing,
            JobState::RemoteDispatch,
            JobState::Aggregating,
            JobState::Caching,
            JobState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(JobState::CacheCheck.can_transition_to(JobState::Done));
    }

    #[test]
    fn error_is_reachable_only_from_non_terminal_states() {
        assert!(JobState::Aggregating.can_transition_to(JobState::Error));
        assert!(JobState::Received.can_transition_to(JobState::Error));
        assert!(!JobState::Done.can_transition_to(JobState::Error));
        assert!(!JobState::Error.can_transition_to(JobState::Error));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut job = AnalysisJob::new(Uuid::new_v4(), RepositoryId::new("o", "r"), "c1");
        let err = job.transition(JobState::Aggregating).unwrap_err();
        assert!(matches!(err, PulseError::Pipeline { .. }));
        assert_eq!(job.state, JobState::Received);

        assert_eq!(job.transition(JobState::CacheCheck).unwrap(), JobState::Received);
        job.transition(JobState::Done).unwrap();
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn routing_threshold_is_exclusive() {
        assert_eq!(RoutingDecision::for_file_count(499, 500), RoutingDecision::Local);
        assert_eq!(RoutingDecision::for_file_count(500, 500), RoutingDecision::Remote);
        assert_eq!(RoutingDecision::for_file_count(600, 500), RoutingDecision::Remote);
    }

    #[test]
    fn failure_reasons_are_stable() {
        assert_eq!(JobFailure::Timeout { after_ms: 5 }.reason(), "timeout");
        assert_eq!(JobFailure::Cancelled.reason(), "cancelled");
        let json = serde_json::to_value(JobFailure::NoFilesAnalyzed {
            skipped: 1,
            failed: 2,
        })
        .unwrap();
        assert_eq!(json["failure"], "no_files_analyzed");
    }

    #[test]
    fn remote_failure_keeps_its_reason_through_a_record_round_trip() {
        let mut job = AnalysisJob::new(Uuid::new_v4(), RepositoryId::new("o", "r"), "c1");
        job.transition(JobState::CacheCheck).unwrap();
        job.transition(JobState::Error).unwrap();
        let failure = JobFailure::RemoteQueueFailure {
            reason: "worker crashed".to_string(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["failure"], "remote_queue_failure");
        assert_eq!(json["reason"], "worker crashed");

        let record = job.record(JobCheckpoint::default(), Some(failure.clone()));
        let text = serde_json::to_string(&record).unwrap();
        let restored: JobRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.failure, Some(failure));
    }
}
