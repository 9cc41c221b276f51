//! Configuration types and management for codepulse.
//!
//! Every section carries serde defaults so partial YAML files load, and
//! [`PulseConfig::validate`] is called by the engine before any job runs.

pub mod validation;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::{PulseError, Result};

pub use validation::{
    validate_bounded_usize, validate_optional_path, validate_positive_u64,
    validate_positive_usize,
};

/// Main configuration for the analysis engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Routing, timeout and checkpoint policy
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Local worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Duplicate detection settings
    #[serde(default)]
    pub duplicates: DuplicatesConfig,

    /// Complexity thresholds used for top-issue ranking
    #[serde(default)]
    pub complexity: ComplexityConfig,

    /// Durable job and result storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl PulseConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PulseError::io(format!("Failed to read config file: {}", path.display()), e)
        })?;

        serde_yaml::from_str(&content).map_err(Into::into)
    }

    /// Save configuration to a YAML file
    pub fn to_yaml_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content).map_err(|e| {
            PulseError::io(
                format!("Failed to write config file: {}", path.display()),
                e,
            )
        })
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        self.pool.validate()?;
        self.cache.validate()?;
        self.duplicates.validate()?;
        self.complexity.validate()?;
        self.persistence.validate()?;
        Ok(())
    }
}

/// Routing and job lifetime policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Jobs with fewer files than this run on the local pool
    #[serde(default = "OrchestratorConfig::default_max_local_files")]
    pub max_local_files: usize,

    /// Fixed part of the aggregation timeout
    #[serde(default = "OrchestratorConfig::default_timeout_base_ms")]
    pub timeout_base_ms: u64,

    /// Per-file allowance added to the aggregation timeout
    #[serde(default = "OrchestratorConfig::default_timeout_per_file_ms")]
    pub timeout_per_file_ms: u64,

    /// Save a checkpoint every N completed files while aggregating
    #[serde(default = "OrchestratorConfig::default_checkpoint_interval")]
    pub checkpoint_interval: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_local_files: Self::default_max_local_files(),
            timeout_base_ms: Self::default_timeout_base_ms(),
            timeout_per_file_ms: Self::default_timeout_per_file_ms(),
            checkpoint_interval: Self::default_checkpoint_interval(),
        }
    }
}

impl OrchestratorConfig {
    const fn default_max_local_files() -> usize {
        500
    }

    const fn default_timeout_base_ms() -> u64 {
        120_000
    }

    const fn default_timeout_per_file_ms() -> u64 {
        250
    }

    const fn default_checkpoint_interval() -> usize {
        50
    }

    /// Aggregation bound for a job of `file_count` files.
    pub fn timeout_for(&self, file_count: usize) -> std::time::Duration {
        let per_file = self.timeout_per_file_ms.saturating_mul(file_count as u64);
        std::time::Duration::from_millis(self.timeout_base_ms.saturating_add(per_file))
    }

    pub fn validate(&self) -> Result<()> {
        validate_positive_usize(self.max_local_files, "orchestrator.max_local_files")?;
        validate_positive_u64(self.timeout_base_ms, "orchestrator.timeout_base_ms")?;
        validate_positive_usize(self.checkpoint_interval, "orchestrator.checkpoint_interval")?;
        Ok(())
    }
}

/// Local worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Worker count; `None` uses available parallelism minus one
    #[serde(default)]
    pub workers: Option<usize>,

    /// Capacity of the bounded result channel
    #[serde(default = "PoolConfig::default_channel_capacity")]
    pub channel_capacity: usize,

    /// Files above this size are skipped as too large
    #[serde(default = "PoolConfig::default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Accept trees that contain error nodes instead of failing the file
    #[serde(default)]
    pub tolerate_syntax_errors: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            channel_capacity: Self::default_channel_capacity(),
            max_file_bytes: Self::default_max_file_bytes(),
            tolerate_syntax_errors: false,
        }
    }
}

impl PoolConfig {
    const fn default_channel_capacity() -> usize {
        256
    }

    const fn default_max_file_bytes() -> u64 {
        2 * 1024 * 1024
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers {
            validate_bounded_usize(workers, 1, 1024, "pool.workers")?;
        }
        validate_positive_usize(self.channel_capacity, "pool.channel_capacity")?;
        validate_positive_u64(self.max_file_bytes, "pool.max_file_bytes")?;
        Ok(())
    }
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Disk,
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_backend")]
    pub backend: CacheBackend,

    /// Directory for the disk backend
    #[serde(default = "CacheConfig::default_directory")]
    pub directory: PathBuf,

    /// Entry time-to-live in seconds
    #[serde(default = "CacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: Self::default_backend(),
            directory: Self::default_directory(),
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    const fn default_backend() -> CacheBackend {
        CacheBackend::Memory
    }

    fn default_directory() -> PathBuf {
        PathBuf::from(".codepulse-cache")
    }

    const fn default_ttl_secs() -> u64 {
        24 * 60 * 60
    }

    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        validate_positive_u64(self.ttl_secs, "cache.ttl_secs")?;
        if self.backend == CacheBackend::Disk {
            validate_optional_path(Some(self.directory.as_path()), "cache.directory")?;
        }
        Ok(())
    }
}

/// Duplicate detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatesConfig {
    /// Functions with fewer structural nodes are ignored. The default of 1
    /// keeps every function; raise it to drop trivial one-liners.
    #[serde(default = "DuplicatesConfig::default_min_nodes")]
    pub min_nodes: usize,

    /// Also cluster functions that differ only in literal values
    #[serde(default = "DuplicatesConfig::default_detect_near")]
    pub detect_near: bool,
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            min_nodes: Self::default_min_nodes(),
            detect_near: Self::default_detect_near(),
        }
    }
}

impl DuplicatesConfig {
    const fn default_min_nodes() -> usize {
        1
    }

    const fn default_detect_near() -> bool {
        true
    }

    pub fn validate(&self) -> Result<()> {
        validate_positive_usize(self.min_nodes, "duplicates.min_nodes")
    }
}

/// Thresholds that mark a function as an issue in the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityConfig {
    #[serde(default = "ComplexityConfig::default_cyclomatic_threshold")]
    pub cyclomatic_threshold: u32,

    #[serde(default = "ComplexityConfig::default_nesting_threshold")]
    pub nesting_threshold: u32,

    /// Maximum number of top issues kept in the summary
    #[serde(default = "ComplexityConfig::default_top_issue_limit")]
    pub top_issue_limit: usize,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            cyclomatic_threshold: Self::default_cyclomatic_threshold(),
            nesting_threshold: Self::default_nesting_threshold(),
            top_issue_limit: Self::default_top_issue_limit(),
        }
    }
}

impl ComplexityConfig {
    const fn default_cyclomatic_threshold() -> u32 {
        10
    }

    const fn default_nesting_threshold() -> u32 {
        4
    }

    const fn default_top_issue_limit() -> usize {
        10
    }

    pub fn validate(&self) -> Result<()> {
        if self.cyclomatic_threshold == 0 {
            return Err(PulseError::config_field(
                "cyclomatic threshold must be at least 1",
                "complexity.cyclomatic_threshold",
            ));
        }
        validate_positive_usize(self.top_issue_limit, "complexity.top_issue_limit")
    }
}

/// Durable storage locations. Unset paths select in-memory stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_store_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_log_path: Option<PathBuf>,
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<()> {
        validate_optional_path(self.job_store_dir.as_deref(), "persistence.job_store_dir")?;
        validate_optional_path(
            self.result_log_path.as_deref(),
            "persistence.result_log_path",
        )
    }
}
