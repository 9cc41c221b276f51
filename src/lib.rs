//! # codepulse: Analysis Orchestration & Metrics Engine
//!
//! Analyzes source trees in Python, JavaScript, TypeScript, Rust and Go and
//! produces per-file quality metrics, a file-level dependency graph and
//! duplicate-code clusters.
//!
//! - **Routing**: small repositories run on a local worker pool, large ones
//!   on a remote job queue
//! - **Metrics**: cyclomatic complexity, nesting depth, LOC and function spans
//!   from one tree-sitter walk per file
//! - **Duplicates**: identifier-normalized structural hashes grouped into
//!   exact and near clusters
//! - **Caching**: results keyed by (repository, commit) with a TTL
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          API Layer                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Pipeline         │  Detectors     │  Language   │  I/O       │
//! │ • Orchestrator    │ • Duplicates   │ • Registry  │ • Cache    │
//! │ • Worker pool     │ • Complexity   │ • Profiles  │ • Job store│
//! │ • Aggregator      │ • Dep. graph   │             │ • Results  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codepulse::{PulseConfig, PulseEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = PulseEngine::new(PulseConfig::default())?;
//!     let completed = engine.analyze_directory("./src", None).await?;
//!
//!     println!(
//!         "Analysis completed: {} files processed",
//!         completed.result.summary.files_analyzed
//!     );
//!     Ok(())
//! }
//! ```

#![warn(unsafe_code)]
#![warn(clippy::all)]

// Core analysis engine modules
pub mod core {
    //! Core data model, configuration and the job pipeline.

    pub mod ast;
    pub mod config;
    pub mod errors;
    pub mod file_utils;
    pub mod model;
    pub mod pipeline;
}

// Cross-file detectors run once per job
pub mod detectors {
    //! Duplicate clustering, complexity ranking and dependency graphs.

    pub mod complexity;
    pub mod duplicates;
    pub mod graph;
}

// Grammar loading and per-language tables
pub mod lang {
    //! Language registry and syntax profiles.

    pub mod profiles;
    pub mod registry;
}

// I/O and persistence
pub mod io {
    //! Result caching, job records and the result log.

    pub mod cache;
    pub mod persistence;
}

// Public API and engine interface
pub mod api {
    //! High-level API and engine interface.

    pub mod engine;
    pub mod enrichment;
}

// Re-export primary types for convenience
pub use api::engine::PulseEngine;
pub use core::config::PulseConfig;
pub use core::errors::{PulseError, Result, ResultExt};
pub use core::model::{CacheKey, FileRecord, RepositoryId};
pub use core::pipeline::{AnalysisResult, JobEvent, JobFailure, JobHandle, Orchestrator};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
