//! Syntax-tree metric extraction.
//!
//! This module provides:
//! - metric records produced per file
//! - the language-agnostic tree walker
//! - structural function-body hashing
//! - table-driven import extraction

pub mod hashing;
pub mod imports;
pub mod metrics;
pub mod walker;

#[cfg(test)]
#[path = "walker_tests.rs"]
mod walker_tests;

pub use hashing::{hash_function_body, BodyHash};
pub use metrics::{FileMetrics, FunctionHash, FunctionSpan};
pub use walker::{extract_file_metrics, first_error_line, TreeWalker};
