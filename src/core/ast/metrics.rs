//! Per-file metric records produced by the tree walker.

use serde::{Deserialize, Serialize};

use crate::lang::registry::LanguageTag;

/// Span and complexity of one function, method, closure or arrow function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpan {
    pub name: String,
    /// 1-based, inclusive
    pub start_line: usize,
    pub end_line: usize,
    /// Always at least 1
    pub cyclomatic: u32,
    pub nesting: u32,
}

/// Structural hashes of one function body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionHash {
    pub name: String,
    pub start_line: usize,
    /// Identifier-insensitive hash of the body
    pub hash: String,
    /// Like `hash`, with literal values also normalized
    pub near_hash: String,
    /// Named syntax nodes in the function subtree
    pub node_count: usize,
}

/// Durable output for one successfully parsed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub path: String,
    pub language: LanguageTag,
    pub size_bytes: u64,
    pub loc: usize,
    /// Maximum over the file's functions, 1 for files without functions
    pub cyclomatic: u32,
    pub cyclomatic_sum: u32,
    pub max_nesting: u32,
    /// Ordered by start position
    pub functions: Vec<FunctionSpan>,
    /// Raw import specifiers in source order
    pub imports: Vec<String>,
    pub hashes: Vec<FunctionHash>,
}

impl FileMetrics {
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}
