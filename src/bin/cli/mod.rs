//! CLI Module Organization
//!
//! - args: argument structures
//! - commands: command execution
//! - output: console tables and result writers

pub mod args;
pub mod commands;
pub mod output;

pub use args::*;
pub use commands::*;
