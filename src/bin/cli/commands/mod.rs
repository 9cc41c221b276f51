//! CLI Command Implementations
//!
//! - analyze: analysis, resumption and saved-job commands
//! - config: configuration management commands

pub mod analyze;
pub mod config;

pub use analyze::{analyze_command, list_jobs, resume_command, sweep_cache};
pub use config::{
    init_config, list_languages, load_configuration, print_default_config, validate_config,
};
