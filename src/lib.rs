//! reason-forge: automated program repair by tree search over verified
//! LLM candidates.
//!
//! A buggy Python function is repaired by Monte Carlo tree search. Each
//! expansion asks a generation oracle for candidates, scores them with a
//! three-level evaluator (syntax, static shape, sandboxed runtime) and
//! retries runtime failures once through the repair oracle.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod execution;
pub mod history;
pub mod llm;
pub mod prompts;
pub mod repair;
pub mod search;
pub mod utils;

// Re-export commonly used error types
pub use config::ConfigError;
pub use error::{DockerError, HistoryError, LlmError, SearchError};
