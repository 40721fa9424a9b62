//! Error types for reason-forge operations.
//!
//! Defines error types for the infrastructure subsystems:
//! - Docker sandbox management
//! - LLM API interactions
//! - Durable case logs
//! - Search controller state
//!
//! Candidate defects (syntax, shape, runtime failures) are never errors;
//! they are carried as [`crate::evaluator::EvaluationResult`] data.

use thiserror::Error;

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Docker image pull failed: {0}")]
    PullFailed(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("Failed to copy files to container: {0}")]
    CopyFailed(String),

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Generator '{0}' produced no candidates")]
    NoCandidates(String),

    #[error("All generators failed. Last error: {0}")]
    AllGeneratorsFailed(String),
}

/// Errors that can occur while reading or appending case logs.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal errors surfaced by the search controller.
///
/// Everything recoverable is absorbed inside a single expansion step, so
/// these only signal corrupted internal state.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Node {0} does not exist in the search tree")]
    UnknownNode(usize),

    #[error("Search tree invariant violated: {0}")]
    InvariantViolated(String),
}
