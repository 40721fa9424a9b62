//! Durable case history.
//!
//! Runtime failures and full passes are appended to newline-delimited JSON
//! logs. The search engine only appends; reading back happens through a
//! [`FailureRetriever`], which feeds similar past failures into expansion
//! prompts.

pub mod log;
pub mod retriever;

pub use log::{load_failures, CaseLog, FailureRecord, SuccessRecord};
pub use retriever::{overlap_score, rank_failures, FailureRetriever, JsonlRetriever};
