//! LLM integration for reason-forge.
//!
//! This module provides the generation oracle the search engine consumes:
//! a chat-completion client for OpenAI-compatible APIs, the
//! [`CandidateGenerator`] capability with its concrete variants, routing
//! between a local and a remote model, and a prompt-keyed candidate cache.
//!
//! ```ignore
//! use reason_forge::llm::{CachedGenerator, CandidateCache, LiteLlmClient, LlmGenerator};
//! use std::sync::Arc;
//!
//! let client = LiteLlmClient::new("http://localhost:4000/v1", None, "deepseek-coder", timeout)?;
//! let remote = LlmGenerator::new("remote", Arc::new(client), "deepseek-coder");
//! let generator = CachedGenerator::new(Arc::new(remote), Arc::new(CandidateCache::new(128)));
//! let candidates = generator.generate(&prompt, 3).await?;
//! ```

pub mod cache;
pub mod generator;
pub mod litellm;
pub mod router;

pub use cache::{CacheStats, CandidateCache, PromptKey};
pub use generator::{
    CachedGenerator, CandidateGenerator, LlmGenerator, MockGenerator, CODE_SYSTEM_PROMPT,
};
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
pub use router::{Complexity, ModelRouter, HARD_PROMPT_CHARS};
