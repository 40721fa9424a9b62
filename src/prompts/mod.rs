//! LLM prompts for candidate generation.
//!
//! - [`search`] - Expansion prompt built from a node's code, its last
//!   failure and retrieved past failures
//! - [`repair`] - Single-shot fix prompt for runtime failures

pub mod repair;
pub mod search;

pub use repair::{build_fix_prompt, last_error_line};
pub use search::{build_search_prompt, SEARCH_INSTRUCTION};
