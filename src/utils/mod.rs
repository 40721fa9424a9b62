//! Shared utility functions for reason-forge.
//!
//! Currently holds code extraction from model responses.

pub mod code_extraction;

pub use code_extraction::{
    dedup_preserving_order, extract_code, extract_from_any_block, extract_from_code_start,
    extract_from_python_block,
};
