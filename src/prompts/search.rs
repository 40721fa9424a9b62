//! Expansion prompt for the tree search.
//!
//! The prompt carries the node's current code, any similar past failures
//! from the case log, and the level at which the node last failed.

use crate::evaluator::EvaluationResult;
use crate::history::FailureRecord;

/// Closing instruction of every expansion prompt.
pub const SEARCH_INSTRUCTION: &str =
    "Fix the code so that it passes the tests. Return only the corrected Python code.";

/// Builds the expansion prompt for a node.
///
/// # Arguments
///
/// * `code` - The node's program text
/// * `evaluation` - The node's last evaluation, if it has one
/// * `retrieved` - Similar past failures, best match first
pub fn build_search_prompt(
    code: &str,
    evaluation: Option<&EvaluationResult>,
    retrieved: &[FailureRecord],
) -> String {
    let mut prompt = format!("Current code:\n```python\n{code}\n```\n\n");

    if !retrieved.is_empty() {
        prompt.push_str("# Similar past failures for reference:\n");
        for record in retrieved {
            prompt.push_str(&format!("# Failed candidate: {}\n", record.candidate));
            prompt.push_str(&format!("# Error: {}\n", record.stderr));
        }
        prompt.push('\n');
    }

    if let Some(evaluation) = evaluation {
        if let (Some(level), Some(message)) = (evaluation.failed_at, evaluation.failure_message())
        {
            prompt.push_str(&format!("Failed at {level}: {message}\n\n"));
        }
    }

    prompt.push_str(SEARCH_INSTRUCTION);
    prompt
}
