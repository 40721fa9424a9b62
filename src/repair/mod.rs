//! Single-shot repair of candidates that failed at runtime.
//!
//! The oracle feeds the runtime error back to the generator and asks for
//! exactly one corrected candidate. A reply that does not define a
//! function is treated as malformed and the original code is kept. There
//! is no retry loop: one call, at most one alternative.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::evaluator::contains_function_definition;
use crate::llm::CandidateGenerator;
use crate::prompts::{build_fix_prompt, last_error_line};

/// Asks the generation oracle for one fix of a failing candidate.
#[derive(Clone)]
pub struct RepairOracle {
    generator: Arc<dyn CandidateGenerator>,
}

impl RepairOracle {
    pub fn new(generator: Arc<dyn CandidateGenerator>) -> Self {
        Self { generator }
    }

    /// Returns a fixed candidate, or `code` unchanged when the oracle fails
    /// or replies with something that is not a function definition.
    ///
    /// The harness is not shown to the model; only the code and its error.
    pub async fn attempt_fix(&self, code: &str, error: &str, harness: &str) -> String {
        info!(
            error_msg = last_error_line(error),
            harness_lines = harness.lines().count(),
            "Reflexion triggered"
        );

        let prompt = build_fix_prompt(code, error);

        let proposal = match self.generator.generate(&prompt, 1).await {
            Ok(candidates) => candidates.into_iter().next(),
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e, "Repair generation failed");
                return code.to_string();
            }
        };

        let Some(fixed) = proposal else {
            debug!("Repair generator returned no candidate");
            return code.to_string();
        };

        debug!(
            fixed_code_snippet = %fixed.chars().take(100).collect::<String>(),
            "Repair proposal"
        );

        if !contains_function_definition(&fixed) {
            warn!(reason = "missing function definition", "Repair output rejected");
            return code.to_string();
        }

        fixed
    }
}
