//! Difficulty-based routing between a local and a remote generator.
//!
//! Hard prompts (long, or involving class definitions) go to the remote
//! model; everything else to the local model. When the chosen generator
//! fails or returns nothing, the other one is tried before giving up.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::LlmError;
use crate::llm::generator::CandidateGenerator;

/// Prompts longer than this many characters count as hard.
pub const HARD_PROMPT_CHARS: usize = 1000;

/// Estimated difficulty of a generation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Easy,
    Hard,
}

impl Complexity {
    /// Classifies a prompt by length and class definitions.
    pub fn classify(prompt: &str) -> Self {
        if prompt.chars().count() > HARD_PROMPT_CHARS || prompt.contains("class ") {
            Complexity::Hard
        } else {
            Complexity::Easy
        }
    }
}

/// Routes each prompt to a local or remote generator.
pub struct ModelRouter {
    local: Option<Arc<dyn CandidateGenerator>>,
    remote: Option<Arc<dyn CandidateGenerator>>,
}

impl ModelRouter {
    /// Creates a router. At least one generator should be present.
    pub fn new(
        local: Option<Arc<dyn CandidateGenerator>>,
        remote: Option<Arc<dyn CandidateGenerator>>,
    ) -> Self {
        Self { local, remote }
    }

    /// Generators to try for `complexity`, preferred first.
    fn route(&self, complexity: Complexity) -> Vec<&Arc<dyn CandidateGenerator>> {
        let (first, second) = match complexity {
            Complexity::Hard => (&self.remote, &self.local),
            Complexity::Easy => (&self.local, &self.remote),
        };
        first.iter().chain(second.iter()).collect()
    }
}

#[async_trait]
impl CandidateGenerator for ModelRouter {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, LlmError> {
        let complexity = Complexity::classify(prompt);
        let chain = self.route(complexity);
        if chain.is_empty() {
            return Err(LlmError::AllGeneratorsFailed(
                "no generator configured".to_string(),
            ));
        }

        let mut last_error = None;
        for generator in chain {
            info!(
                selected_model = generator.name(),
                complexity = ?complexity,
                "Model routed"
            );
            match generator.generate(prompt, n).await {
                Ok(candidates) if !candidates.is_empty() => return Ok(candidates),
                Ok(_) => {
                    warn!(model = generator.name(), "Model returned no candidates");
                    last_error = Some(LlmError::NoCandidates(generator.name().to_string()));
                }
                Err(e) => {
                    warn!(model = generator.name(), error = %e, "Model failed, trying fallback");
                    last_error = Some(e);
                }
            }
        }

        Err(LlmError::AllGeneratorsFailed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no generator tried".to_string()),
        ))
    }

    fn name(&self) -> &str {
        "router"
    }
}
