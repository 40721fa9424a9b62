//! Monte Carlo tree search over candidate programs.
//!
//! Each simulation selects a leaf by UCB, expands it with freshly generated
//! candidates (evaluated concurrently, runtime failures repaired once), and
//! backpropagates the best reward of the new children. Tree mutation only
//! happens on the controller's own task, between awaits.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SearchError;
use crate::evaluator::{EvaluationResult, TieredEvaluator, RUNTIME_FAILURE_REWARD};
use crate::history::{FailureRecord, FailureRetriever};
use crate::llm::CandidateGenerator;
use crate::prompts::build_search_prompt;
use crate::repair::RepairOracle;
use crate::search::node::NodeId;
use crate::search::stats::RunStats;
use crate::search::tree::SearchTree;

/// Default UCB exploration constant.
pub const DEFAULT_EXPLORATION_C: f64 = 1.4;
pub const DEFAULT_SIMULATIONS: u32 = 30;
pub const DEFAULT_CANDIDATES: usize = 3;
pub const DEFAULT_RETRIEVAL_K: usize = 3;

/// Simulations between progress log lines.
const PROGRESS_INTERVAL: u32 = 5;

/// Search budget and shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// UCB exploration constant.
    pub exploration_c: f64,
    /// Number of select/expand/backpropagate rounds.
    pub simulations: u32,
    /// Candidates requested per expansion.
    pub candidates: usize,
    /// Past failures retrieved into each expansion prompt.
    pub retrieval_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            exploration_c: DEFAULT_EXPLORATION_C,
            simulations: DEFAULT_SIMULATIONS,
            candidates: DEFAULT_CANDIDATES,
            retrieval_k: DEFAULT_RETRIEVAL_K,
        }
    }
}

/// Result of a search run.
///
/// `evaluation` is `None` only when no child was ever created and the root
/// code is returned as-is. Callers check `evaluation.reward` (or `passed`)
/// to know whether the code is a real fix.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub code: String,
    pub evaluation: Option<EvaluationResult>,
    pub stats: RunStats,
}

impl SearchOutcome {
    pub fn is_fixed(&self) -> bool {
        self.evaluation.as_ref().is_some_and(|e| e.passed)
    }
}

/// One evaluated candidate, after the optional repair step.
struct ExpandedCandidate {
    code: String,
    evaluation: EvaluationResult,
    /// Evaluations performed for this candidate, original first.
    evaluations: Vec<EvaluationResult>,
    repair_attempted: bool,
    repaired: bool,
}

/// Drives the search for one buggy program.
pub struct MctsController {
    tree: SearchTree,
    evaluator: TieredEvaluator,
    generator: Arc<dyn CandidateGenerator>,
    repair: RepairOracle,
    retriever: Option<Arc<dyn FailureRetriever>>,
    config: SearchConfig,
}

impl MctsController {
    /// Creates a controller rooted at `root_code`.
    ///
    /// The repair oracle defaults to the same generator.
    pub fn new(
        root_code: impl Into<String>,
        evaluator: TieredEvaluator,
        generator: Arc<dyn CandidateGenerator>,
        config: SearchConfig,
    ) -> Self {
        Self {
            tree: SearchTree::new(root_code),
            evaluator,
            repair: RepairOracle::new(generator.clone()),
            generator,
            retriever: None,
            config,
        }
    }

    pub fn with_repair(mut self, repair: RepairOracle) -> Self {
        self.repair = repair;
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn FailureRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs the configured number of simulations against `harness` and
    /// returns the best child of the root.
    ///
    /// Generation, sandbox and log failures only shrink an expansion; the
    /// only error is a corrupted tree.
    pub async fn run(&mut self, harness: &str) -> Result<SearchOutcome, SearchError> {
        let mut stats = RunStats::default();

        info!(
            simulations = self.config.simulations,
            candidates = self.config.candidates,
            exploration_c = self.config.exploration_c,
            "Starting MCTS"
        );

        for simulation in 0..self.config.simulations {
            let leaf = self.tree.select(self.config.exploration_c)?;
            let reward = self.expand(leaf, harness, &mut stats).await?;
            self.tree.backpropagate(leaf, reward)?;
            stats.simulations += 1;

            if (simulation + 1) % PROGRESS_INTERVAL == 0 {
                let root = self.tree.root();
                info!(
                    simulation = simulation + 1,
                    nodes = self.tree.len(),
                    root_visits = root.visits(),
                    root_win_rate = root.win_rate().unwrap_or(0.0),
                    "MCTS progress"
                );
            }
        }

        self.tree.check_invariants()?;

        let outcome = match self.tree.best_child() {
            Some(best) => {
                let node = self.tree.get(best)?;
                SearchOutcome {
                    code: node.code().to_string(),
                    evaluation: node.evaluation().cloned(),
                    stats,
                }
            }
            None => {
                warn!("Search produced no candidates, returning original code");
                SearchOutcome {
                    code: self.tree.root().code().to_string(),
                    evaluation: None,
                    stats,
                }
            }
        };

        info!(
            simulations = outcome.stats.simulations,
            syntax_checks = outcome.stats.syntax_checks,
            static_analyses = outcome.stats.static_analyses,
            runtime_tests = outcome.stats.runtime_tests,
            early_rejects = outcome.stats.early_rejects,
            early_reject_rate = %format!("{:.1}%", outcome.stats.early_reject_rate() * 100.0),
            llm_calls = outcome.stats.llm_calls,
            repair_attempts = outcome.stats.repair_attempts,
            repair_successes = outcome.stats.repair_successes,
            best_reward = outcome.evaluation.as_ref().map_or(0.0, |e| e.reward),
            "MCTS finished"
        );

        Ok(outcome)
    }

    /// Expands `leaf` and returns the best reward among its new children, or
    /// 0.0 when none were created.
    async fn expand(
        &mut self,
        leaf: NodeId,
        harness: &str,
        stats: &mut RunStats,
    ) -> Result<f64, SearchError> {
        let (code, evaluation) = {
            let node = self.tree.get(leaf)?;
            (node.code().to_string(), node.evaluation().cloned())
        };

        let retrieved = self.retrieve(&code).await;
        let prompt = build_search_prompt(&code, evaluation.as_ref(), &retrieved);

        stats.llm_calls += 1;
        let candidates = match self.generator.generate(&prompt, self.config.candidates).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(node = %leaf, error = %e, "Generation failed, no children this simulation");
                stats.generation_failures += 1;
                return Ok(0.0);
            }
        };

        if candidates.is_empty() {
            debug!(node = %leaf, "Generator returned no candidates");
            return Ok(0.0);
        }

        let expanded = join_all(
            candidates
                .into_iter()
                .map(|candidate| self.evaluate_candidate(candidate, harness, &prompt)),
        )
        .await;

        let mut best_reward: f64 = 0.0;
        for candidate in expanded {
            for evaluation in &candidate.evaluations {
                stats.record_evaluation(evaluation);
            }
            if candidate.repair_attempted {
                stats.repair_attempts += 1;
                stats.llm_calls += 1;
            }
            if candidate.repaired {
                stats.repair_successes += 1;
            }

            best_reward = best_reward.max(candidate.evaluation.reward);
            self.tree
                .add_child(leaf, candidate.code, candidate.evaluation)?;
            stats.nodes_created += 1;
        }

        debug!(node = %leaf, best_reward, "Expansion complete");
        Ok(best_reward)
    }

    /// Evaluates one candidate and, on a runtime failure, tries a single
    /// repair. The repair is kept only if it scores above a runtime failure.
    async fn evaluate_candidate(
        &self,
        candidate: String,
        harness: &str,
        prompt: &str,
    ) -> ExpandedCandidate {
        let evaluation = self
            .evaluator
            .evaluate_for_prompt(&candidate, harness, prompt)
            .await;
        let mut evaluations = vec![evaluation.clone()];

        if !evaluation.is_runtime_failure() {
            return ExpandedCandidate {
                code: candidate,
                evaluation,
                evaluations,
                repair_attempted: false,
                repaired: false,
            };
        }

        let error = evaluation.failure_message().unwrap_or_default();
        let fixed = self.repair.attempt_fix(&candidate, error, harness).await;
        if fixed == candidate {
            return ExpandedCandidate {
                code: candidate,
                evaluation,
                evaluations,
                repair_attempted: true,
                repaired: false,
            };
        }

        let repaired = self
            .evaluator
            .evaluate_repair(&candidate, &fixed, harness, prompt)
            .await;
        evaluations.push(repaired.clone());

        if repaired.reward > RUNTIME_FAILURE_REWARD {
            info!(reward = repaired.reward, "Repair accepted");
            ExpandedCandidate {
                code: fixed,
                evaluation: repaired,
                evaluations,
                repair_attempted: true,
                repaired: true,
            }
        } else {
            debug!(reward = repaired.reward, "Repair did not improve candidate");
            ExpandedCandidate {
                code: candidate,
                evaluation,
                evaluations,
                repair_attempted: true,
                repaired: false,
            }
        }
    }

    async fn retrieve(&self, query: &str) -> Vec<FailureRecord> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        if self.config.retrieval_k == 0 {
            return Vec::new();
        }

        match retriever.retrieve(query, self.config.retrieval_k).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failure retrieval failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecResult, Sandbox};
    use crate::llm::MockGenerator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BUGGY: &str = "def add(a, b):\n    return a - b";
    const FIXED: &str = "def add(a, b):\n    return a + b";
    const HARNESS: &str = "    assert add(1, 2) == 3";

    /// Passes any program containing `a + b`.
    #[derive(Default)]
    struct AdditionSandbox {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Sandbox for AdditionSandbox {
        async fn execute(&self, code: &str, _harness: &str) -> ExecResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if code.contains("a + b") {
                ExecResult::completed(0, "", "")
            } else {
                ExecResult::completed(1, "", "Traceback (most recent call last):\nAssertionError")
            }
        }
    }

    fn controller(
        generator: Arc<dyn CandidateGenerator>,
        simulations: u32,
    ) -> (MctsController, Arc<AdditionSandbox>) {
        let sandbox = Arc::new(AdditionSandbox::default());
        let evaluator = TieredEvaluator::new(sandbox.clone());
        let config = SearchConfig {
            simulations,
            ..SearchConfig::default()
        };
        (MctsController::new(BUGGY, evaluator, generator, config), sandbox)
    }

    #[tokio::test]
    async fn test_finds_passing_candidate() {
        let generator = Arc::new(MockGenerator::new().with_defaults(vec![
            BUGGY.to_string(),
            FIXED.to_string(),
            "def add(a, b)\n    return a + b".to_string(),
        ]));
        let (mut controller, _) = controller(generator, 5);

        let outcome = controller.run(HARNESS).await.unwrap();
        assert_eq!(outcome.code, FIXED);
        assert!(outcome.is_fixed());
        assert_eq!(outcome.stats.simulations, 5);
        controller.tree().check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_generation_failure_returns_root() {
        let (mut controller, sandbox) = controller(Arc::new(MockGenerator::failing()), 4);

        let outcome = controller.run(HARNESS).await.unwrap();
        assert_eq!(outcome.code, BUGGY);
        assert!(outcome.evaluation.is_none());
        assert_eq!(outcome.stats.generation_failures, 4);
        assert_eq!(controller.tree().len(), 1);
        assert_eq!(controller.tree().root().visits(), 4);
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_repaired() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_rule("[Buggy code]", vec![FIXED.to_string()])
                .with_defaults(vec![BUGGY.to_string()]),
        );
        let (mut controller, _) = controller(generator, 1);

        let outcome = controller.run(HARNESS).await.unwrap();
        assert_eq!(outcome.code, FIXED);
        assert_eq!(outcome.evaluation.unwrap().reward, 1.0);
        assert_eq!(outcome.stats.repair_attempts, 3);
        assert_eq!(outcome.stats.repair_successes, 3);
    }

    #[tokio::test]
    async fn test_unhelpful_repair_keeps_original() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_rule("[Buggy code]", vec!["def add(a, b):\n    return a * b".to_string()])
                .with_defaults(vec![BUGGY.to_string()]),
        );
        let (mut controller, _) = controller(generator, 1);

        let outcome = controller.run(HARNESS).await.unwrap();
        assert_eq!(outcome.code, BUGGY);
        let evaluation = outcome.evaluation.unwrap();
        assert_eq!(evaluation.reward, RUNTIME_FAILURE_REWARD);
        assert_eq!(outcome.stats.repair_successes, 0);
    }

    #[tokio::test]
    async fn test_syntax_failures_are_not_repaired() {
        let generator = Arc::new(MockGenerator::new().with_defaults(vec![
            "def add(a, b)\n    return a + b".to_string(),
        ]));
        let (mut controller, sandbox) = controller(generator.clone(), 2);

        let outcome = controller.run(HARNESS).await.unwrap();
        assert_eq!(outcome.evaluation.unwrap().reward, 0.0);
        assert_eq!(outcome.stats.repair_attempts, 0);
        assert_eq!(outcome.stats.early_rejects, outcome.stats.syntax_checks);
        assert_eq!(sandbox.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_wins_never_exceed_visits() {
        let generator = Arc::new(MockGenerator::new().with_defaults(vec![
            BUGGY.to_string(),
            "def add(a, b):\n    pass".to_string(),
            "x = ".to_string(),
            FIXED.to_string(),
        ]));
        let (mut controller, _) = controller(generator, 12);

        controller.run(HARNESS).await.unwrap();
        for (_, node) in controller.tree().iter() {
            assert!(node.wins() >= 0.0);
            assert!(node.wins() <= f64::from(node.visits()) + 1e-9);
        }
    }

}
