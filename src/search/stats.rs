//! Per-run search statistics.

use serde::Serialize;

use crate::evaluator::{EvaluationResult, Level};

/// Counters collected during one [`MctsController::run`](crate::search::MctsController::run).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub simulations: u32,
    pub syntax_checks: u64,
    pub static_analyses: u64,
    pub runtime_tests: u64,
    pub early_rejects: u64,
    pub llm_calls: u64,
    pub generation_failures: u64,
    pub repair_attempts: u64,
    pub repair_successes: u64,
    pub nodes_created: u64,
}

impl RunStats {
    /// Counts which levels an evaluation reached.
    pub fn record_evaluation(&mut self, evaluation: &EvaluationResult) {
        self.syntax_checks += 1;
        if evaluation.level(Level::Syntax).is_some_and(|l| l.passed) {
            self.static_analyses += 1;
        }
        if evaluation.level(Level::Runtime).is_some() {
            self.runtime_tests += 1;
        }
        if evaluation.is_early_reject() {
            self.early_rejects += 1;
        }
    }

    /// Share of evaluations rejected before reaching the sandbox.
    pub fn early_reject_rate(&self) -> f64 {
        if self.syntax_checks == 0 {
            0.0
        } else {
            self.early_rejects as f64 / self.syntax_checks as f64
        }
    }
}
