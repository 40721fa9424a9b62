//! Three-level candidate evaluation: syntax, static shape, sandboxed runtime.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::evaluator::result::{EvaluationResult, Level, LevelResult};
use crate::evaluator::syntax::PythonModule;
use crate::execution::Sandbox;
use crate::history::CaseLog;

/// Evaluates candidates in order of increasing cost, stopping at the first
/// failing level.
///
/// Holds no mutable state of its own, so it can be shared across concurrent
/// evaluations. Runtime failures and full passes are appended to the case
/// log when one is attached; log errors never affect the result.
#[derive(Clone)]
pub struct TieredEvaluator {
    sandbox: Arc<dyn Sandbox>,
    case_log: Option<Arc<CaseLog>>,
}

impl TieredEvaluator {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox,
            case_log: None,
        }
    }

    /// Attaches a case log for runtime failures and full passes.
    pub fn with_case_log(mut self, case_log: Arc<CaseLog>) -> Self {
        self.case_log = Some(case_log);
        self
    }

    /// Evaluates `code` against `harness`.
    pub async fn evaluate(&self, code: &str, harness: &str) -> EvaluationResult {
        self.run_levels(code, harness, "", None).await
    }

    /// Evaluates a generated candidate, recording the prompt it came from.
    pub async fn evaluate_for_prompt(
        &self,
        code: &str,
        harness: &str,
        prompt: &str,
    ) -> EvaluationResult {
        self.run_levels(code, harness, prompt, None).await
    }

    /// Evaluates a repaired candidate, recording the code it was repaired from.
    pub async fn evaluate_repair(
        &self,
        original: &str,
        repaired: &str,
        harness: &str,
        prompt: &str,
    ) -> EvaluationResult {
        self.run_levels(repaired, harness, prompt, Some(original)).await
    }

    async fn run_levels(
        &self,
        code: &str,
        harness: &str,
        prompt: &str,
        original: Option<&str>,
    ) -> EvaluationResult {
        let mut levels = Vec::with_capacity(Level::ALL.len());

        // Level 1
        let module = match PythonModule::parse(code) {
            Ok(module) => module,
            Err(issue) => {
                levels.push((Level::Syntax, LevelResult::fail(issue.to_string())));
                return EvaluationResult::from_levels(levels);
            }
        };
        levels.push((Level::Syntax, LevelResult::pass("syntax ok")));

        // Level 2
        let functions = module.functions();
        drop(module);
        if functions.is_empty() {
            levels.push((
                Level::Static,
                LevelResult::fail("no function definition found"),
            ));
            return EvaluationResult::from_levels(levels);
        }
        for function in functions.iter().filter(|f| !f.has_return) {
            debug!(
                function = %function.name,
                line = function.line,
                "Function has no return statement"
            );
        }
        levels.push((Level::Static, LevelResult::pass("static ok")));

        // Level 3
        let exec = self.sandbox.execute(code, harness).await;
        if exec.success() {
            let stdout = exec.stdout.trim();
            let message = if stdout.is_empty() {
                "tests passed".to_string()
            } else {
                format!("tests passed: {stdout}")
            };
            levels.push((Level::Runtime, LevelResult::pass(message)));

            if let Some(log) = &self.case_log {
                if let Err(e) = log.log_success(prompt, original, code, harness).await {
                    warn!(error = %e, "Failed to append success record");
                }
            }
        } else {
            let message = exec.diagnostic().to_string();
            debug!(
                exit_code = exec.exit_code,
                timed_out = exec.timed_out,
                "Runtime level failed"
            );

            if let Some(log) = &self.case_log {
                if let Err(e) = log.log_failure(prompt, code, &message, harness).await {
                    warn!(error = %e, "Failed to append failure record");
                }
            }
            levels.push((Level::Runtime, LevelResult::fail(message)));
        }

        EvaluationResult::from_levels(levels)
    }
}
