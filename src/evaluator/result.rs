//! Evaluation outcome model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reward for a candidate that fails to parse.
pub const SYNTAX_FAILURE_REWARD: f64 = 0.0;
/// Reward for a candidate that parses but defines no function.
pub const STATIC_FAILURE_REWARD: f64 = 0.3;
/// Reward for a structurally valid candidate that fails its harness.
pub const RUNTIME_FAILURE_REWARD: f64 = 0.7;
/// Reward for a candidate that passes its harness.
pub const PASS_REWARD: f64 = 1.0;

/// The ordered evaluation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "level_1")]
    Syntax,
    #[serde(rename = "level_2")]
    Static,
    #[serde(rename = "level_3")]
    Runtime,
}

impl Level {
    /// All levels in evaluation order.
    pub const ALL: [Level; 3] = [Level::Syntax, Level::Static, Level::Runtime];

    /// Reward assigned when evaluation stops at this level.
    pub fn failure_reward(self) -> f64 {
        match self {
            Level::Syntax => SYNTAX_FAILURE_REWARD,
            Level::Static => STATIC_FAILURE_REWARD,
            Level::Runtime => RUNTIME_FAILURE_REWARD,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Syntax => "level_1",
            Level::Static => "level_2",
            Level::Runtime => "level_3",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single evaluation level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelResult {
    pub passed: bool,
    pub message: String,
}

impl LevelResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Outcome of tiered evaluation for one candidate.
///
/// Only levels that actually ran are present in `levels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub levels: BTreeMap<Level, LevelResult>,
    pub passed: bool,
    pub failed_at: Option<Level>,
    pub reward: f64,
}

impl EvaluationResult {
    /// Builds a result from the levels that ran, in order.
    ///
    /// The first failing level decides the reward; no failure means a pass.
    pub fn from_levels(levels: Vec<(Level, LevelResult)>) -> Self {
        let failed_at = levels
            .iter()
            .find(|(_, result)| !result.passed)
            .map(|(level, _)| *level);
        let reward = failed_at.map_or(PASS_REWARD, Level::failure_reward);

        Self {
            levels: levels.into_iter().collect(),
            passed: failed_at.is_none(),
            failed_at,
            reward,
        }
    }

    pub fn level(&self, level: Level) -> Option<&LevelResult> {
        self.levels.get(&level)
    }

    /// Diagnostic message of the failing level, if any.
    pub fn failure_message(&self) -> Option<&str> {
        self.failed_at
            .and_then(|level| self.levels.get(&level))
            .map(|result| result.message.as_str())
    }

    /// True for a structurally valid candidate that failed at runtime, the
    /// only outcome that qualifies for repair.
    pub fn is_runtime_failure(&self) -> bool {
        self.failed_at == Some(Level::Runtime)
    }

    /// True when evaluation stopped before reaching the sandbox.
    pub fn is_early_reject(&self) -> bool {
        matches!(self.failed_at, Some(Level::Syntax | Level::Static))
    }
}
