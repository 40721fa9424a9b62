//! Tiered candidate evaluation.
//!
//! Candidates pass through three checks of increasing cost:
//!
//! | Level | Check | Reward on failure |
//! |-------|-------|-------------------|
//! | `level_1` | parses as Python | 0.0 |
//! | `level_2` | defines at least one function | 0.3 |
//! | `level_3` | harness exits 0 in the sandbox | 0.7 |
//!
//! A candidate passing all three earns 1.0. Candidate defects are data,
//! never errors.

pub mod result;
pub mod syntax;
pub mod tiered;

pub use result::{
    EvaluationResult, Level, LevelResult, PASS_REWARD, RUNTIME_FAILURE_REWARD,
    STATIC_FAILURE_REWARD, SYNTAX_FAILURE_REWARD,
};
pub use syntax::{
    check_syntax, contains_function_definition, is_valid_python, FunctionInfo, IssueKind,
    PythonModule, SyntaxIssue,
};
pub use tiered::TieredEvaluator;
