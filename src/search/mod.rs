//! Monte Carlo tree search over candidate repairs.
//!
//! The tree is an arena of [`Node`]s addressed by [`NodeId`]; children hold
//! indices and each node keeps its parent index for backpropagation. The
//! [`MctsController`] owns one tree per run and returns the root child with
//! the best win rate together with the run's [`RunStats`].

pub mod controller;
pub mod node;
pub mod stats;
pub mod tree;

pub use controller::{
    MctsController, SearchConfig, SearchOutcome, DEFAULT_CANDIDATES, DEFAULT_EXPLORATION_C,
    DEFAULT_RETRIEVAL_K, DEFAULT_SIMULATIONS,
};
pub use node::{Node, NodeId};
pub use stats::RunStats;
pub use tree::SearchTree;
