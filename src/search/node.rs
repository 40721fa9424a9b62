//! Search tree nodes.

use serde::Serialize;

use crate::evaluator::EvaluationResult;

/// Index of a node in its [`SearchTree`](crate::search::SearchTree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The root is always the first node in the arena.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One candidate program in the search tree.
///
/// `parent` is a plain index used only to walk back up during
/// backpropagation; the arena owns every node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    code: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) visits: u32,
    pub(crate) wins: f64,
    pub(crate) evaluation: Option<EvaluationResult>,
}

impl Node {
    pub(crate) fn root(code: String) -> Self {
        Self {
            code,
            parent: None,
            children: Vec::new(),
            visits: 0,
            wins: 0.0,
            evaluation: None,
        }
    }

    /// A freshly expanded child counts as visited once, scored by its own
    /// evaluation.
    pub(crate) fn child(parent: NodeId, code: String, evaluation: EvaluationResult) -> Self {
        Self {
            code,
            parent: Some(parent),
            children: Vec::new(),
            visits: 1,
            wins: evaluation.reward,
            evaluation: Some(evaluation),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn visits(&self) -> u32 {
        self.visits
    }

    pub fn wins(&self) -> f64 {
        self.wins
    }

    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Empirical win rate, or `None` for an unvisited node.
    pub fn win_rate(&self) -> Option<f64> {
        (self.visits > 0).then(|| self.wins / f64::from(self.visits))
    }
}
