//! Arena-backed search tree with UCB selection and backpropagation.

use crate::error::SearchError;
use crate::evaluator::EvaluationResult;
use crate::search::node::{Node, NodeId};

/// Owns every node of one search run.
///
/// Nodes are appended and never removed, so a `NodeId` handed out by
/// [`SearchTree::add_child`] stays valid for the lifetime of the tree.
#[derive(Debug, Clone)]
pub struct SearchTree {
    nodes: Vec<Node>,
}

impl SearchTree {
    pub fn new(root_code: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node::root(root_code.into())],
        }
    }

    pub fn root(&self) -> &Node {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, SearchError> {
        self.nodes
            .get(id.index())
            .ok_or(SearchError::UnknownNode(id.index()))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, SearchError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(SearchError::UnknownNode(id.index()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index), node))
    }

    /// Appends an evaluated candidate under `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        code: String,
        evaluation: EvaluationResult,
    ) -> Result<NodeId, SearchError> {
        self.get(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::child(parent, code, evaluation));
        self.get_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Upper confidence bound of `id` with exploration constant `c`.
    ///
    /// Unvisited nodes score infinity. The root, having no parent, uses its
    /// own visit count.
    pub fn ucb(&self, id: NodeId, c: f64) -> Result<f64, SearchError> {
        let node = self.get(id)?;
        if node.visits == 0 {
            return Ok(f64::INFINITY);
        }

        let parent_visits = match node.parent {
            Some(parent) => self.get(parent)?.visits,
            None => node.visits,
        };
        let visits = f64::from(node.visits);
        let exploitation = node.wins / visits;
        let exploration = c * (f64::from(parent_visits.max(1)).ln() / visits).sqrt();
        Ok(exploitation + exploration)
    }

    /// Descends from the root to a leaf, taking the highest-UCB child at each
    /// level. Ties go to the earliest child.
    pub fn select(&self, c: f64) -> Result<NodeId, SearchError> {
        let mut current = NodeId::ROOT;
        loop {
            let node = self.get(current)?;
            if node.is_leaf() {
                return Ok(current);
            }

            let mut best: Option<(NodeId, f64)> = None;
            for &child in &node.children {
                let score = self.ucb(child, c)?;
                if best.map_or(true, |(_, top)| score > top) {
                    best = Some((child, score));
                }
            }

            match best {
                Some((child, _)) => current = child,
                None => return Ok(current),
            }
        }
    }

    /// Adds one visit and `reward` to `id` and every ancestor up to the root.
    pub fn backpropagate(&mut self, id: NodeId, reward: f64) -> Result<(), SearchError> {
        if !(0.0..=1.0).contains(&reward) {
            return Err(SearchError::InvariantViolated(format!(
                "reward {reward} outside [0, 1]"
            )));
        }

        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.get_mut(node_id)?;
            node.visits += 1;
            node.wins += reward;
            current = node.parent;
        }
        Ok(())
    }

    /// Root child with the highest win rate. Unvisited children rank below
    /// any visited one; ties go to the earliest child.
    pub fn best_child(&self) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for &child in &self.root().children {
            let score = self
                .nodes
                .get(child.index())
                .and_then(Node::win_rate)
                .unwrap_or(-1.0);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((child, score));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Checks `0 <= wins <= visits` for every node.
    pub fn check_invariants(&self) -> Result<(), SearchError> {
        for (id, node) in self.iter() {
            if node.wins < 0.0 || node.wins > f64::from(node.visits) + f64::EPSILON {
                return Err(SearchError::InvariantViolated(format!(
                    "node {id} has wins {} with {} visits",
                    node.wins, node.visits
                )));
            }
        }
        Ok(())
    }
}
