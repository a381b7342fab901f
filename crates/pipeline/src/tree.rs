//! Arena-backed aspect tree.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]. A node's
//! parent link is only used for lookups; the tree owns every node.

use crate::evidence::EvidenceStore;
use crate::types::SynthesizedAnswer;
use frag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::{Index, IndexMut};

/// Dense index of a node within its tree.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Expanded,
    Retrieved,
    Synthesized,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Expanded => "expanded",
            NodeStatus::Retrieved => "retrieved",
            NodeStatus::Synthesized => "synthesized",
            NodeStatus::Failed => "failed",
        }
    }
}

/// One aspect of the question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectNode {
    pub id: NodeId,

    pub question: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,

    pub children: Vec<NodeId>,

    /// Root is depth 0
    pub depth: u32,

    pub status: NodeStatus,

    #[serde(default)]
    pub evidence: EvidenceStore,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SynthesizedAnswer>,
}

impl AspectNode {
    fn new(id: NodeId, question: String, parent: Option<NodeId>, depth: u32) -> Self {
        Self {
            id,
            question,
            parent,
            children: Vec::new(),
            depth,
            status: NodeStatus::Pending,
            evidence: EvidenceStore::new(id, 0),
            answer: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Tree of aspects rooted at the user's question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectTree {
    nodes: Vec<AspectNode>,
    pub max_depth: u32,
    pub max_branching: u32,
    pub max_nodes: u32,
}

impl AspectTree {
    /// Create a tree holding only the root question.
    pub fn new(question: impl Into<String>, max_depth: u32, max_branching: u32, max_nodes: u32) -> Self {
        Self {
            nodes: vec![AspectNode::new(NodeId::ROOT, question.into(), None, 0)],
            max_depth,
            max_branching,
            max_nodes,
        }
    }

    pub fn root(&self) -> &AspectNode {
        &self.nodes[NodeId::ROOT.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&AspectNode> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut AspectNode> {
        self.nodes.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in insertion (breadth-first) order.
    pub fn nodes(&self) -> impl Iterator<Item = &AspectNode> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Whether another node may be added at all.
    pub fn has_capacity(&self) -> bool {
        self.nodes.len() < self.max_nodes as usize
    }

    /// Append a pending child under `parent`.
    ///
    /// Fails if the child would break the depth, branching or node limits.
    pub fn add_child(&mut self, parent: NodeId, question: impl Into<String>) -> AppResult<NodeId> {
        let (depth, fanout) = match self.get(parent) {
            Some(node) => (node.depth + 1, node.children.len()),
            None => {
                return Err(AppError::TreeInvariant(format!(
                    "parent {} does not exist",
                    parent
                )))
            }
        };

        if depth > self.max_depth {
            return Err(AppError::TreeInvariant(format!(
                "child of {} would exceed max depth {}",
                parent, self.max_depth
            )));
        }
        if fanout >= self.max_branching as usize {
            return Err(AppError::TreeInvariant(format!(
                "node {} already has {} children",
                parent, fanout
            )));
        }
        if !self.has_capacity() {
            return Err(AppError::TreeInvariant(format!(
                "tree is at its cap of {} nodes",
                self.max_nodes
            )));
        }

        let id = NodeId(self.nodes.len());
        self.nodes
            .push(AspectNode::new(id, question.into(), Some(parent), depth));
        self[parent].children.push(id);
        Ok(id)
    }

    /// Ancestors of `id`, root first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.get(parent).and_then(|n| n.parent);
        }
        chain.reverse();
        chain
    }

    /// Questions from the root down to and including `id`.
    pub fn path_questions(&self, id: NodeId) -> Vec<&str> {
        let mut path: Vec<&str> = self
            .ancestors(id)
            .into_iter()
            .map(|a| self[a].question.as_str())
            .collect();
        if let Some(node) = self.get(id) {
            path.push(node.question.as_str());
        }
        path
    }

    /// Every node in the subtree rooted at `id`, `id` first.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.get(current) {
                out.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Children before parents, siblings in order.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(NodeId::ROOT, false)];

        while let Some((id, visited)) = stack.pop() {
            if visited {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            for child in self[id].children.iter().rev() {
                stack.push((*child, false));
            }
        }

        out
    }

    /// Every root-to-leaf question path.
    pub fn leaf_paths(&self) -> Vec<Vec<String>> {
        self.subtree(NodeId::ROOT)
            .into_iter()
            .filter(|id| self[*id].is_leaf())
            .map(|id| {
                self.path_questions(id)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    /// Indented outline of the tree, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for id in self.subtree(NodeId::ROOT) {
            let node = &self[id];
            out.push_str(&"  ".repeat(node.depth as usize));
            if !node.is_root() {
                out.push_str("- ");
            }
            out.push_str(&node.question);
            if node.status == NodeStatus::Failed {
                out.push_str(" [failed]");
            }
            out.push('\n');
        }
        out
    }

    /// Check the structural invariants of the tree.
    pub fn validate(&self) -> AppResult<()> {
        let violation = |msg: String| Err(AppError::TreeInvariant(msg));

        if self.nodes.is_empty() {
            return violation("tree has no root".to_string());
        }
        if self.nodes.len() > self.max_nodes as usize {
            return violation(format!(
                "{} nodes exceed the cap of {}",
                self.nodes.len(),
                self.max_nodes
            ));
        }

        let root = self.root();
        if root.parent.is_some() || root.depth != 0 {
            return violation("root must have no parent and depth 0".to_string());
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if node.id.index() != index {
                return violation(format!("node at {} carries id {}", index, node.id));
            }
            if node.depth > self.max_depth {
                return violation(format!("node {} exceeds max depth", node.id));
            }
            if node.children.len() > self.max_branching as usize {
                return violation(format!("node {} exceeds max branching", node.id));
            }

            let unique: HashSet<_> = node.children.iter().collect();
            if unique.len() != node.children.len() {
                return violation(format!("node {} lists a child twice", node.id));
            }

            for child in &node.children {
                match self.get(*child) {
                    Some(c) if c.parent == Some(node.id) && c.depth == node.depth + 1 => {}
                    _ => return violation(format!("child {} of {} is inconsistent", child, node.id)),
                }
            }

            if let Some(parent) = node.parent {
                // Parents are always inserted first, which rules out cycles.
                if parent.index() >= index {
                    return violation(format!("node {} precedes its parent", node.id));
                }
                if !self[parent].children.contains(&node.id) {
                    return violation(format!("node {} is missing from its parent", node.id));
                }
            } else if index != NodeId::ROOT.index() {
                return violation(format!("node {} has no parent", node.id));
            }

            if node.evidence.items().iter().any(|e| e.id.node != node.id) {
                return violation(format!("node {} holds foreign evidence", node.id));
            }
        }

        Ok(())
    }
}

impl Index<NodeId> for AspectTree {
    type Output = AspectNode;

    fn index(&self, id: NodeId) -> &AspectNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for AspectTree {
    fn index_mut(&mut self, id: NodeId) -> &mut AspectNode {
        &mut self.nodes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> AspectTree {
        let mut tree = AspectTree::new("What causes tides?", 2, 2, 7);
        let moon = tree.add_child(NodeId::ROOT, "Role of the moon").unwrap();
        let sun = tree.add_child(NodeId::ROOT, "Role of the sun").unwrap();
        tree.add_child(moon, "Lunar gravity").unwrap();
        tree.add_child(sun, "Solar gravity").unwrap();
        tree
    }

    #[test]
    fn test_add_child_sets_depth_and_parent() {
        let tree = sample_tree();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree[NodeId(3)].depth, 2);
        assert_eq!(tree[NodeId(3)].parent, Some(NodeId(1)));
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_add_child_enforces_limits() {
        let mut tree = sample_tree();
        // depth
        assert!(tree.add_child(NodeId(3), "too deep").is_err());
        // branching
        assert!(tree.add_child(NodeId::ROOT, "third").is_err());
        // cap
        tree.add_child(NodeId(1), "second lunar").unwrap();
        tree.add_child(NodeId(2), "second solar").unwrap();
        assert_eq!(tree.len(), 7);
        assert!(!tree.has_capacity());
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_post_order_children_first() {
        let tree = sample_tree();
        let order = tree.post_order();
        assert_eq!(order, vec![NodeId(3), NodeId(1), NodeId(4), NodeId(2), NodeId(0)]);
    }

    #[test]
    fn test_ancestors_and_paths() {
        let tree = sample_tree();
        assert_eq!(tree.ancestors(NodeId(4)), vec![NodeId(0), NodeId(2)]);
        assert_eq!(
            tree.path_questions(NodeId(4)),
            vec!["What causes tides?", "Role of the sun", "Solar gravity"]
        );
        assert_eq!(tree.leaf_paths().len(), 2);
    }

    #[test]
    fn test_render_outline() {
        let mut tree = sample_tree();
        tree[NodeId(4)].status = NodeStatus::Failed;
        let rendered = tree.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "What causes tides?");
        assert_eq!(lines[1], "  - Role of the moon");
        assert_eq!(lines[2], "    - Lunar gravity");
        assert_eq!(lines[4], "    - Solar gravity [failed]");
    }

    #[test]
    fn test_validate_detects_corruption() {
        let mut tree = sample_tree();
        tree[NodeId(3)].depth = 1;
        assert!(matches!(tree.validate(), Err(AppError::TreeInvariant(_))));
    }

    #[test]
    fn test_serializes_with_dense_ids() {
        let tree = sample_tree();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["nodes"][1]["parent"], 0);
        assert_eq!(json["nodes"][0]["children"], serde_json::json!([1, 2]));
    }
}
