//! Decision tree nodes and integer traversal

use serde::{Deserialize, Serialize};

/// A tree node. Internal nodes carry a feature index, threshold and child
/// indices; leaves carry `leaf` and use -1 for the other fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    pub id: i32,
    pub left: i32,
    pub right: i32,
    #[serde(rename = "feature_idx", alias = "feature")]
    pub feature_idx: i32,
    /// Fixed-point split threshold; `x <= threshold` goes left
    pub threshold: i64,
    /// Fixed-point leaf value
    pub leaf: Option<i64>,
}

impl Node {
    pub fn internal(id: i32, feature_idx: i32, threshold: i64, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    pub fn leaf(id: i32, value: i64) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx < 0 || self.leaf.is_some()
    }
}

/// One boosting round: node 0 is the root, `weight` is the fixed-point
/// shrinkage applied to its leaf values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub weight: i64,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: i64) -> Self {
        Self { nodes, weight }
    }

    /// Walk from the root to a leaf. Malformed structure yields 0.
    pub fn evaluate(&self, features: &[i64]) -> i64 {
        let mut idx = 0usize;
        // A well-formed tree never revisits a node, so the walk is bounded
        // by the node count.
        for _ in 0..=self.nodes.len() {
            let Some(node) = self.nodes.get(idx) else {
                return 0;
            };
            if node.is_leaf() {
                return node.leaf.unwrap_or(0);
            }
            let Some(&value) = features.get(node.feature_idx as usize) else {
                return 0;
            };
            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            if next < 0 {
                return 0;
            }
            idx = next as usize;
        }
        0
    }

    /// Longest root-to-leaf path, counted in edges
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize, budget: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() && budget > 0 => {
                    let left = walk(nodes, node.left.max(0) as usize, budget - 1);
                    let right = walk(nodes, node.right.max(0) as usize, budget - 1);
                    1 + left.max(right)
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0, self.nodes.len())
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = self.nodes.len() as i32;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if node.leaf.is_none() {
                    return Err(format!("leaf node {i} has no value"));
                }
                continue;
            }
            if !(0..len).contains(&node.left) {
                return Err(format!("node {i} has invalid left child {}", node.left));
            }
            if !(0..len).contains(&node.right) {
                return Err(format!("node {i} has invalid right child {}", node.right));
            }
            if node.left as usize <= i || node.right as usize <= i {
                return Err(format!("node {i} points backwards"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(
            vec![
                Node::internal(0, 0, 50, 1, 2),
                Node::leaf(1, 100),
                Node::leaf(2, 200),
            ],
            1_000_000,
        )
    }

    #[test]
    fn test_threshold_is_inclusive_left() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[30]), 100);
        assert_eq!(tree.evaluate(&[50]), 100);
        assert_eq!(tree.evaluate(&[51]), 200);
    }

    #[test]
    fn test_missing_feature_evaluates_to_zero() {
        assert_eq!(stump().evaluate(&[]), 0);
    }

    #[test]
    fn test_depth_and_leaves() {
        let tree = Tree::new(
            vec![
                Node::internal(0, 0, 50, 1, 2),
                Node::internal(1, 1, 10, 3, 4),
                Node::leaf(2, 7),
                Node::leaf(3, 1),
                Node::leaf(4, 2),
            ],
            1_000_000,
        );
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(stump().depth(), 1);
    }

    #[test]
    fn test_validation() {
        assert!(stump().validate().is_ok());
        let cyclic = Tree::new(vec![Node::internal(0, 0, 1, 0, 0)], 1);
        assert!(cyclic.validate().is_err());
        let dangling = Tree::new(vec![Node::internal(0, 0, 1, 1, 5), Node::leaf(1, 0)], 1);
        assert!(dangling.validate().is_err());
    }
}
