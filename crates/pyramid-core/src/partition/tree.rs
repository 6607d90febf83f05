//! Read-only partition tree and point routing

use serde::{Deserialize, Serialize};

use super::spec::PartitionSpec;
use crate::error::{Error, Result};
use crate::types::ShardKey;

/// Inclusive axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_array([min_x, min_y, max_x, max_y]: [f64; 4]) -> Self {
        Self::new(min_x, min_y, max_x, max_y)
    }

    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Whether the point lies inside or on the edge
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Orientation of a split line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitAxis {
    /// Vertical line `x = position`
    X,
    /// Horizontal line `y = position`
    Y,
}

/// Split line of one internal node
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// Array index of the internal node
    pub node: usize,
    /// Depth of the node (root = 0)
    pub depth: usize,
    pub axis: SplitAxis,
    /// Coordinate of the line in level-0 units
    pub position: f64,
    /// Shards under the left child
    pub left: Vec<ShardKey>,
    /// Shards under the right child
    pub right: Vec<ShardKey>,
}

impl Split {
    /// Every shard under the split node
    pub fn shards(&self) -> impl Iterator<Item = ShardKey> + '_ {
        self.left.iter().chain(self.right.iter()).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    Internal { left: usize, right: usize },
    Leaf(ShardKey),
}

/// One node of the partition tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionNode {
    pub bounds: BoundingBox,
    kind: NodeKind,
}

impl PartitionNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn shard(&self) -> Option<ShardKey> {
        match self.kind {
            NodeKind::Leaf(key) => Some(key),
            NodeKind::Internal { .. } => None,
        }
    }

    pub fn children(&self) -> Option<(usize, usize)> {
        match self.kind {
            NodeKind::Internal { left, right } => Some((left, right)),
            NodeKind::Leaf(_) => None,
        }
    }
}

/// Static binary spatial partition mapping coordinates to shards
#[derive(Debug, Clone)]
pub struct PartitionTree {
    nodes: Vec<PartitionNode>,
}

impl PartitionTree {
    /// Build from an array description, failing with `ConfigInvalid` on a
    /// malformed one
    pub fn from_spec(spec: &PartitionSpec) -> Result<Self> {
        spec.validate()?;
        let first_leaf = spec.first_leaf();

        let nodes = spec
            .partitions
            .iter()
            .enumerate()
            .map(|(i, bounds)| PartitionNode {
                bounds: BoundingBox::from_array(*bounds),
                kind: if i < first_leaf {
                    NodeKind::Internal {
                        left: 2 * i + 1,
                        right: 2 * i + 2,
                    }
                } else {
                    NodeKind::Leaf(spec.hash_keys[i - first_leaf])
                },
            })
            .collect();

        let tree = Self { nodes };
        for (i, node) in tree.nodes.iter().enumerate() {
            if node.children().is_some() {
                tree.split_line(i)?;
            }
        }
        Ok(tree)
    }

    pub fn nodes(&self) -> &[PartitionNode] {
        &self.nodes
    }

    /// Bounds of the root node
    pub fn bounds(&self) -> BoundingBox {
        self.nodes[0].bounds
    }

    /// Shard keys in leaf order
    pub fn shard_keys(&self) -> Vec<ShardKey> {
        self.nodes.iter().filter_map(PartitionNode::shard).collect()
    }

    pub fn shard_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Shard containing `(x, y)`.
    ///
    /// Descends from the root into the first child (left, then right) whose
    /// box contains the point. Fails with `PointOutOfRange` when the root or
    /// both children of a visited node miss it.
    pub fn route(&self, x: f64, y: f64) -> Result<ShardKey> {
        let out_of_range = || Error::PointOutOfRange { x, y };

        let mut node = &self.nodes[0];
        if !node.bounds.contains(x, y) {
            return Err(out_of_range());
        }

        loop {
            match node.kind {
                NodeKind::Leaf(key) => return Ok(key),
                NodeKind::Internal { left, right } => {
                    node = [left, right]
                        .into_iter()
                        .map(|i| &self.nodes[i])
                        .find(|child| child.bounds.contains(x, y))
                        .ok_or_else(out_of_range)?;
                }
            }
        }
    }

    /// Split lines of all internal nodes, deepest first
    pub fn splits(&self) -> Vec<Split> {
        let mut splits: Vec<Split> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| {
                let (left, right) = node.children()?;
                let (axis, position) = self.split_line(i).ok()?;
                Some(Split {
                    node: i,
                    depth: node_depth(i),
                    axis,
                    position,
                    left: self.leaves_under(left),
                    right: self.leaves_under(right),
                })
            })
            .collect();
        splits.sort_by(|a, b| b.depth.cmp(&a.depth).then(a.node.cmp(&b.node)));
        splits
    }

    fn split_line(&self, i: usize) -> Result<(SplitAxis, f64)> {
        let node = &self.nodes[i];
        let (l, r) = node.children().ok_or_else(|| Error::config(format!("node {} is a leaf", i)))?;
        let (a, b) = (self.nodes[l].bounds, self.nodes[r].bounds);

        if a.max_x <= b.min_x || b.max_x <= a.min_x {
            let line = if a.max_x <= b.min_x {
                (a.max_x + b.min_x) / 2.0
            } else {
                (b.max_x + a.min_x) / 2.0
            };
            Ok((SplitAxis::X, line))
        } else if a.max_y <= b.min_y || b.max_y <= a.min_y {
            let line = if a.max_y <= b.min_y {
                (a.max_y + b.min_y) / 2.0
            } else {
                (b.max_y + a.min_y) / 2.0
            };
            Ok((SplitAxis::Y, line))
        } else {
            Err(Error::config(format!("children of partition {} overlap", i)))
        }
    }

    fn leaves_under(&self, root: usize) -> Vec<ShardKey> {
        let mut keys = Vec::new();
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            match self.nodes[i].kind {
                NodeKind::Leaf(key) => keys.push(key),
                NodeKind::Internal { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        keys
    }
}

fn node_depth(i: usize) -> usize {
    ((usize::BITS - (i + 1).leading_zeros()) - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Root split at x = 50; the left half is split again at y = 50.
    fn three_leaves() -> PartitionTree {
        let spec = PartitionSpec::new(
            vec![
                [0.0, 0.0, 100.0, 100.0],
                [0.0, 0.0, 50.0, 100.0],
                [50.0, 0.0, 100.0, 100.0],
                [0.0, 0.0, 50.0, 50.0],
                [0.0, 50.0, 50.0, 100.0],
            ],
            vec![7, 8, 9],
        );
        PartitionTree::from_spec(&spec).unwrap()
    }

    #[test]
    fn test_route_three_leaves() {
        let tree = three_leaves();
        assert_eq!(tree.shard_keys(), vec![7, 8, 9]);
        assert_eq!(tree.route(75.0, 20.0).unwrap(), 7);
        assert_eq!(tree.route(10.0, 10.0).unwrap(), 8);
        assert_eq!(tree.route(10.0, 90.0).unwrap(), 9);
    }

    #[test]
    fn test_route_out_of_range() {
        let tree = three_leaves();
        let err = tree.route(150.0, 10.0).unwrap_err();
        assert!(matches!(err, Error::PointOutOfRange { x, y } if x == 150.0 && y == 10.0));
        assert!(tree.route(-0.1, 0.0).is_err());
    }

    #[test]
    fn test_route_into_gap_between_children() {
        let spec = PartitionSpec::new(
            vec![
                [0.0, 0.0, 100.0, 100.0],
                [0.0, 0.0, 40.0, 100.0],
                [60.0, 0.0, 100.0, 100.0],
            ],
            vec![1, 2],
        );
        let tree = PartitionTree::from_spec(&spec).unwrap();

        // Inside the root but in neither child
        let err = tree.route(50.0, 50.0).unwrap_err();
        assert!(matches!(err, Error::PointOutOfRange { x, y } if x == 50.0 && y == 50.0));
        assert_eq!(tree.route(40.0, 50.0).unwrap(), 1);
        assert_eq!(tree.route(60.0, 50.0).unwrap(), 2);

        let splits = tree.splits();
        assert_eq!(splits[0].axis, SplitAxis::X);
        assert_eq!(splits[0].position, 50.0);
    }

    #[test]
    fn test_shared_edge_goes_left() {
        let tree = three_leaves();
        assert_eq!(tree.route(50.0, 50.0).unwrap(), 8);
        assert_eq!(tree.route(100.0, 100.0).unwrap(), 7);
    }

    #[test]
    fn test_splits_deepest_first() {
        let splits = three_leaves().splits();
        assert_eq!(splits.len(), 2);

        assert_eq!(splits[0].node, 1);
        assert_eq!(splits[0].depth, 1);
        assert_eq!(splits[0].axis, SplitAxis::Y);
        assert_eq!(splits[0].position, 50.0);
        assert_eq!(splits[0].left, vec![8]);
        assert_eq!(splits[0].right, vec![9]);

        assert_eq!(splits[1].node, 0);
        assert_eq!(splits[1].axis, SplitAxis::X);
        assert_eq!(splits[1].position, 50.0);
        assert_eq!(splits[1].left, vec![8, 9]);
        assert_eq!(splits[1].right, vec![7]);
    }

    #[test]
    fn test_overlapping_children_rejected() {
        let spec = PartitionSpec::new(
            vec![[0.0, 0.0, 10.0, 10.0], [0.0, 0.0, 6.0, 6.0], [4.0, 4.0, 10.0, 10.0]],
            vec![1, 2],
        );
        assert!(matches!(PartitionTree::from_spec(&spec), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_uniform_tree_routes_every_quadrant() {
        let tree = PartitionTree::from_spec(&PartitionSpec::uniform([0.0, 0.0, 100.0, 100.0], 2, 0).unwrap()).unwrap();
        assert_eq!(tree.shard_count(), 4);
        assert_eq!(tree.route(10.0, 10.0).unwrap(), 0);
        assert_eq!(tree.route(10.0, 90.0).unwrap(), 1);
        assert_eq!(tree.route(90.0, 10.0).unwrap(), 2);
        assert_eq!(tree.route(90.0, 90.0).unwrap(), 3);
        assert_eq!(tree.splits().len(), 3);
    }
}
