//! Array-encoded partition descriptions

use serde::{Deserialize, Serialize};

use super::tree::BoundingBox;
use crate::error::{Error, Result};
use crate::types::ShardKey;

/// Deepest tree [`PartitionSpec::uniform`] builds (about a million shards)
pub const MAX_UNIFORM_DEPTH: u32 = 20;

/// Binary partition tree encoded as arrays.
///
/// Node `i` has its children at `2i + 1` and `2i + 2`. Every node with a
/// child has both, so the array length is odd. Leaf keys are listed in the
/// order of the leaves' array indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    /// Node boxes as `[minX, minY, maxX, maxY]`
    pub partitions: Vec<[f64; 4]>,
    /// Shard key of each leaf
    pub hash_keys: Vec<ShardKey>,
}

impl PartitionSpec {
    pub fn new(partitions: Vec<[f64; 4]>, hash_keys: Vec<ShardKey>) -> Self {
        Self {
            partitions,
            hash_keys,
        }
    }

    /// Index of the first leaf in `partitions`
    pub fn first_leaf(&self) -> usize {
        self.partitions.len().saturating_sub(1) / 2
    }

    pub fn leaf_count(&self) -> usize {
        self.partitions.len() - self.first_leaf()
    }

    pub fn validate(&self) -> Result<()> {
        if self.partitions.is_empty() {
            return Err(Error::config("partition tree has no nodes"));
        }
        if self.partitions.len() % 2 == 0 {
            return Err(Error::config(format!(
                "partition array must describe a full binary tree, got {} nodes",
                self.partitions.len()
            )));
        }
        if self.hash_keys.len() != self.leaf_count() {
            return Err(Error::config(format!(
                "{} hash keys for {} leaves",
                self.hash_keys.len(),
                self.leaf_count()
            )));
        }
        for (i, bounds) in self.partitions.iter().enumerate() {
            if !BoundingBox::from_array(*bounds).is_valid() {
                return Err(Error::config(format!("partition {} has a malformed box {:?}", i, bounds)));
            }
        }
        Ok(())
    }

    /// Perfect tree over `bounds`, halving along x at even depths and along
    /// y at odd depths. Leaves get consecutive keys from `first_key`.
    ///
    /// Fails with `ConfigInvalid` when `depth` exceeds [`MAX_UNIFORM_DEPTH`].
    pub fn uniform(bounds: [f64; 4], depth: u32, first_key: ShardKey) -> Result<Self> {
        if depth > MAX_UNIFORM_DEPTH {
            return Err(Error::config(format!(
                "uniform partition depth {} exceeds {}",
                depth, MAX_UNIFORM_DEPTH
            )));
        }
        let node_count = (1usize << (depth + 1)) - 1;
        let mut partitions = Vec::with_capacity(node_count);
        partitions.push(bounds);

        for i in 1..node_count {
            let parent = (i - 1) / 2;
            let [min_x, min_y, max_x, max_y] = partitions[parent];
            let is_left = i % 2 == 1;
            let parent_depth = usize::BITS - (parent + 1).leading_zeros() - 1;

            let child = if parent_depth % 2 == 0 {
                let mid = (min_x + max_x) / 2.0;
                if is_left {
                    [min_x, min_y, mid, max_y]
                } else {
                    [mid, min_y, max_x, max_y]
                }
            } else {
                let mid = (min_y + max_y) / 2.0;
                if is_left {
                    [min_x, min_y, max_x, mid]
                } else {
                    [min_x, mid, max_x, max_y]
                }
            };
            partitions.push(child);
        }

        let leaves = 1i64 << depth;
        let hash_keys = (0..leaves).map(|i| first_key + i).collect();
        Ok(Self::new(partitions, hash_keys))
    }
}
