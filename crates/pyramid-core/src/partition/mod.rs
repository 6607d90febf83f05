//! Static spatial partitioning of the input domain into shards

mod spec;
mod tree;

pub use spec::{PartitionSpec, MAX_UNIFORM_DEPTH};
pub use tree::{BoundingBox, PartitionNode, PartitionTree, Split, SplitAxis};
