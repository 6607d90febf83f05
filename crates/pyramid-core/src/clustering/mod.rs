//! Per-shard clustering and cross-shard boundary reconciliation

mod boundary;
mod engine;
mod index;

pub use boundary::BoundaryMerger;
pub use engine::{sort_clusters_by_z, sort_records_by_z, ShardClusterer};
pub use index::CentroidIndex;
