//! pyramid-core: multi-resolution spatial cluster pyramids
//!
//! Points are routed to shards by a static partition tree, clustered per
//! shard and level with a greedy single-pass engine, and reconciled across
//! shard boundaries. Every cluster carries an aggregate (counts, per-combo
//! measures, a convex footprint, top-k records) that combines associatively,
//! so each level is built from the one below it without touching raw data.

pub mod aggregate;
pub mod clustering;
pub mod config;
pub mod error;
pub mod partition;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use aggregate::{AggregateFunction, AggregateKey, ClusterAggregate, Combinator};
pub use clustering::{BoundaryMerger, ShardClusterer};
pub use config::{ClusteringConfig, PyramidConfig, StoreConfig};
pub use error::{Error, Result};
pub use partition::{PartitionSpec, PartitionTree, SplitAxis};
pub use pipeline::{Pyramid, PyramidBuilder, PyramidLevel};
pub use storage::{ClusterSink, ClusterWriter};
#[cfg(feature = "storage")]
pub use storage::SqliteStore;
pub use types::{Cluster, RawRecord, ShardKey};
