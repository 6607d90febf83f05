//! Level-by-level pyramid construction

mod builder;

pub use builder::PyramidBuilder;

use std::collections::BTreeMap;

use crate::types::{Cluster, ShardKey};

/// Clusters of every shard at one zoom level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PyramidLevel {
    /// Level number; level 0 is the raw data, so built levels start at 1
    pub level: usize,
    pub shards: BTreeMap<ShardKey, Vec<Cluster>>,
}

impl PyramidLevel {
    pub fn new(level: usize) -> Self {
        Self {
            level,
            shards: BTreeMap::new(),
        }
    }

    /// Raw records represented by the level
    pub fn total_count(&self) -> u64 {
        self.clusters().map(Cluster::count).sum()
    }

    pub fn cluster_count(&self) -> usize {
        self.shards.values().map(Vec::len).sum()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.shards.values().flatten()
    }
}

/// Every clustered level, finest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pyramid {
    pub levels: Vec<PyramidLevel>,
}

impl Pyramid {
    pub fn level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.iter().find(|l| l.level == level)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
