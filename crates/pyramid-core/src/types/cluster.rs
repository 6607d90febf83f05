//! Clusters produced by the clustering engine and boundary merger

use serde_json::Value;

use super::record::{Fields, ShardKey};
use crate::aggregate::ClusterAggregate;
use crate::config::ClusteringConfig;

/// A cluster at one pyramid level
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Centroid x in level coordinates
    pub cx: f64,
    /// Centroid y in level coordinates
    pub cy: f64,
    pub aggregate: ClusterAggregate,
    /// Fields of the seed record, carried through unchanged
    pub identity: Fields,
    /// Shard that owns this cluster
    pub shard: ShardKey,
}

impl Cluster {
    /// Number of raw records represented
    pub fn count(&self) -> u64 {
        self.aggregate.count
    }

    /// Value of the configured z field on the seed record
    pub fn z_value(&self, config: &ClusteringConfig) -> Option<&Value> {
        config.z.as_ref().and_then(|z| self.identity.get(&z.field))
    }

    /// Glyph box around the centroid as `[minx, miny, maxx, maxy]`
    pub fn glyph_bounds(&self, config: &ClusteringConfig) -> [f64; 4] {
        let (hw, hh) = (config.bbox_width / 2.0, config.bbox_height / 2.0);
        [self.cx - hw, self.cy - hh, self.cx + hw, self.cy + hh]
    }
}
