//! Greedy single-pass clustering of one shard at one level

use std::cmp::Ordering;

use super::index::CentroidIndex;
use crate::aggregate::{ClusterAggregate, Combinator};
use crate::config::ClusteringConfig;
use crate::error::Result;
use crate::types::{compare_priority, Cluster, Fields, RawRecord, ShardKey};

/// Slack on the search radius so centroids exactly on the Chebyshev
/// corner survive the Euclidean prefilter
const RADIUS_SLACK: f64 = 1.0 + 1e-9;

/// Clusters the input of one shard into the next pyramid level.
///
/// Each call owns a fresh [`CentroidIndex`]. Input is visited once in the
/// given order; an item merges into the closest existing cluster within
/// `theta` (normalized Chebyshev) or seeds a new one. Centroids never move.
pub struct ShardClusterer<'a> {
    config: &'a ClusteringConfig,
    combinator: Combinator,
    shard: ShardKey,
}

impl<'a> ShardClusterer<'a> {
    pub fn new(config: &'a ClusteringConfig, shard: ShardKey) -> Result<Self> {
        config.validate_engine()?;
        Ok(Self {
            config,
            combinator: Combinator::from_config(config),
            shard,
        })
    }

    pub fn shard(&self) -> ShardKey {
        self.shard
    }

    /// Cluster raw records into the first clustered level
    pub fn cluster_records(&self, records: &[RawRecord]) -> Result<Vec<Cluster>> {
        let zoom = self.config.zoom_factor;
        let mut pass = Pass::new(self);

        for record in records {
            let (x, y) = (record.x / zoom, record.y / zoom);
            let aggregate = ClusterAggregate::from_record(record, x, y, self.config)?;
            pass.absorb_or_seed(x, y, aggregate, || record.fields.clone())?;
        }
        Ok(pass.finish())
    }

    /// Cluster the clusters of one level into the next
    pub fn cluster_level(&self, clusters: Vec<Cluster>) -> Result<Vec<Cluster>> {
        let zoom = self.config.zoom_factor;
        let mut pass = Pass::new(self);

        for cluster in clusters {
            let (x, y) = (cluster.cx / zoom, cluster.cy / zoom);
            let mut aggregate = cluster.aggregate;
            aggregate.downscale(zoom);
            let identity = cluster.identity;
            pass.absorb_or_seed(x, y, aggregate, move || identity)?;
        }
        Ok(pass.finish())
    }
}

struct Pass<'c, 'a> {
    engine: &'c ShardClusterer<'a>,
    index: CentroidIndex,
    clusters: Vec<Cluster>,
    radius: f64,
}

impl<'c, 'a> Pass<'c, 'a> {
    fn new(engine: &'c ShardClusterer<'a>) -> Self {
        Self {
            engine,
            index: CentroidIndex::new(),
            clusters: Vec::new(),
            radius: engine.config.search_radius() * RADIUS_SLACK,
        }
    }

    fn absorb_or_seed<F>(&mut self, x: f64, y: f64, aggregate: ClusterAggregate, identity: F) -> Result<()>
    where
        F: FnOnce() -> Fields,
    {
        match self.closest(x, y) {
            Some(id) => {
                let target = &mut self.clusters[id];
                let existing = std::mem::take(&mut target.aggregate);
                target.aggregate = self.engine.combinator.combine(existing, aggregate)?;
            }
            None => {
                let id = self.clusters.len();
                self.index.insert(x, y, id);
                self.clusters.push(Cluster {
                    cx: x,
                    cy: y,
                    aggregate,
                    identity: identity(),
                    shard: self.engine.shard,
                });
            }
        }
        Ok(())
    }

    /// Closest cluster within `theta`, by normalized Chebyshev distance,
    /// then Euclidean distance, then seed order
    fn closest(&self, x: f64, y: f64) -> Option<usize> {
        let config = self.engine.config;
        self.index
            .within(x, y, self.radius)
            .into_iter()
            .map(|id| {
                let c = &self.clusters[id];
                let chebyshev = config.normalized_distance(x, y, c.cx, c.cy);
                let euclidean = (c.cx - x).powi(2) + (c.cy - y).powi(2);
                (chebyshev, euclidean, id)
            })
            .filter(|(chebyshev, _, _)| *chebyshev <= config.theta)
            .min_by(|a, b| {
                a.0.total_cmp(&b.0)
                    .then(a.1.total_cmp(&b.1))
                    .then(a.2.cmp(&b.2))
            })
            .map(|(_, _, id)| id)
    }

    fn finish(self) -> Vec<Cluster> {
        self.clusters
    }
}

/// Stable sort by the z field, highest priority first, missing values last
pub fn sort_records_by_z(records: &mut [RawRecord], config: &ClusteringConfig) {
    if let Some(z) = &config.z {
        records.sort_by(|a, b| compare_priority(a.field(&z.field), b.field(&z.field), z.order));
    }
}

/// Stable sort of clusters by the z value of their seed record
pub fn sort_clusters_by_z(clusters: &mut [Cluster], config: &ClusteringConfig) {
    if let Some(z) = &config.z {
        clusters.sort_by(|a, b| {
            compare_priority(a.identity.get(&z.field), b.identity.get(&z.field), z.order)
        });
    }
}

/// Order two clusters by merge importance: z priority, then larger count
pub(crate) fn compare_importance(a: &Cluster, b: &Cluster, config: &ClusteringConfig) -> Ordering {
    let by_z = match &config.z {
        Some(z) => compare_priority(a.identity.get(&z.field), b.identity.get(&z.field), z.order),
        None => Ordering::Equal,
    };
    by_z.then_with(|| b.count().cmp(&a.count()))
}
