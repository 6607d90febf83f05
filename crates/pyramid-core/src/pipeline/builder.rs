//! Pyramid driver: routing, per-shard clustering and boundary reconciliation

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;

use super::{Pyramid, PyramidLevel};
use crate::clustering::{sort_clusters_by_z, sort_records_by_z, BoundaryMerger, ShardClusterer};
use crate::config::{ClusteringConfig, PyramidConfig};
use crate::error::{Error, Result};
use crate::partition::{PartitionTree, Split, SplitAxis};
use crate::types::{Cluster, RawRecord, ShardKey};

/// Builds every clustered level of a pyramid.
///
/// Shards of one level are clustered in parallel on a dedicated rayon pool.
/// A level is complete once all of its split boundaries are reconciled; only
/// then does the next level start.
pub struct PyramidBuilder {
    config: ClusteringConfig,
    tree: PartitionTree,
    pool: rayon::ThreadPool,
}

impl PyramidBuilder {
    pub fn new(config: &PyramidConfig, tree: PartitionTree) -> Result<Self> {
        config.clustering.validate()?;
        if config.worker_threads == Some(0) {
            return Err(Error::config("worker_threads must be at least 1"));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.unwrap_or(0))
            .thread_name(|i| format!("pyramid-worker-{}", i))
            .build()
            .map_err(|e| Error::config(format!("Failed to create thread pool: {}", e)))?;

        Ok(Self {
            config: config.clustering.clone(),
            tree,
            pool,
        })
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn tree(&self) -> &PartitionTree {
        &self.tree
    }

    /// Bucket records by shard. Every shard gets an entry, possibly empty.
    pub fn route(&self, records: Vec<RawRecord>) -> Result<BTreeMap<ShardKey, Vec<RawRecord>>> {
        let keys: Vec<ShardKey> = self.pool.install(|| {
            records
                .par_iter()
                .map(|r| self.tree.route(r.x, r.y))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut shards: BTreeMap<ShardKey, Vec<RawRecord>> =
            self.tree.shard_keys().into_iter().map(|k| (k, Vec::new())).collect();
        for (key, record) in keys.into_iter().zip(records) {
            shards.entry(key).or_default().push(record);
        }
        Ok(shards)
    }

    pub fn build(&self, records: Vec<RawRecord>) -> Result<Pyramid> {
        self.build_with(records, |_| Ok(()))
    }

    /// Build every level, handing each finished level to `on_level` before
    /// the next one starts
    pub fn build_with<F>(&self, records: Vec<RawRecord>, mut on_level: F) -> Result<Pyramid>
    where
        F: FnMut(&PyramidLevel) -> Result<()>,
    {
        let total = records.len();
        let mut pyramid = Pyramid::default();
        if self.config.clustered_levels() == 0 {
            return Ok(pyramid);
        }

        let start = Instant::now();
        let routed = self.route(records)?;
        tracing::info!(
            "Routed {} records to {} shards in {:.2?}",
            total,
            routed.len(),
            start.elapsed()
        );

        let mut current = self.first_level(routed)?;
        loop {
            on_level(&current)?;
            let next = if current.level < self.config.clustered_levels() {
                Some(self.next_level(&current, current.level + 1)?)
            } else {
                None
            };
            pyramid.levels.push(current);
            match next {
                Some(level) => current = level,
                None => break,
            }
        }
        Ok(pyramid)
    }

    fn first_level(&self, routed: BTreeMap<ShardKey, Vec<RawRecord>>) -> Result<PyramidLevel> {
        let start = Instant::now();
        let config = &self.config;

        let shards = self.pool.install(|| {
            routed
                .into_par_iter()
                .map(|(shard, mut records)| -> Result<(ShardKey, Vec<Cluster>)> {
                    sort_records_by_z(&mut records, config);
                    let clusters = ShardClusterer::new(config, shard)?.cluster_records(&records)?;
                    Ok((shard, clusters))
                })
                .collect::<Result<BTreeMap<_, _>>>()
        })?;

        self.finish_level(1, shards, start)
    }

    fn next_level(&self, previous: &PyramidLevel, level: usize) -> Result<PyramidLevel> {
        let start = Instant::now();
        let config = &self.config;

        let shards = self.pool.install(|| {
            previous
                .shards
                .par_iter()
                .map(|(shard, clusters)| -> Result<(ShardKey, Vec<Cluster>)> {
                    let mut input = clusters.clone();
                    sort_clusters_by_z(&mut input, config);
                    let clusters = ShardClusterer::new(config, *shard)?.cluster_level(input)?;
                    Ok((*shard, clusters))
                })
                .collect::<Result<BTreeMap<_, _>>>()
        })?;

        self.finish_level(level, shards, start)
    }

    fn finish_level(
        &self,
        level: usize,
        mut shards: BTreeMap<ShardKey, Vec<Cluster>>,
        start: Instant,
    ) -> Result<PyramidLevel> {
        let clustered: usize = shards.values().map(Vec::len).sum();
        self.reconcile_boundaries(level, &mut shards)?;

        let level = PyramidLevel { level, shards };
        tracing::info!(
            "Level {}: {} clusters ({} before boundary merge), {} records, {:.2?}",
            level.level,
            level.cluster_count(),
            clustered,
            level.total_count(),
            start.elapsed()
        );
        Ok(level)
    }

    /// Merge clusters across every split, deepest splits first. Splits of
    /// equal depth cover disjoint shards and run in parallel.
    fn reconcile_boundaries(&self, level: usize, shards: &mut BTreeMap<ShardKey, Vec<Cluster>>) -> Result<()> {
        let merger = BoundaryMerger::new(&self.config)?;
        let scale = self.config.zoom_factor.powi(level as i32);
        let splits = self.tree.splits();

        for group in splits.chunk_by(|a, b| a.depth == b.depth) {
            let bands: Vec<(&Split, Vec<Cluster>)> = group
                .iter()
                .map(|split| (split, self.extract_band(split, scale, shards)))
                .collect();

            let survivors = self.pool.install(|| {
                bands
                    .into_par_iter()
                    .map(|(split, band)| -> Result<Vec<Cluster>> {
                        let before = band.len();
                        let survivors = merger.reconcile(band, split.axis)?;
                        tracing::debug!(
                            "Level {} split {} ({:?} at {}): {} -> {} clusters",
                            level,
                            split.node,
                            split.axis,
                            split.position,
                            before,
                            survivors.len()
                        );
                        Ok(survivors)
                    })
                    .collect::<Result<Vec<_>>>()
            })?;

            for cluster in survivors.into_iter().flatten() {
                shards.entry(cluster.shard).or_default().push(cluster);
            }
        }
        Ok(())
    }

    /// Remove and return the clusters near a split line
    fn extract_band(&self, split: &Split, scale: f64, shards: &mut BTreeMap<ShardKey, Vec<Cluster>>) -> Vec<Cluster> {
        let line = split.position / scale;
        let reach = match split.axis {
            SplitAxis::X => self.config.theta * self.config.bbox_width,
            SplitAxis::Y => self.config.theta * self.config.bbox_height,
        };
        let near_line = |c: &Cluster| {
            let coord = match split.axis {
                SplitAxis::X => c.cx,
                SplitAxis::Y => c.cy,
            };
            (coord - line).abs() <= reach
        };

        let mut band = Vec::new();
        for key in split.shards() {
            if let Some(clusters) = shards.get_mut(&key) {
                let (near, far): (Vec<Cluster>, Vec<Cluster>) = std::mem::take(clusters)
                    .into_iter()
                    .partition(|c| near_line(c));
                *clusters = far;
                band.extend(near);
            }
        }
        band
    }
}
