//! Cluster aggregates and the associative combinator

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::hull::{box_ring, convex_hull, downscale_ring, Point};
use super::key::{AggregateFunction, AggregateKey, KEY_DELIMITER};
use crate::config::{ClusteringConfig, ZField};
use crate::error::{Error, Result};
use crate::types::{compare_priority, dimension_string, Fields, RawRecord};

/// Running coordinate moments over raw records
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CenterMoments {
    pub sum_x: f64,
    pub sum_y: f64,
    /// Σ (x² + y²)
    pub sum_sq: f64,
}

impl CenterMoments {
    pub fn of_point(x: f64, y: f64) -> Self {
        Self {
            sum_x: x,
            sum_y: y,
            sum_sq: x * x + y * y,
        }
    }

    pub fn merged(self, other: Self) -> Self {
        Self {
            sum_x: self.sum_x + other.sum_x,
            sum_y: self.sum_y + other.sum_y,
            sum_sq: self.sum_sq + other.sum_sq,
        }
    }

    /// Mean raw coordinate of `count` records
    pub fn mean_center(&self, count: u64) -> Option<(f64, f64)> {
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some((self.sum_x / n, self.sum_y / n))
    }

    /// Mean squared distance from the mean center
    pub fn spread(&self, count: u64) -> Option<f64> {
        let (mx, my) = self.mean_center(count)?;
        Some((self.sum_sq / count as f64 - (mx * mx + my * my)).max(0.0))
    }
}

/// Aggregate carried by every cluster
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterAggregate {
    /// Contributing raw records
    pub count: u64,
    /// Closed convex ring around every contributing glyph box
    pub boundary_hull: Vec<Point>,
    /// Ranked record snapshots, at most `k`
    pub top_k: Vec<Fields>,
    pub center_moments: CenterMoments,
    /// Per-combo numeric aggregates
    pub values: BTreeMap<AggregateKey, f64>,
}

impl ClusterAggregate {
    /// The identity element of [`Combinator::combine`]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Aggregate of a single bottom-level record whose glyph is centered on `(cx, cy)`
    pub fn from_record(record: &RawRecord, cx: f64, cy: f64, config: &ClusteringConfig) -> Result<Self> {
        let combo = config
            .dimensions
            .iter()
            .map(|d| dimension_string(record.field(&d.field)))
            .collect::<Vec<_>>()
            .join(KEY_DELIMITER);

        let mut values = BTreeMap::new();
        values.insert(AggregateKey::count(combo.clone()), 1.0);

        for field in config.numeric_measures() {
            let value = record.number(field).ok_or_else(|| {
                Error::invalid_record(format!(
                    "measure '{}' is missing, not numeric or not finite at ({}, {})",
                    field, record.x, record.y
                ))
            })?;
            for function in [AggregateFunction::Sum, AggregateFunction::Min, AggregateFunction::Max] {
                values.insert(AggregateKey::new(combo.clone(), function, field), value);
            }
            values.insert(AggregateKey::new(combo.clone(), AggregateFunction::Sqrsum, field), value * value);
        }

        Ok(Self {
            count: 1,
            boundary_hull: box_ring(cx, cy, config.bbox_width, config.bbox_height),
            top_k: vec![record.snapshot(config)],
            center_moments: CenterMoments::of_point(record.x, record.y),
            values,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Read a key, deriving `avg` from `sum` and `count`
    pub fn value(&self, key: &AggregateKey) -> Option<f64> {
        match key.avg_sources() {
            Some((sum, count)) => {
                let n = *self.values.get(&count)?;
                if n == 0.0 {
                    return None;
                }
                Some(self.values.get(&sum)? / n)
            }
            None => self.values.get(key).copied(),
        }
    }

    /// Scale the hull when promoting to the next level
    pub fn downscale(&mut self, zoom_factor: f64) {
        downscale_ring(&mut self.boundary_hull, zoom_factor);
    }

    fn ensure_storable(&self) -> Result<()> {
        match self.values.keys().find(|k| !k.function.is_stored()) {
            Some(key) => Err(Error::key_mismatch(format!("'{}' cannot be stored or combined", key))),
            None => Ok(()),
        }
    }
}

/// Combines aggregates according to the top-k policy of a configuration
#[derive(Debug, Clone)]
pub struct Combinator {
    top_k: usize,
    z: Option<ZField>,
}

impl Combinator {
    pub fn new(top_k: usize, z: Option<ZField>) -> Self {
        Self { top_k, z }
    }

    pub fn from_config(config: &ClusteringConfig) -> Self {
        Self::new(config.top_k, config.z.clone())
    }

    /// Combine two aggregates into one.
    ///
    /// Counts, sums and moments add, hulls are re-hulled over both rings and
    /// top-k lists are merged, ranked and truncated. Keys present on one side
    /// only are copied through.
    pub fn combine(&self, a: ClusterAggregate, b: ClusterAggregate) -> Result<ClusterAggregate> {
        a.ensure_storable()?;
        b.ensure_storable()?;

        let mut values = a.values;
        for (key, value) in b.values {
            match values.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(mut slot) => {
                    let folded = slot.key().function.fold(*slot.get(), value)?;
                    *slot.get_mut() = folded;
                }
            }
        }

        let mut top_k = a.top_k;
        top_k.extend(b.top_k);

        Ok(ClusterAggregate {
            count: a.count + b.count,
            boundary_hull: convex_hull(a.boundary_hull.into_iter().chain(b.boundary_hull)),
            top_k: self.rank(top_k),
            center_moments: a.center_moments.merged(b.center_moments),
            values,
        })
    }

    /// Sort snapshots by the z field and keep the first `k`.
    ///
    /// Equal z values are ordered by their serialized form. Without a z field
    /// the existing order is kept.
    pub fn rank(&self, mut records: Vec<Fields>) -> Vec<Fields> {
        if let Some(z) = &self.z {
            let mut keyed: Vec<(String, Fields)> = records
                .into_iter()
                .map(|r| (serde_json::to_string(&r).unwrap_or_default(), r))
                .collect();
            keyed.sort_by(|(pa, a), (pb, b)| {
                compare_priority(a.get(&z.field), b.get(&z.field), z.order).then_with(|| pa.cmp(pb))
            });
            records = keyed.into_iter().map(|(_, r)| r).collect();
        }
        records.truncate(self.top_k);
        records
    }
}
