//! Reconciliation of clusters on both sides of a partition split

use std::cmp::Ordering;

use super::engine::compare_importance;
use crate::aggregate::Combinator;
use crate::config::ClusteringConfig;
use crate::error::Result;
use crate::partition::SplitAxis;
use crate::types::Cluster;

/// Merges near-duplicate clusters produced by adjacent shards along a split.
///
/// Clusters are scanned along the split line. The more important of two
/// clusters within `theta` absorbs the other and keeps its position,
/// identity and shard. After an absorb the survivor is checked again against
/// the previous survivor, so no two neighbours in scan order remain within
/// `theta` and a second pass changes nothing.
pub struct BoundaryMerger<'a> {
    config: &'a ClusteringConfig,
    combinator: Combinator,
}

impl<'a> BoundaryMerger<'a> {
    pub fn new(config: &'a ClusteringConfig) -> Result<Self> {
        config.validate_engine()?;
        Ok(Self {
            config,
            combinator: Combinator::from_config(config),
        })
    }

    pub fn reconcile(&self, mut clusters: Vec<Cluster>, axis: SplitAxis) -> Result<Vec<Cluster>> {
        clusters.sort_by(|a, b| scan_order(a, b, axis));

        let mut survivors: Vec<Cluster> = Vec::with_capacity(clusters.len());
        for mut incoming in clusters {
            loop {
                match survivors.pop() {
                    Some(top) if self.within_theta(&top, &incoming) => {
                        incoming = self.absorb(top, incoming)?;
                    }
                    Some(top) => {
                        survivors.push(top);
                        break;
                    }
                    None => break,
                }
            }
            survivors.push(incoming);
        }
        Ok(survivors)
    }

    fn within_theta(&self, a: &Cluster, b: &Cluster) -> bool {
        self.config.normalized_distance(a.cx, a.cy, b.cx, b.cy) <= self.config.theta
    }

    /// Merge `later` into `earlier` or the reverse, by importance.
    ///
    /// Aggregates are always combined in scan order.
    fn absorb(&self, earlier: Cluster, later: Cluster) -> Result<Cluster> {
        let later_wins = compare_importance(&later, &earlier, self.config) == Ordering::Less;
        let (mut winner, loser) = if later_wins { (later, earlier) } else { (earlier, later) };

        let kept = std::mem::take(&mut winner.aggregate);
        winner.aggregate = if later_wins {
            self.combinator.combine(loser.aggregate, kept)?
        } else {
            self.combinator.combine(kept, loser.aggregate)?
        };
        Ok(winner)
    }
}

/// Along the split line first, across it second
fn scan_order(a: &Cluster, b: &Cluster, axis: SplitAxis) -> Ordering {
    match axis {
        SplitAxis::X => a.cy.total_cmp(&b.cy).then(a.cx.total_cmp(&b.cx)),
        SplitAxis::Y => a.cx.total_cmp(&b.cx).then(a.cy.total_cmp(&b.cy)),
    }
}
