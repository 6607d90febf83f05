//! Cluster aggregates: keys, hulls, the combinator and the stored JSON form

mod codec;
mod combine;
mod hull;
mod key;

pub use combine::{CenterMoments, ClusterAggregate, Combinator};
pub use hull::{box_ring, convex_hull, is_convex_ring, ring_contains, Point};
pub use key::{AggregateFunction, AggregateKey, COUNT_FIELD, KEY_DELIMITER};
