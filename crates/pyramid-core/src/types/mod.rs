//! Core data types

mod cluster;
mod record;

pub use cluster::Cluster;
pub use record::{compare_priority, dimension_string, number_value, Fields, RawRecord, ShardKey};
