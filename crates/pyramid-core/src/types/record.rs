//! Raw input records and field value helpers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::config::{ClusteringConfig, SortOrder};

/// Named field values of a row
pub type Fields = serde_json::Map<String, Value>;

/// Hash key identifying a shard
pub type ShardKey = i64;

/// One input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub x: f64,
    pub y: f64,
    /// Dimension, measure, z and pass-through values
    #[serde(default)]
    pub fields: Fields,
}

impl RawRecord {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            fields: Fields::new(),
        }
    }

    /// Add a field value
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric value of a field, parsing numeric strings
    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(number_value)
    }

    /// Value of the configured z field
    pub fn z_value(&self, config: &ClusteringConfig) -> Option<&Value> {
        config.z.as_ref().and_then(|z| self.fields.get(&z.field))
    }

    /// Copy of the row kept in a cluster's top-k list
    pub fn snapshot(&self, config: &ClusteringConfig) -> Fields {
        let mut snapshot = self.fields.clone();
        snapshot.insert(config.x_field.clone(), Value::from(self.x));
        snapshot.insert(config.y_field.clone(), Value::from(self.y));
        snapshot
    }
}

/// Interpret a field value as a finite number.
///
/// `NaN` and infinities are rejected: they have no JSON form, so an aggregate
/// holding one could not be stored and read back.
pub fn number_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

/// Render a field value as a dimension combo component
pub fn dimension_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "null".to_string(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
enum RankKey<'a> {
    Number(f64),
    Text(&'a str),
}

impl<'a> RankKey<'a> {
    fn of(value: Option<&'a Value>) -> Option<Self> {
        match value? {
            Value::Number(n) => n.as_f64().map(RankKey::Number),
            Value::Bool(b) => Some(RankKey::Number(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => Some(RankKey::Text(s)),
            _ => None,
        }
    }

    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RankKey::Number(a), RankKey::Number(b)) => a.total_cmp(b),
            (RankKey::Text(a), RankKey::Text(b)) => a.cmp(b),
            (RankKey::Number(_), RankKey::Text(_)) => Ordering::Less,
            (RankKey::Text(_), RankKey::Number(_)) => Ordering::Greater,
        }
    }
}

/// Compare two z values so that the higher-priority one sorts first.
///
/// Numbers sort before strings; missing or null values always sort last.
pub fn compare_priority(a: Option<&Value>, b: Option<&Value>, order: SortOrder) -> Ordering {
    match (RankKey::of(a), RankKey::of(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match order {
            SortOrder::Asc => a.cmp(&b),
            SortOrder::Desc => b.cmp(&a),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_value() {
        assert_eq!(number_value(&json!(3)), Some(3.0));
        assert_eq!(number_value(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(number_value(&json!("abc")), None);
        assert_eq!(number_value(&json!(null)), None);
        assert_eq!(number_value(&json!("NaN")), None);
        assert_eq!(number_value(&json!("inf")), None);
        assert_eq!(number_value(&json!("-Infinity")), None);
    }

    #[test]
    fn test_dimension_string() {
        assert_eq!(dimension_string(Some(&json!("red"))), "red");
        assert_eq!(dimension_string(Some(&json!(4))), "4");
        assert_eq!(dimension_string(None), "null");
    }

    #[test]
    fn test_compare_priority() {
        let (a, b) = (json!(1), json!(5));
        assert_eq!(compare_priority(Some(&a), Some(&b), SortOrder::Asc), Ordering::Less);
        assert_eq!(compare_priority(Some(&a), Some(&b), SortOrder::Desc), Ordering::Greater);
        // Missing values rank last in both directions
        assert_eq!(compare_priority(None, Some(&b), SortOrder::Asc), Ordering::Greater);
        assert_eq!(compare_priority(None, Some(&b), SortOrder::Desc), Ordering::Greater);
        assert_eq!(compare_priority(Some(&json!("b")), Some(&json!("a")), SortOrder::Asc), Ordering::Greater);
    }

    #[test]
    fn test_snapshot_includes_coordinates() {
        let config = ClusteringConfig::new(1.0, 2.0, 10.0, 10.0);
        let record = RawRecord::new(1.5, -2.0).with_field("name", "a");
        let snapshot = record.snapshot(&config);
        assert_eq!(snapshot["x"], json!(1.5));
        assert_eq!(snapshot["y"], json!(-2.0));
        assert_eq!(snapshot["name"], json!("a"));
    }
}
