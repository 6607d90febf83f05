//! JSON form of a cluster aggregate, as stored in the `cluster_agg` column

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::combine::{CenterMoments, ClusterAggregate};
use super::hull::Point;
use super::key::AggregateKey;
use crate::error::{Error, Result};

const COUNT: &str = "count(*)";
const HULL: &str = "convexHull";
const TOP_K: &str = "topk";
const SUM_X: &str = "sumX";
const SUM_Y: &str = "sumY";
const SUM_SQ: &str = "xysqrsum";

impl ClusterAggregate {
    /// Serialize into the stored JSON object
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(COUNT.to_string(), Value::from(self.count));
        obj.insert(
            HULL.to_string(),
            Value::Array(
                self.boundary_hull
                    .iter()
                    .map(|p| Value::Array(vec![Value::from(p.x), Value::from(p.y)]))
                    .collect(),
            ),
        );
        obj.insert(
            TOP_K.to_string(),
            Value::Array(self.top_k.iter().cloned().map(Value::Object).collect()),
        );
        obj.insert(SUM_X.to_string(), Value::from(self.center_moments.sum_x));
        obj.insert(SUM_Y.to_string(), Value::from(self.center_moments.sum_y));
        obj.insert(SUM_SQ.to_string(), Value::from(self.center_moments.sum_sq));
        for (key, value) in &self.values {
            obj.insert(key.to_string(), Value::from(*value));
        }
        Value::Object(obj)
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// Parse the stored JSON object.
    ///
    /// Every non-reserved entry must be a valid aggregate key with a stored
    /// function; anything else fails with `AggregateKeyMismatch`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::key_mismatch("cluster aggregate is not a JSON object"))?;

        let number = |name: &str| -> Result<f64> {
            match obj.get(name) {
                None => Ok(0.0),
                Some(v) => v
                    .as_f64()
                    .ok_or_else(|| Error::key_mismatch(format!("'{}' is not a number", name))),
            }
        };

        let count = obj
            .get(COUNT)
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::key_mismatch(format!("'{}' is missing or not a count", COUNT)))?;

        let boundary_hull = match obj.get(HULL) {
            None => Vec::new(),
            Some(v) => parse_ring(v)?,
        };

        let top_k = match obj.get(TOP_K) {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_object()
                        .cloned()
                        .ok_or_else(|| Error::key_mismatch("top-k entry is not an object"))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::key_mismatch("'topk' is not an array")),
        };

        let center_moments = CenterMoments {
            sum_x: number(SUM_X)?,
            sum_y: number(SUM_Y)?,
            sum_sq: number(SUM_SQ)?,
        };

        let mut values = BTreeMap::new();
        for (name, v) in obj {
            if [COUNT, HULL, TOP_K, SUM_X, SUM_Y, SUM_SQ].contains(&name.as_str()) {
                continue;
            }
            let key = AggregateKey::parse(name)?;
            if !key.function.is_stored() {
                return Err(Error::key_mismatch(format!("'{}' is derived and cannot be stored", name)));
            }
            let value = v
                .as_f64()
                .ok_or_else(|| Error::key_mismatch(format!("'{}' is not a number", name)))?;
            values.insert(key, value);
        }

        Ok(Self {
            count,
            boundary_hull,
            top_k,
            center_moments,
            values,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }
}

fn parse_ring(value: &Value) -> Result<Vec<Point>> {
    let vertices = value
        .as_array()
        .ok_or_else(|| Error::key_mismatch("'convexHull' is not an array"))?;
    vertices
        .iter()
        .map(|vertex| match vertex.as_array().map(Vec::as_slice) {
            Some([x, y]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Point::new(x, y)),
                _ => Err(Error::key_mismatch("hull vertex is not numeric")),
            },
            _ => Err(Error::key_mismatch("hull vertex is not an [x, y] pair")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateFunction;
    use crate::config::ClusteringConfig;
    use crate::types::RawRecord;
    use serde_json::json;

    #[test]
    fn test_json_shape() {
        let mut config = ClusteringConfig::new(1.0, 2.0, 2.0, 2.0);
        config.measures = vec![crate::config::MeasureSpec {
            field: "v".to_string(),
            function: AggregateFunction::Sum,
            extent: None,
        }];
        let record = RawRecord::new(3.0, 4.0).with_field("v", 2);
        let agg = ClusterAggregate::from_record(&record, 3.0, 4.0, &config).unwrap();

        let value = agg.to_json();
        assert_eq!(value["count(*)"], json!(1));
        assert_eq!(value["##sum(v)"], json!(2.0));
        assert_eq!(value["##sqrsum(v)"], json!(4.0));
        assert_eq!(value["xysqrsum"], json!(25.0));
        assert_eq!(value["convexHull"][0], json!([2.0, 3.0]));
        assert_eq!(value["topk"][0]["v"], json!(2));

        assert_eq!(ClusterAggregate::from_json_str(&agg.to_json_string()).unwrap(), agg);
    }

    #[test]
    fn test_unknown_key_fails() {
        let value = json!({ "count(*)": 1, "##median(v)": 3.0 });
        assert!(matches!(
            ClusterAggregate::from_json(&value),
            Err(Error::AggregateKeyMismatch(_))
        ));

        let value = json!({ "count(*)": 1, "##avg(v)": 3.0 });
        assert!(ClusterAggregate::from_json(&value).is_err());
    }

    #[test]
    fn test_missing_count_fails() {
        assert!(ClusterAggregate::from_json(&json!({ "topk": [] })).is_err());
    }
}
