//! Structured aggregate keys
//!
//! Keys are typed in memory and only turned into `<combo>##<function>(<field>)`
//! strings at the serialization edge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator between dimension values and before the function
pub const KEY_DELIMITER: &str = "##";

/// Field name used by count keys
pub const COUNT_FIELD: &str = "*";

/// Aggregate function encoded in a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Sqrsum,
    /// Derived on read from `sum` and `count`; never stored
    Avg,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Sqrsum => "sqrsum",
            AggregateFunction::Avg => "avg",
        }
    }

    /// Whether values of this function are kept in an aggregate
    pub fn is_stored(&self) -> bool {
        !matches!(self, AggregateFunction::Avg)
    }

    /// Value that leaves the other operand unchanged
    pub fn identity(&self) -> Option<f64> {
        match self {
            AggregateFunction::Count | AggregateFunction::Sum | AggregateFunction::Sqrsum => Some(0.0),
            AggregateFunction::Min => Some(f64::INFINITY),
            AggregateFunction::Max => Some(f64::NEG_INFINITY),
            AggregateFunction::Avg => None,
        }
    }

    /// Fold two stored values
    pub fn fold(&self, a: f64, b: f64) -> Result<f64> {
        match self {
            AggregateFunction::Count | AggregateFunction::Sum | AggregateFunction::Sqrsum => Ok(a + b),
            AggregateFunction::Min => Ok(a.min(b)),
            AggregateFunction::Max => Ok(a.max(b)),
            AggregateFunction::Avg => Err(Error::key_mismatch(
                "avg values are derived from sum and count and cannot be combined",
            )),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(AggregateFunction::Count),
            "sum" => Ok(AggregateFunction::Sum),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "sqrsum" => Ok(AggregateFunction::Sqrsum),
            "avg" => Ok(AggregateFunction::Avg),
            other => Err(Error::key_mismatch(format!("unknown aggregate function '{}'", other))),
        }
    }
}

/// Aggregate key: dimension combo, function and field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateKey {
    /// Dimension values joined with the key delimiter, empty without dimensions
    pub combo: String,
    pub function: AggregateFunction,
    pub field: String,
}

impl AggregateKey {
    pub fn new(combo: impl Into<String>, function: AggregateFunction, field: impl Into<String>) -> Self {
        Self {
            combo: combo.into(),
            function,
            field: field.into(),
        }
    }

    /// `count(*)` key of a combo
    pub fn count(combo: impl Into<String>) -> Self {
        Self::new(combo, AggregateFunction::Count, COUNT_FIELD)
    }

    /// Parse `<combo>##<function>(<field>)`
    pub fn parse(s: &str) -> Result<Self> {
        let malformed = || Error::key_mismatch(format!("malformed aggregate key '{}'", s));

        let split = s.rfind(KEY_DELIMITER).ok_or_else(malformed)?;
        let combo = &s[..split];
        let call = &s[split + KEY_DELIMITER.len()..];

        let open = call.find('(').ok_or_else(malformed)?;
        let field = call[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
        let function: AggregateFunction = call[..open].parse()?;

        Ok(Self::new(combo, function, field))
    }

    /// The `sum` and `count(*)` keys an `avg` key is derived from
    pub fn avg_sources(&self) -> Option<(AggregateKey, AggregateKey)> {
        match self.function {
            AggregateFunction::Avg => Some((
                AggregateKey::new(self.combo.clone(), AggregateFunction::Sum, self.field.clone()),
                AggregateKey::count(self.combo.clone()),
            )),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}({})", self.combo, KEY_DELIMITER, self.function, self.field)
    }
}

impl FromStr for AggregateKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let key = AggregateKey::new("red##large", AggregateFunction::Sqrsum, "price");
        assert_eq!(key.to_string(), "red##large##sqrsum(price)");
        assert_eq!(AggregateKey::parse("red##large##sqrsum(price)").unwrap(), key);

        let count = AggregateKey::count("");
        assert_eq!(count.to_string(), "##count(*)");
        assert_eq!(AggregateKey::parse("##count(*)").unwrap(), count);
    }

    #[test]
    fn test_unknown_function_is_rejected() {
        let err = AggregateKey::parse("a##median(v)").unwrap_err();
        assert!(matches!(err, Error::AggregateKeyMismatch(_)));
        assert!(AggregateKey::parse("sum(v)").is_err());
        assert!(AggregateKey::parse("##sum(v").is_err());
    }

    #[test]
    fn test_avg_sources() {
        let avg = AggregateKey::new("a", AggregateFunction::Avg, "v");
        let (sum, count) = avg.avg_sources().unwrap();
        assert_eq!(sum.to_string(), "a##sum(v)");
        assert_eq!(count.to_string(), "a##count(*)");
        assert!(AggregateKey::count("a").avg_sources().is_none());
    }

    #[test]
    fn test_fold_rules() {
        assert_eq!(AggregateFunction::Sum.fold(2.0, 3.0).unwrap(), 5.0);
        assert_eq!(AggregateFunction::Min.fold(2.0, 3.0).unwrap(), 2.0);
        assert_eq!(AggregateFunction::Max.fold(2.0, 3.0).unwrap(), 3.0);
        let min_id = AggregateFunction::Min.identity().unwrap();
        assert_eq!(AggregateFunction::Min.fold(min_id, 7.0).unwrap(), 7.0);
        assert!(AggregateFunction::Avg.fold(1.0, 1.0).is_err());
    }
}
