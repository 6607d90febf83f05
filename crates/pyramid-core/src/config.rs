//! Configuration for pyramid construction

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::aggregate::{AggregateFunction, KEY_DELIMITER};
use crate::error::{Error, Result};
use crate::storage::{ColumnSpec, SqlDialect};

/// Main pyramid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyramidConfig {
    /// Clustering parameters
    pub clustering: ClusteringConfig,
    /// Output store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Number of rayon workers (default: CPU count)
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl PyramidConfig {
    /// Create a configuration with default store settings
    pub fn new(clustering: ClusteringConfig) -> Self {
        Self {
            clustering,
            store: StoreConfig::default(),
            worker_threads: None,
        }
    }

    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::config(format!("Failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml` or `.json` file and validate it
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let config: Self = serde_json::from_str(&text)
                    .map_err(|e| Error::config(format!("Failed to parse JSON config: {}", e)))?;
                config.validate()?;
                Ok(config)
            }
            _ => Self::from_toml_str(&text),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.clustering.validate()?;
        self.store.validate()?;
        if self.worker_threads == Some(0) {
            return Err(Error::config("worker_threads must be at least 1"));
        }
        Ok(())
    }
}

/// Ordering direction of the z field
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Field that ranks records for top-k selection and merge importance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZField {
    /// Field name
    pub field: String,
    /// Ranking direction; the first record in this order has the highest priority
    #[serde(default)]
    pub order: SortOrder,
}

impl ZField {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Group-by dimension with its enumerated domain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionSpec {
    pub field: String,
    #[serde(default)]
    pub domain: Vec<String>,
}

/// Numeric measure aggregated per dimension combo
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeasureSpec {
    /// Field name (`*` for plain counts)
    pub field: String,
    /// Function the consumer reads back (`avg` is derived from sum and count)
    pub function: AggregateFunction,
    /// Optional numeric extent `[lo, hi]`
    #[serde(default)]
    pub extent: Option<[f64; 2]>,
}

/// Clustering parameters shared by every shard and level
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusteringConfig {
    /// Merge threshold as a fraction of the glyph box
    pub theta: f64,
    /// Downscale applied to coordinates when promoting to the next level
    pub zoom_factor: f64,
    /// Width of one rendered cluster glyph
    pub bbox_width: f64,
    /// Height of one rendered cluster glyph
    pub bbox_height: f64,
    /// Records retained per cluster for detail display (default: 1)
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Name of the x coordinate column (default: "x")
    #[serde(default = "default_x_field")]
    pub x_field: String,
    /// Name of the y coordinate column (default: "y")
    #[serde(default = "default_y_field")]
    pub y_field: String,
    /// Group-by dimensions
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
    /// Aggregated measures
    #[serde(default)]
    pub measures: Vec<MeasureSpec>,
    /// Ranking field, absent for `none`
    #[serde(default)]
    pub z: Option<ZField>,
    /// Zoom levels including the raw level (default: 15)
    #[serde(default = "default_num_levels")]
    pub num_levels: usize,
}

fn default_top_k() -> usize { 1 }
fn default_x_field() -> String { "x".to_string() }
fn default_y_field() -> String { "y".to_string() }
fn default_num_levels() -> usize { 15 }

impl ClusteringConfig {
    /// Create a configuration with no dimensions, measures or z field
    pub fn new(theta: f64, zoom_factor: f64, bbox_width: f64, bbox_height: f64) -> Self {
        Self {
            theta,
            zoom_factor,
            bbox_width,
            bbox_height,
            top_k: default_top_k(),
            x_field: default_x_field(),
            y_field: default_y_field(),
            dimensions: Vec::new(),
            measures: Vec::new(),
            z: None,
            num_levels: default_num_levels(),
        }
    }

    /// Full validation, run before any pyramid is built
    pub fn validate(&self) -> Result<()> {
        self.validate_engine()?;
        if self.zoom_factor <= 1.0 {
            return Err(Error::config(format!(
                "zoom_factor must be greater than 1, got {}",
                self.zoom_factor
            )));
        }
        if self.num_levels == 0 {
            return Err(Error::config("num_levels must be at least 1"));
        }
        Ok(())
    }

    /// Validation of the parameters a single clustering pass depends on.
    ///
    /// Accepts `zoom_factor == 1` so one pass can run without scaling.
    pub fn validate_engine(&self) -> Result<()> {
        if !self.theta.is_finite() || self.theta <= 0.0 {
            return Err(Error::config(format!("theta must be positive, got {}", self.theta)));
        }
        if !self.zoom_factor.is_finite() || self.zoom_factor < 1.0 {
            return Err(Error::config(format!(
                "zoom_factor must be at least 1, got {}",
                self.zoom_factor
            )));
        }
        for (name, value) in [("bbox_width", self.bbox_width), ("bbox_height", self.bbox_height)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::config(format!("{} must be positive, got {}", name, value)));
            }
        }
        if self.top_k == 0 {
            return Err(Error::config("top_k must be at least 1"));
        }
        if self.x_field.is_empty() || self.y_field.is_empty() || self.x_field == self.y_field {
            return Err(Error::config("x_field and y_field must be distinct, non-empty names"));
        }

        let mut seen = HashSet::new();
        for dim in &self.dimensions {
            if dim.field.is_empty() {
                return Err(Error::config("dimension field name is empty"));
            }
            if !seen.insert(dim.field.as_str()) {
                return Err(Error::config(format!("duplicate dimension '{}'", dim.field)));
            }
            if dim.domain.iter().any(|v| v.contains(KEY_DELIMITER)) {
                return Err(Error::config(format!(
                    "domain of '{}' contains the key delimiter '{}'",
                    dim.field, KEY_DELIMITER
                )));
            }
        }

        for measure in &self.measures {
            if measure.field.is_empty() {
                return Err(Error::config("measure field name is empty"));
            }
            if measure.field == "*" && measure.function != AggregateFunction::Count {
                return Err(Error::config(format!(
                    "measure '*' only supports count, got {}",
                    measure.function
                )));
            }
            if let Some([lo, hi]) = measure.extent {
                if !(lo <= hi) {
                    return Err(Error::config(format!(
                        "extent of '{}' is inverted: [{}, {}]",
                        measure.field, lo, hi
                    )));
                }
            }
        }

        if let Some(z) = &self.z {
            if z.field.is_empty() {
                return Err(Error::config("z field name is empty"));
            }
        }
        Ok(())
    }

    /// Radius that encloses every centroid within `theta` in Chebyshev terms
    pub fn search_radius(&self) -> f64 {
        self.bbox_width.max(self.bbox_height) * self.theta * std::f64::consts::SQRT_2
    }

    /// Chebyshev distance normalized by the glyph box
    pub fn normalized_distance(&self, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
        ((ax - bx).abs() / self.bbox_width).max((ay - by).abs() / self.bbox_height)
    }

    /// Measure fields that carry numeric values (`*` excluded)
    pub fn numeric_measures(&self) -> impl Iterator<Item = &str> {
        let mut seen = HashSet::new();
        self.measures
            .iter()
            .map(|m| m.field.as_str())
            .filter(move |f| *f != "*" && seen.insert(*f))
    }

    /// Number of clustering passes above the raw level
    pub fn clustered_levels(&self) -> usize {
        self.num_levels.saturating_sub(1)
    }

    /// Cartesian product of the dimension domains as combo strings
    pub fn dimension_combos(&self) -> Vec<String> {
        let mut combos = vec![String::new()];
        for (i, dim) in self.dimensions.iter().enumerate() {
            combos = combos
                .iter()
                .flat_map(|prefix| {
                    dim.domain.iter().map(move |value| {
                        if i == 0 {
                            value.clone()
                        } else {
                            format!("{}{}{}", prefix, KEY_DELIMITER, value)
                        }
                    })
                })
                .collect();
        }
        combos
    }
}

/// Output store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database path
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Prefix of per-level, per-shard target tables
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    /// Rows per insert statement (default: 300000)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries per rejected batch (default: 2)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Literal syntax of rendered statements
    #[serde(default)]
    pub dialect: SqlDialect,
    /// Identity fields copied from each cluster's seed record
    #[serde(default)]
    pub identity_columns: Vec<ColumnSpec>,
}

fn default_store_path() -> PathBuf { PathBuf::from("pyramid.db") }
fn default_table_prefix() -> String { "pyramid".to_string() }
fn default_batch_size() -> usize { 300_000 }
fn default_max_retries() -> u32 { 2 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            table_prefix: default_table_prefix(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            dialect: SqlDialect::default(),
            identity_columns: Vec::new(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        let valid_ident = |s: &str| {
            !s.is_empty()
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !s.starts_with(|c: char| c.is_ascii_digit())
        };
        if !valid_ident(&self.table_prefix) {
            return Err(Error::config(format!("invalid table prefix '{}'", self.table_prefix)));
        }
        for column in &self.identity_columns {
            if !valid_ident(&column.name) {
                return Err(Error::config(format!("invalid column name '{}'", column.name)));
            }
        }
        Ok(())
    }

    /// Target table of one shard at one level
    pub fn table_name(&self, level: usize, shard: i64) -> String {
        if shard < 0 {
            format!("{}_l{}_sn{}", self.table_prefix, level, shard.unsigned_abs())
        } else {
            format!("{}_l{}_s{}", self.table_prefix, level, shard)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_with_defaults() {
        let config = PyramidConfig::from_toml_str(
            r#"
            [clustering]
            theta = 1.0
            zoom_factor = 2.0
            bbox_width = 32
            bbox_height = 24

            [clustering.z]
            field = "population"
            order = "desc"

            [[clustering.measures]]
            field = "population"
            function = "avg"
            "#,
        )
        .unwrap();

        assert_eq!(config.clustering.top_k, 1);
        assert_eq!(config.clustering.num_levels, 15);
        assert_eq!(config.clustering.x_field, "x");
        assert_eq!(config.clustering.z.as_ref().unwrap().order, SortOrder::Desc);
        assert_eq!(config.store.batch_size, 300_000);
        assert_eq!(config.store.dialect, SqlDialect::Sqlite);
    }

    #[test]
    fn test_validation_rejects_bad_parameters() {
        let mut config = ClusteringConfig::new(0.0, 2.0, 10.0, 10.0);
        assert!(matches!(config.validate(), Err(Error::ConfigInvalid(_))));

        config.theta = 1.0;
        config.zoom_factor = 1.0;
        assert!(config.validate().is_err());
        assert!(config.validate_engine().is_ok());

        config.zoom_factor = 2.0;
        config.bbox_height = -1.0;
        assert!(config.validate().is_err());

        config.bbox_height = 10.0;
        config.measures.push(MeasureSpec {
            field: "*".to_string(),
            function: AggregateFunction::Sum,
            extent: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_theta_fails_fast() {
        let result = PyramidConfig::from_toml_str(
            r#"
            [clustering]
            zoom_factor = 2.0
            bbox_width = 10
            bbox_height = 10
            "#,
        );
        assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_dimension_combos() {
        let mut config = ClusteringConfig::new(1.0, 2.0, 10.0, 10.0);
        assert_eq!(config.dimension_combos(), vec![String::new()]);

        config.dimensions = vec![
            DimensionSpec {
                field: "kind".to_string(),
                domain: vec!["a".to_string(), "b".to_string()],
            },
            DimensionSpec {
                field: "size".to_string(),
                domain: vec!["s".to_string(), "l".to_string()],
            },
        ];
        assert_eq!(config.dimension_combos(), vec!["a##s", "a##l", "b##s", "b##l"]);
    }

    #[test]
    fn test_normalized_distance_and_radius() {
        let config = ClusteringConfig::new(0.5, 2.0, 10.0, 20.0);
        assert_eq!(config.normalized_distance(0.0, 0.0, 5.0, 5.0), 0.5);
        assert_eq!(config.normalized_distance(0.0, 0.0, 1.0, 15.0), 0.75);
        assert!((config.search_radius() - 20.0 * 0.5 * 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_table_names() {
        let store = StoreConfig::default();
        assert_eq!(store.table_name(3, 7), "pyramid_l3_s7");
        assert_eq!(store.table_name(1, -4), "pyramid_l1_sn4");
    }
}
