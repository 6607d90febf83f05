//! SQL rendering for cluster tables

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ClusteringConfig, StoreConfig};
use crate::types::{number_value, Cluster};

/// Literal syntax of rendered statements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Quoted literals carry a `::type` cast
    Postgres,
    #[default]
    Sqlite,
}

/// Declared type of a target column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    #[default]
    Text,
    Json,
}

impl ColumnType {
    pub fn type_name(&self, dialect: SqlDialect) -> &'static str {
        match (dialect, self) {
            (SqlDialect::Postgres, ColumnType::Integer) => "bigint",
            (SqlDialect::Postgres, ColumnType::Real) => "double precision",
            (SqlDialect::Postgres, ColumnType::Text) => "text",
            (SqlDialect::Postgres, ColumnType::Json) => "json",
            (SqlDialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (SqlDialect::Sqlite, ColumnType::Real) => "REAL",
            (SqlDialect::Sqlite, ColumnType::Text | ColumnType::Json) => "TEXT",
        }
    }
}

/// Named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Columns present in every cluster table, in order
pub const CLUSTER_COLUMNS: [(&str, ColumnType); 8] = [
    ("cx", ColumnType::Real),
    ("cy", ColumnType::Real),
    ("minx", ColumnType::Real),
    ("miny", ColumnType::Real),
    ("maxx", ColumnType::Real),
    ("maxy", ColumnType::Real),
    ("hash_key", ColumnType::Integer),
    ("cluster_agg", ColumnType::Json),
];

/// A value bound for insertion
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Convert a field value for a column of the given type
    pub fn from_field(value: Option<&Value>, column_type: ColumnType) -> Self {
        let value = match value {
            None | Some(Value::Null) => return SqlValue::Null,
            Some(v) => v,
        };
        match column_type {
            ColumnType::Integer => value
                .as_i64()
                .or_else(|| number_value(value).map(|v| v.round() as i64))
                .map_or(SqlValue::Null, SqlValue::Integer),
            ColumnType::Real => number_value(value).map_or(SqlValue::Null, SqlValue::Real),
            ColumnType::Text => match value {
                Value::String(s) => SqlValue::Text(s.clone()),
                other => SqlValue::Text(other.to_string()),
            },
            ColumnType::Json => SqlValue::Text(value.to_string()),
        }
    }

    /// Literal text of the value
    pub fn render(&self, column_type: ColumnType, dialect: SqlDialect) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(v) => v.to_string(),
            SqlValue::Real(v) if v.is_finite() => v.to_string(),
            SqlValue::Real(_) => "NULL".to_string(),
            SqlValue::Text(s) => match dialect {
                SqlDialect::Postgres => format!(
                    "'{}'::{}",
                    escape_literal(s),
                    column_type.type_name(dialect)
                ),
                SqlDialect::Sqlite => format!("'{}'", escape_literal(s)),
            },
        }
    }
}

/// Double every single quote
pub fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Fixed columns followed by the configured identity columns
pub fn cluster_columns(store: &StoreConfig) -> Vec<ColumnSpec> {
    CLUSTER_COLUMNS
        .iter()
        .map(|(name, ty)| ColumnSpec::new(*name, *ty))
        .chain(store.identity_columns.iter().cloned())
        .collect()
}

/// Row values of a cluster, matching [`cluster_columns`]
pub fn cluster_row(cluster: &Cluster, config: &ClusteringConfig, store: &StoreConfig) -> Vec<SqlValue> {
    let [minx, miny, maxx, maxy] = cluster.glyph_bounds(config);
    let mut row = vec![
        SqlValue::Real(cluster.cx),
        SqlValue::Real(cluster.cy),
        SqlValue::Real(minx),
        SqlValue::Real(miny),
        SqlValue::Real(maxx),
        SqlValue::Real(maxy),
        SqlValue::Integer(cluster.shard),
        SqlValue::Text(cluster.aggregate.to_json_string()),
    ];
    row.extend(
        store
            .identity_columns
            .iter()
            .map(|c| SqlValue::from_field(cluster.identity.get(&c.name), c.column_type)),
    );
    row
}

pub fn render_create_table(table: &str, columns: &[ColumnSpec], dialect: SqlDialect) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.column_type.type_name(dialect)))
        .collect();
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table, defs.join(", "))
}

pub fn render_drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", table)
}

/// Multi-row `INSERT` statements of at most `batch_size` rows each
pub fn render_insert_batches(
    table: &str,
    columns: &[ColumnSpec],
    rows: &[Vec<SqlValue>],
    batch_size: usize,
    dialect: SqlDialect,
) -> Vec<String> {
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let head = format!("INSERT INTO {} ({}) VALUES ", table, names.join(", "));

    rows.chunks(batch_size.max(1))
        .map(|chunk| {
            let tuples: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let values: Vec<String> = row
                        .iter()
                        .zip(columns)
                        .map(|(value, column)| value.render(column.column_type, dialect))
                        .collect();
                    format!("({})", values.join(", "))
                })
                .collect();
            format!("{}{}", head, tuples.join(", "))
        })
        .collect()
}
