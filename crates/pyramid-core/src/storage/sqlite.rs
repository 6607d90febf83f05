//! SQLite cluster store

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use super::{cluster_columns, render_create_table, render_drop_table, ClusterSink, ClusterWriter, ColumnType, SqlDialect, WriteReport};
use crate::aggregate::ClusterAggregate;
use crate::config::{ClusteringConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::types::{Cluster, Fields, ShardKey};

/// SQLite-backed sink for pyramid tables
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::store(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
            "#,
        )
        .map_err(|e| Error::store(format!("Failed to set pragmas: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store(format!("Failed to open in-memory database: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create the table of one shard at one level, dropping any previous one
    pub fn create_table(&self, store: &StoreConfig, level: usize, shard: ShardKey) -> Result<String> {
        let table = store.table_name(level, shard);
        let columns = cluster_columns(store);
        self.execute(&render_drop_table(&table))?;
        self.execute(&render_create_table(&table, &columns, SqlDialect::Sqlite))?;
        Ok(table)
    }

    /// Insert clusters of one shard at one level in batches
    pub fn write_clusters(
        &self,
        store: &StoreConfig,
        config: &ClusteringConfig,
        level: usize,
        shard: ShardKey,
        clusters: &[Cluster],
    ) -> Result<WriteReport> {
        ClusterWriter::new(self, store, config).write_shard(level, shard, clusters)
    }

    /// Read back the clusters of a table in insertion order
    pub fn read_clusters(&self, store: &StoreConfig, level: usize, shard: ShardKey) -> Result<Vec<Cluster>> {
        let table = store.table_name(level, shard);
        let identity = &store.identity_columns;

        let mut columns = vec!["cx", "cy", "hash_key", "cluster_agg"];
        columns.extend(identity.iter().map(|c| c.name.as_str()));
        let sql = format!("SELECT {} FROM {} ORDER BY rowid", columns.join(", "), table);

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::store(format!("Failed to prepare query on '{}': {}", table, e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| Error::store(format!("Failed to read '{}': {}", table, e)))?;

        let mut clusters = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| Error::store(format!("Failed to read '{}': {}", table, e)))?
        {
            let cx: f64 = row.get(0).map_err(|e| Error::store(e.to_string()))?;
            let cy: f64 = row.get(1).map_err(|e| Error::store(e.to_string()))?;
            let shard: i64 = row.get(2).map_err(|e| Error::store(e.to_string()))?;
            let agg: String = row.get(3).map_err(|e| Error::store(e.to_string()))?;

            let mut fields = Fields::new();
            for (i, column) in identity.iter().enumerate() {
                let value = row.get_ref(4 + i).map_err(|e| Error::store(e.to_string()))?;
                if let Some(v) = column_value(value, column.column_type)? {
                    fields.insert(column.name.clone(), v);
                }
            }

            clusters.push(Cluster {
                cx,
                cy,
                aggregate: ClusterAggregate::from_json_str(&agg)?,
                identity: fields,
                shard,
            });
        }
        Ok(clusters)
    }

    /// Number of rows in a table
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .map_err(|e| Error::store(format!("Failed to count '{}': {}", table, e)))?;
        Ok(count as usize)
    }
}

impl ClusterSink for SqliteStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(sql)
            .map_err(|e| Error::store(e.to_string()))
    }
}

fn column_value(value: ValueRef<'_>, column_type: ColumnType) -> Result<Option<Value>> {
    Ok(match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(Value::from(v)),
        ValueRef::Real(v) => Some(Value::from(v)),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match column_type {
                ColumnType::Json => Some(serde_json::from_str(&text)?),
                _ => Some(Value::String(text.into_owned())),
            }
        }
    })
}
