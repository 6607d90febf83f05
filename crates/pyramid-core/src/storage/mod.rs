//! Output of pyramid levels to per-shard tables

mod sql;
#[cfg(feature = "storage")]
mod sqlite;

pub use sql::{
    cluster_columns, cluster_row, escape_literal, render_create_table, render_drop_table,
    render_insert_batches, ColumnSpec, ColumnType, SqlDialect, SqlValue, CLUSTER_COLUMNS,
};
#[cfg(feature = "storage")]
pub use sqlite::SqliteStore;

use crate::config::{ClusteringConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::pipeline::{Pyramid, PyramidLevel};
use crate::types::{Cluster, ShardKey};

/// Destination that executes rendered statements
pub trait ClusterSink: Send + Sync {
    /// Literal syntax the sink accepts
    fn dialect(&self) -> SqlDialect;

    /// Execute one statement atomically
    fn execute(&self, sql: &str) -> Result<()>;
}

/// Rows and statements written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub tables: usize,
    pub rows: usize,
    pub batches: usize,
}

impl WriteReport {
    fn add(&mut self, other: WriteReport) {
        self.tables += other.tables;
        self.rows += other.rows;
        self.batches += other.batches;
    }
}

/// Writes clusters to a sink in retried batches
pub struct ClusterWriter<'a, S: ClusterSink + ?Sized> {
    sink: &'a S,
    store: &'a StoreConfig,
    config: &'a ClusteringConfig,
}

impl<'a, S: ClusterSink + ?Sized> ClusterWriter<'a, S> {
    pub fn new(sink: &'a S, store: &'a StoreConfig, config: &'a ClusteringConfig) -> Self {
        Self { sink, store, config }
    }

    /// Create the table of one shard at one level and insert its clusters.
    ///
    /// Each batch is retried up to `max_retries` times. On final failure the
    /// batches before it stay committed and are reported in the error.
    pub fn write_shard(&self, level: usize, shard: ShardKey, clusters: &[Cluster]) -> Result<WriteReport> {
        let table = self.store.table_name(level, shard);
        let columns = cluster_columns(self.store);
        let dialect = self.sink.dialect();

        self.sink
            .execute(&render_create_table(&table, &columns, dialect))
            .map_err(|e| Error::store(format!("Failed to create '{}': {}", table, e)))?;

        let rows: Vec<_> = clusters
            .iter()
            .map(|c| cluster_row(c, self.config, self.store))
            .collect();
        let batches = render_insert_batches(&table, &columns, &rows, self.store.batch_size, dialect);

        for (batch, sql) in batches.iter().enumerate() {
            self.execute_with_retry(sql).map_err(|e| Error::StoreWriteFailure {
                table: table.clone(),
                batch,
                committed: batch,
                message: e.to_string(),
            })?;
        }

        tracing::debug!(
            "Wrote {} clusters to {} in {} batches",
            clusters.len(),
            table,
            batches.len()
        );

        Ok(WriteReport {
            tables: 1,
            rows: clusters.len(),
            batches: batches.len(),
        })
    }

    pub fn write_level(&self, level: &PyramidLevel) -> Result<WriteReport> {
        let mut report = WriteReport::default();
        for (shard, clusters) in &level.shards {
            report.add(self.write_shard(level.level, *shard, clusters)?);
        }
        Ok(report)
    }

    pub fn write_pyramid(&self, pyramid: &Pyramid) -> Result<WriteReport> {
        let mut report = WriteReport::default();
        for level in &pyramid.levels {
            report.add(self.write_level(level)?);
        }
        tracing::info!(
            "Stored {} clusters in {} tables ({} batches)",
            report.rows,
            report.tables,
            report.batches
        );
        Ok(report)
    }

    fn execute_with_retry(&self, sql: &str) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.sink.execute(sql) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.store.max_retries => {
                    attempt += 1;
                    tracing::warn!("Batch insert failed (attempt {}): {}", attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ClusterAggregate;
    use crate::types::RawRecord;
    use parking_lot::Mutex;

    /// Records statements and rejects the inserts listed in `fail_on`
    struct ScriptedSink {
        executed: Mutex<Vec<String>>,
        inserts: Mutex<usize>,
        fail_on: Vec<usize>,
    }

    impl ScriptedSink {
        fn new(fail_on: Vec<usize>) -> Self {
            Self {
                executed: Mutex::new(Vec::new()),
                inserts: Mutex::new(0),
                fail_on,
            }
        }
    }

    impl ClusterSink for ScriptedSink {
        fn dialect(&self) -> SqlDialect {
            SqlDialect::Postgres
        }

        fn execute(&self, sql: &str) -> Result<()> {
            if sql.starts_with("INSERT") {
                let mut inserts = self.inserts.lock();
                let attempt = *inserts;
                *inserts += 1;
                if self.fail_on.contains(&attempt) {
                    return Err(Error::store("connection reset"));
                }
            }
            self.executed.lock().push(sql.to_string());
            Ok(())
        }
    }

    fn clusters(n: usize, config: &ClusteringConfig) -> Vec<Cluster> {
        (0..n)
            .map(|i| {
                let record = RawRecord::new(i as f64, 0.0).with_field("name", format!("p'{}", i));
                Cluster {
                    cx: i as f64,
                    cy: 0.0,
                    aggregate: ClusterAggregate::from_record(&record, i as f64, 0.0, config).unwrap(),
                    identity: record.fields,
                    shard: 4,
                }
            })
            .collect()
    }

    fn store(batch_size: usize, max_retries: u32) -> StoreConfig {
        StoreConfig {
            batch_size,
            max_retries,
            identity_columns: vec![ColumnSpec::new("name", ColumnType::Text)],
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_write_shard_in_batches() {
        let config = ClusteringConfig::new(1.0, 2.0, 2.0, 2.0);
        let store = store(2, 0);
        let sink = ScriptedSink::new(Vec::new());

        let report = ClusterWriter::new(&sink, &store, &config)
            .write_shard(3, 4, &clusters(5, &config))
            .unwrap();
        assert_eq!(report, WriteReport { tables: 1, rows: 5, batches: 3 });

        let executed = sink.executed.lock();
        assert_eq!(executed.len(), 4);
        assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS pyramid_l3_s4"));
        assert!(executed[1].contains("'p''0'::text"));
        assert!(executed[1].contains("::json"));
    }

    #[test]
    fn test_retry_recovers() {
        let config = ClusteringConfig::new(1.0, 2.0, 2.0, 2.0);
        let store = store(2, 2);
        let sink = ScriptedSink::new(vec![1, 2]);

        let report = ClusterWriter::new(&sink, &store, &config)
            .write_shard(1, 4, &clusters(4, &config))
            .unwrap();
        assert_eq!(report.batches, 2);
    }

    #[test]
    fn test_failure_reports_committed_batches() {
        let config = ClusteringConfig::new(1.0, 2.0, 2.0, 2.0);
        let store = store(2, 1);
        let sink = ScriptedSink::new(vec![1, 2]);

        let err = ClusterWriter::new(&sink, &store, &config)
            .write_shard(1, 4, &clusters(6, &config))
            .unwrap_err();
        match err {
            Error::StoreWriteFailure { table, batch, committed, .. } => {
                assert_eq!(table, "pyramid_l1_s4");
                assert_eq!(batch, 1);
                assert_eq!(committed, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
