//! Subcommand implementations

use anyhow::{bail, Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;

use pyramid_core::aggregate::AggregateKey;
use pyramid_core::{
    ClusterWriter, PartitionSpec, PartitionTree, PyramidBuilder, PyramidConfig, RawRecord, SqliteStore,
};

use crate::input::read_csv;
use crate::PartitionArgs;

/// Partition tree from a JSON description, or a uniform tree over the given
/// bounds (falling back to the extent of `records`)
fn load_tree(args: &PartitionArgs, records: &[RawRecord]) -> Result<PartitionTree> {
    let spec = match &args.partitions {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<PartitionSpec>(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => {
            let bounds = match args.bounds.as_deref() {
                Some([min_x, min_y, max_x, max_y]) => [*min_x, *min_y, *max_x, *max_y],
                Some(other) => bail!("--bounds takes 4 values, got {}", other.len()),
                None => extent(records).context("--bounds is required without input records")?,
            };
            PartitionSpec::uniform(bounds, args.depth, 0)?
        }
    };
    Ok(PartitionTree::from_spec(&spec)?)
}

fn extent(records: &[RawRecord]) -> Option<[f64; 4]> {
    let first = records.first()?;
    Some(records.iter().fold([first.x, first.y, first.x, first.y], |[a, b, c, d], r| {
        [a.min(r.x), b.min(r.y), c.max(r.x), d.max(r.y)]
    }))
}

pub fn build(config_path: &Path, input: &Path, partition: &PartitionArgs, dry_run: bool) -> Result<()> {
    let start = Instant::now();
    let config = PyramidConfig::from_path(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let records = read_csv(input, &config.clustering)?;
    tracing::info!("Read {} records from {}", records.len(), input.display());

    let tree = load_tree(partition, &records)?;
    let builder = PyramidBuilder::new(&config, tree)?;

    let store = if dry_run {
        None
    } else {
        Some(SqliteStore::new(&config.store.path)?)
    };

    let levels = config.clustering.clustered_levels() as u64;
    let pb = ProgressBar::new(levels);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} levels {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );

    let mut stored_rows = 0;
    let pyramid = builder.build_with(records, |level| {
        if let Some(store) = &store {
            // Rebuilds replace earlier tables
            for shard in level.shards.keys() {
                store.create_table(&config.store, level.level, *shard)?;
            }
            let writer = ClusterWriter::new(store, &config.store, &config.clustering);
            stored_rows += writer.write_level(level)?.rows;
        }
        pb.inc(1);
        pb.set_message(format!("level {}: {} clusters", level.level, level.cluster_count()));
        Ok(())
    })?;
    pb.finish_with_message("done");

    println!("\n{}", style("Pyramid").bold().cyan());
    for level in &pyramid.levels {
        println!(
            "  level {:>2}  {:>10} clusters  {:>4} shards",
            level.level,
            level.cluster_count(),
            level.shards.len()
        );
    }
    if store.is_some() {
        println!(
            "\n{} {} rows in {}",
            style("Stored").green(),
            stored_rows,
            config.store.path.display()
        );
    }
    println!("{} {:.2?}", style("Elapsed").dim(), start.elapsed());
    Ok(())
}

pub fn route(x: f64, y: f64, partition: &PartitionArgs) -> Result<()> {
    if partition.partitions.is_none() && partition.bounds.is_none() {
        bail!("route needs --partitions or --bounds");
    }
    let tree = load_tree(partition, &[])?;
    let shard = tree.route(x, y)?;
    println!("{}", shard);
    Ok(())
}

pub fn inspect(config_path: &Path, level: usize, shard: i64, limit: usize) -> Result<()> {
    let config = PyramidConfig::from_path(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let store = SqliteStore::new(&config.store.path)?;
    let clusters = store.read_clusters(&config.store, level, shard)?;

    let total: u64 = clusters.iter().map(|c| c.count()).sum();
    println!(
        "{} {}: {} clusters, {} records",
        style("Table").bold(),
        config.store.table_name(level, shard),
        clusters.len(),
        total
    );

    let measures: Vec<AggregateKey> = config
        .clustering
        .measures
        .iter()
        .filter(|m| m.field != "*")
        .map(|m| AggregateKey::new("", m.function, m.field.clone()))
        .collect();

    for cluster in clusters.iter().take(limit) {
        let mut line = format!(
            "  ({:>10.3}, {:>10.3})  count {:>8}",
            cluster.cx,
            cluster.cy,
            cluster.count()
        );
        // Without dimensions every measure lives under the empty combo
        if config.clustering.dimensions.is_empty() {
            for key in &measures {
                if let Some(v) = cluster.aggregate.value(key) {
                    line.push_str(&format!("  {}({}) {:.3}", key.function, key.field, v));
                }
            }
        }
        if let Some((mx, my)) = cluster.aggregate.center_moments.mean_center(cluster.count()) {
            line.push_str(&format!("  mean ({:.3}, {:.3})", mx, my));
        }
        println!("{}", line);
    }

    let counts: Vec<AggregateKey> = config
        .clustering
        .dimension_combos()
        .into_iter()
        .map(AggregateKey::count)
        .collect();
    if !config.clustering.dimensions.is_empty() {
        println!("\n{}", style("Per combo").bold());
        for key in counts {
            let n: f64 = clusters.iter().filter_map(|c| c.aggregate.value(&key)).sum();
            println!("  {:<24} {:>10}", key.combo, n);
        }
    }
    Ok(())
}
