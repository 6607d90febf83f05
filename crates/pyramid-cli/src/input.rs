//! CSV input and synthetic data

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde_json::Value;
use std::path::Path;

use pyramid_core::{ClusteringConfig, RawRecord};

/// Read every row of a CSV file as a record.
///
/// Coordinates come from the configured x and y columns. Other cells become
/// integers, floats or strings, whichever parses first; empty cells are
/// skipped.
pub fn read_csv(path: &Path, config: &ClusteringConfig) -> Result<Vec<RawRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("{} has no '{}' column", path.display(), name))
    };
    let x_col = column(&config.x_field)?;
    let y_col = column(&config.y_field)?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Malformed CSV row {}", line + 2))?;
        let coord = |i: usize| -> Result<f64> {
            let cell = row.get(i).unwrap_or_default().trim();
            cell.parse::<f64>()
                .with_context(|| format!("Row {}: '{}' is not a coordinate", line + 2, cell))
        };

        let mut record = RawRecord::new(coord(x_col)?, coord(y_col)?);
        for (i, (name, cell)) in headers.iter().zip(row.iter()).enumerate() {
            if i == x_col || i == y_col || cell.is_empty() {
                continue;
            }
            record.fields.insert(name.to_string(), parse_cell(cell));
        }
        records.push(record);
    }
    Ok(records)
}

fn parse_cell(cell: &str) -> Value {
    if let Ok(v) = cell.parse::<i64>() {
        return Value::from(v);
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Value::from(v),
        _ => Value::String(cell.to_string()),
    }
}

/// Write `count` points around gaussian hot spots to a CSV file
pub fn generate(output: &Path, count: usize, extent: f64, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let spread = Normal::new(0.0, extent / 25.0).context("Invalid extent")?;
    let centers: Vec<(f64, f64)> = (0..12)
        .map(|_| (rng.gen_range(0.1..0.9) * extent, rng.gen_range(0.1..0.9) * extent))
        .collect();
    let kinds = ["park", "school", "station"];

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["id", "x", "y", "kind", "value", "rank"])?;

    for id in 0..count {
        let (cx, cy) = centers[id % centers.len()];
        let x = (cx + spread.sample(&mut rng)).clamp(0.0, extent);
        let y = (cy + spread.sample(&mut rng)).clamp(0.0, extent);
        writer.write_record([
            id.to_string(),
            format!("{:.3}", x),
            format!("{:.3}", y),
            kinds[rng.gen_range(0..kinds.len())].to_string(),
            rng.gen_range(0..1_000).to_string(),
            rng.gen_range(0..100).to_string(),
        ])?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} points to {}", count, output.display());
    Ok(())
}
