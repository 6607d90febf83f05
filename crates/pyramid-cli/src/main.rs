//! Pyramid CLI
//!
//! Run with: cargo run -p pyramid-cli -- build --config pyramid.toml --input points.csv

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod input;

#[derive(Parser)]
#[command(name = "pyramid", version, about = "Build multi-resolution cluster pyramids")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Where the partition tree comes from
#[derive(clap::Args, Debug, Clone)]
pub struct PartitionArgs {
    /// JSON partition description ({"partitions": [...], "hash_keys": [...]})
    #[arg(long, conflicts_with = "depth")]
    pub partitions: Option<PathBuf>,

    /// Depth of a uniform partition tree (2^depth shards, at most 20)
    #[arg(long, default_value_t = 2)]
    pub depth: u32,

    /// Domain of a uniform tree as minx,miny,maxx,maxy (default: input extent)
    #[arg(long, value_delimiter = ',', num_args = 4)]
    pub bounds: Option<Vec<f64>>,
}

#[derive(Subcommand)]
enum Command {
    /// Cluster a CSV file into every pyramid level and store the result
    Build {
        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Input CSV with a header row
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        partition: PartitionArgs,

        /// Build without writing to the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the shard a point routes to
    Route {
        x: f64,
        y: f64,

        #[command(flatten)]
        partition: PartitionArgs,
    },

    /// Summarize the stored clusters of one shard at one level
    Inspect {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        level: usize,

        #[arg(short, long)]
        shard: i64,

        /// Clusters to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Write a synthetic CSV of clustered points
    Generate {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short = 'n', long, default_value_t = 100_000)]
        count: usize,

        /// Side length of the square domain
        #[arg(long, default_value_t = 10_000.0)]
        extent: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pyramid_core=info,pyramid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build {
            config,
            input,
            partition,
            dry_run,
        } => commands::build(&config, &input, &partition, dry_run),
        Command::Route { x, y, partition } => commands::route(x, y, &partition),
        Command::Inspect {
            config,
            level,
            shard,
            limit,
        } => commands::inspect(&config, level, shard, limit),
        Command::Generate {
            output,
            count,
            extent,
            seed,
        } => input::generate(&output, count, extent, seed),
    }
}
