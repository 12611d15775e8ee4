//! Command-line world baker: partitions a RON scene and writes the baked tree.

mod bake;

use std::path::PathBuf;

use clap::Parser;
use nebula_config::{CliArgs, Config};
use tracing::{error, info};

fn main() {
    let args = CliArgs::parse();
    let config_dir = args
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_dir.display());
            std::process::exit(1);
        }
    };
    config.apply_cli_overrides(&args);

    nebula_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );

    match bake::run(&config) {
        Ok(report) => {
            let stats = report.stats;
            info!(
                "Baked {} meshes into {} nodes, {} leaves ({} empty), depth {}, {} batches",
                report.meshes,
                stats.nodes,
                stats.leaves,
                stats.empty_leaves,
                stats.max_depth,
                stats.batches
            );
            if let Some(leaves) = report.pvs_leaves {
                info!("Visibility computed for {leaves} leaves");
            }
        }
        Err(e) => {
            error!("Bake failed: {e}");
            std::process::exit(1);
        }
    }
}
