//! Command-line argument parsing for the world baker.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use nebula_partition::{Axis, PartitionMode};

use crate::Config;

/// Subdivision mode as spelled on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    None,
    Quad,
    Oct,
}

/// Quadtree up axis as spelled on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AxisArg {
    X,
    Y,
    Z,
}

impl From<ModeArg> for PartitionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::None => PartitionMode::None,
            ModeArg::Quad => PartitionMode::Quad,
            ModeArg::Oct => PartitionMode::Oct,
        }
    }
}

impl From<AxisArg> for Axis {
    fn from(axis: AxisArg) -> Self {
        match axis {
            AxisArg::X => Axis::X,
            AxisArg::Y => Axis::Y,
            AxisArg::Z => Axis::Z,
        }
    }
}

/// World baker command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nebula-bake", about = "Partition a static world and bake its render batches")]
pub struct CliArgs {
    /// Scene file to bake.
    #[arg(long)]
    pub scene: Option<PathBuf>,

    /// Where to write the baked world.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Subdivision mode.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Axis left unsplit in quadtree mode.
    #[arg(long, value_enum)]
    pub axis: Option<AxisArg>,

    /// Maximum leaf extent along a split axis (0 disables).
    #[arg(long)]
    pub max_leaf_size: Option<f32>,

    /// Maximum primitives per leaf (0 disables).
    #[arg(long)]
    pub max_primitives: Option<u32>,

    /// Maximum tree depth (0 disables).
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Run the visibility pass.
    #[arg(long)]
    pub pvs: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref scene) = args.scene {
            self.bake.scene = scene.clone();
        }
        if let Some(ref output) = args.output {
            self.bake.output = output.clone();
        }
        if let Some(mode) = args.mode {
            self.partition.mode = mode.into();
        }
        if let Some(axis) = args.axis {
            self.partition.axis = Some(axis.into());
        }
        if let Some(size) = args.max_leaf_size {
            self.partition.max_leaf_size = size;
        }
        if let Some(count) = args.max_primitives {
            self.partition.max_primitives_per_leaf = count;
        }
        if let Some(depth) = args.max_depth {
            self.partition.max_depth = depth;
        }
        if let Some(pvs) = args.pvs {
            self.bake.compute_pvs = pvs;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
