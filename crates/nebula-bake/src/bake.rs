//! Scene loading and the bake pipeline.

use std::path::{Path, PathBuf};

use nebula_config::Config;
use nebula_partition::{
    ConservativePvs, LogProgress, PartitionError, PersistError, PvsHook, StaticMesh, StaticWorld,
    TreeStats,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Errors that stop a bake.
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("failed to read scene {path}: {source}")]
    SceneRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scene {path}: {source}")]
    SceneParse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("no tree was built")]
    NothingBuilt,
}

/// Static meshes making up one world, as stored in a RON scene file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub meshes: Vec<StaticMesh>,
}

impl Scene {
    pub fn load(path: &Path) -> Result<Self, BakeError> {
        let contents = std::fs::read_to_string(path).map_err(|source| BakeError::SceneRead {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| BakeError::SceneParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Outcome of a successful bake.
#[derive(Clone, Debug, PartialEq)]
pub struct BakeReport {
    pub meshes: usize,
    pub stats: TreeStats,
    pub pvs_leaves: Option<usize>,
    pub output: PathBuf,
}

/// Load the configured scene, partition it, and write the baked world.
pub fn run(config: &Config) -> Result<BakeReport, BakeError> {
    let scene = Scene::load(&config.bake.scene)?;
    let meshes = scene.meshes.len();
    info!(
        "Baking {} ({meshes} meshes, {:?} mode)",
        config.bake.scene.display(),
        config.partition.mode
    );

    let mut world = StaticWorld::new(config.partition.clone(), config.tolerance);
    for mesh in scene.meshes {
        world.add_mesh(mesh)?;
    }

    let mut pvs = ConservativePvs;
    let hook: Option<&mut dyn PvsHook> = if config.bake.compute_pvs {
        Some(&mut pvs)
    } else {
        None
    };
    let stats = world.rebuild(hook, &mut LogProgress::default())?.stats();

    let baked = world.bake().transpose()?.ok_or(BakeError::NothingBuilt)?;
    baked.write(&config.bake.output)?;
    info!("Wrote {}", config.bake.output.display());

    Ok(BakeReport {
        meshes,
        stats,
        pvs_leaves: world.pvs().map(<[_]>::len),
        output: config.bake.output.clone(),
    })
}
