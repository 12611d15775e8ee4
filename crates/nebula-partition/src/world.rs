//! Owner of a static world's meshes and the tree built over them.

use nebula_math::{Frustum, Ray, Tolerance};
use tracing::info;

use crate::error::PartitionError;
use crate::mesh::{MeshId, MeshSet, MeshSource, MeshVisibility};
use crate::persist::{BakedWorld, PersistError};
use crate::progress::ProgressSink;
use crate::pvs::{LeafVisibility, PvsHook, compute_pvs};
use crate::ray_query::{RayHit, RayQuery};
use crate::render_list::RenderList;
use crate::settings::PartitionSettings;
use crate::tree::PartitionTree;

/// Meshes, settings and the current tree. Adding meshes or changing settings
/// leaves the tree stale until the next [`rebuild`](Self::rebuild).
#[derive(Default)]
pub struct StaticWorld {
    meshes: MeshSet,
    settings: PartitionSettings,
    tolerance: Tolerance,
    tree: Option<PartitionTree>,
    pvs: Option<Vec<LeafVisibility>>,
}

impl StaticWorld {
    pub fn new(settings: PartitionSettings, tolerance: Tolerance) -> Self {
        Self {
            settings,
            tolerance,
            ..Default::default()
        }
    }

    pub fn add_mesh<M: MeshSource + 'static>(&mut self, mesh: M) -> Result<MeshId, PartitionError> {
        self.meshes.insert(mesh)
    }

    pub fn meshes(&self) -> &MeshSet {
        &self.meshes
    }

    pub fn settings(&self) -> &PartitionSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PartitionSettings) {
        self.settings = settings;
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    /// The last successfully built tree.
    pub fn tree(&self) -> Option<&PartitionTree> {
        self.tree.as_ref()
    }

    pub fn pvs(&self) -> Option<&[LeafVisibility]> {
        self.pvs.as_deref()
    }

    /// Drop the current tree and build a new one, running `pvs` over the
    /// result when given. On error the world is left without a tree.
    pub fn rebuild(
        &mut self,
        pvs: Option<&mut dyn PvsHook>,
        progress: &mut impl ProgressSink,
    ) -> Result<&PartitionTree, PartitionError> {
        self.tree = None;
        self.pvs = None;
        self.meshes.ensure_indices();

        let tree = PartitionTree::build(&self.meshes, &self.settings, self.tolerance, progress)?;
        if let Some(hook) = pvs {
            self.pvs = Some(compute_pvs(&tree, hook, progress)?);
        }
        Ok(self.tree.insert(tree))
    }

    /// Snapshot the current tree and PVS for writing to disk.
    pub fn bake(&self) -> Option<Result<BakedWorld, PersistError>> {
        let tree = self.tree.as_ref()?;
        Some(BakedWorld::from_tree(tree, self.pvs.clone()))
    }

    /// Replace the tree and PVS with a baked one. The meshes are kept; ray
    /// queries need them to hold the baked mesh ids.
    pub fn load_baked(&mut self, baked: BakedWorld) -> Result<&PartitionTree, PersistError> {
        let (tree, pvs) = baked.into_tree()?;
        self.settings = tree.settings().clone();
        self.tolerance = *tree.tolerance();
        self.pvs = pvs;
        info!("Loaded baked world with {} leaves", tree.leaves().len());
        Ok(self.tree.insert(tree))
    }

    /// Batches visible through `frustum`. Empty when no tree is built.
    pub fn render_list(&self, frustum: &Frustum) -> RenderList {
        self.render_list_with(frustum, &self.meshes)
    }

    pub fn render_list_with(
        &self,
        frustum: &Frustum,
        visibility: &impl MeshVisibility,
    ) -> RenderList {
        match &self.tree {
            Some(tree) => tree.build_render_list(frustum, visibility),
            None => RenderList::new(),
        }
    }

    pub fn query_ray(&self, ray: &Ray, mode: RayQuery) -> Vec<RayHit> {
        match &self.tree {
            Some(tree) => tree.query_ray(&self.meshes, ray, mode),
            None => Vec::new(),
        }
    }

    pub fn nearest_ray_hit(&self, ray: &Ray) -> Option<RayHit> {
        self.tree.as_ref()?.nearest_ray_hit(&self.meshes, ray)
    }
}
