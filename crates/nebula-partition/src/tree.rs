//! The finished partition tree.
//!
//! Nodes live in an arena owned by [`PartitionTree`]; children are listed by
//! id and `parent` is a plain back index. The tree is immutable once built
//! and can be traversed from several threads at once.

use std::fmt;
use std::ops::Range;

use nebula_math::{Aabb, Tolerance};
use serde::{Deserialize, Serialize};

use crate::error::PartitionError;
use crate::geometry_cache::{CompactChunk, GeometryCache, GeometryId, OptimizedGeometry};
use crate::mesh::{MeshId, MeshSet, Topology};
use crate::progress::ProgressSink;
use crate::settings::PartitionSettings;

/// Arena index of a [`SpatialNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Index into the tree's leaf array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for LeafId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leaf#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpatialNode {
    pub bounds: Aabb,
    pub parent: Option<NodeId>,
    /// Empty, or exactly as many children as the tree's mode produces.
    pub children: Vec<NodeId>,
    /// Set on terminal nodes.
    pub leaf: Option<LeafId>,
}

impl SpatialNode {
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

/// A span of shading-sorted primitives ready for submission.
///
/// `start..start + count` selects entries of the geometry's chunk-index
/// array, not vertex indices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderBatch {
    pub order: i32,
    pub mesh: MeshId,
    pub geometry: GeometryId,
    pub start: u32,
    pub count: u32,
    pub shading_id: Option<u32>,
    pub technique_id: u32,
    pub material_id: u32,
}

impl RenderBatch {
    pub fn chunk_index_range(&self) -> Range<u32> {
        self.start..self.start.saturating_add(self.count)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Leaf {
    pub bounds: Aabb,
    pub batches: Vec<RenderBatch>,
}

/// One primitive referenced by a leaf, resolved through the geometry cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveRef<'a> {
    pub mesh: MeshId,
    /// Chunk index in the source mesh.
    pub chunk: u32,
    pub topology: Topology,
    /// Source-mesh vertex indices (1, 2 or 3).
    pub vertices: &'a [u32],
}

/// Summary counts for logging and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub empty_leaves: usize,
    pub max_depth: usize,
    pub batches: usize,
    /// Primitive references over all leaves; straddling primitives count
    /// once per leaf.
    pub primitive_refs: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionTree {
    pub(crate) nodes: Vec<SpatialNode>,
    pub(crate) leaves: Vec<Leaf>,
    pub(crate) geometry: GeometryCache,
    pub(crate) settings: PartitionSettings,
    pub(crate) tolerance: Tolerance,
}

impl PartitionTree {
    pub const ROOT: NodeId = NodeId(0);

    /// Build a tree over `meshes`. See [`crate::builder`].
    pub fn build(
        meshes: &MeshSet,
        settings: &PartitionSettings,
        tolerance: Tolerance,
        progress: &mut impl ProgressSink,
    ) -> Result<Self, PartitionError> {
        crate::builder::build(meshes, settings, tolerance, progress)
    }

    pub fn root(&self) -> &SpatialNode {
        &self.nodes[Self::ROOT.0 as usize]
    }

    /// Bounds of the whole tree.
    pub fn bounds(&self) -> Aabb {
        self.root().bounds
    }

    pub fn node(&self, id: NodeId) -> Option<&SpatialNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn nodes(&self) -> &[SpatialNode] {
        &self.nodes
    }

    pub fn leaf(&self, id: LeafId) -> Option<&Leaf> {
        self.leaves.get(id.0 as usize)
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// Leaf attached to `node`. Ids past the end of the leaf array are
    /// treated as no leaf.
    pub fn leaf_of(&self, node: &SpatialNode) -> Option<&Leaf> {
        node.leaf.and_then(|id| self.leaf(id))
    }

    pub fn geometry(&self) -> &GeometryCache {
        &self.geometry
    }

    pub fn settings(&self) -> &PartitionSettings {
        &self.settings
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    /// Compact chunks a batch covers, in chunk-index order.
    pub fn batch_chunks<'a>(
        &'a self,
        batch: &'a RenderBatch,
    ) -> impl Iterator<Item = (&'a OptimizedGeometry, &'a CompactChunk)> + 'a {
        let range = batch.chunk_index_range();
        self.geometry.get(batch.geometry).into_iter().flat_map(move |geometry| {
            range
                .clone()
                .filter_map(move |entry| geometry.chunk_at(entry).map(|chunk| (geometry, chunk)))
        })
    }

    /// Every primitive referenced by `leaf`.
    pub fn leaf_primitives<'a>(
        &'a self,
        leaf: &'a Leaf,
    ) -> impl Iterator<Item = PrimitiveRef<'a>> + 'a {
        leaf.batches
            .iter()
            .flat_map(move |batch| self.batch_chunks(batch))
            .flat_map(|(geometry, chunk)| {
                let per = chunk.topology.vertices_per_primitive();
                geometry
                    .chunk_vertices(chunk)
                    .chunks_exact(per)
                    .map(move |vertices| PrimitiveRef {
                        mesh: geometry.mesh,
                        chunk: chunk.source_chunk,
                        topology: chunk.topology,
                        vertices,
                    })
            })
    }

    /// Depth of `id` below the root, or `None` for an unknown id.
    pub fn depth_of(&self, id: NodeId) -> Option<usize> {
        let mut node = self.node(id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            depth += 1;
        }
        Some(depth)
    }

    pub fn stats(&self) -> TreeStats {
        let max_depth = (0..self.nodes.len() as u32)
            .filter_map(|i| self.depth_of(NodeId(i)))
            .max()
            .unwrap_or(0);
        TreeStats {
            nodes: self.nodes.len(),
            leaves: self.leaves.len(),
            empty_leaves: self.leaves.iter().filter(|l| l.batches.is_empty()).count(),
            max_depth,
            batches: self.leaves.iter().map(|l| l.batches.len()).sum(),
            primitive_refs: self
                .leaves
                .iter()
                .map(|l| self.leaf_primitives(l).count())
                .sum(),
        }
    }

    /// Assemble a tree from parts that have already been validated.
    pub(crate) fn from_parts(
        nodes: Vec<SpatialNode>,
        leaves: Vec<Leaf>,
        geometry: GeometryCache,
        settings: PartitionSettings,
        tolerance: Tolerance,
    ) -> Self {
        Self {
            nodes,
            leaves,
            geometry,
            settings,
            tolerance,
        }
    }
}
