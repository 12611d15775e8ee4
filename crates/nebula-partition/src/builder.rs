//! Recursive construction of the partition tree.
//!
//! The root receives every primitive. Each node filters the primitives
//! handed to it and passes what it did not fully consume on to its next
//! sibling, so the children of a node are built strictly in order. Child
//! `i` takes the high half of free axis `k` when bit `k` of `i` is set,
//! with free axes counted in X, Y, Z order.

use glam::Vec3;
use nebula_math::{Aabb, Tolerance};
use tracing::{debug, info};

use crate::compiler::compile_leaf;
use crate::error::PartitionError;
use crate::geometry_cache::GeometryCache;
use crate::membership::MembershipMap;
use crate::mesh::MeshSet;
use crate::progress::{BuildPhase, ProgressSink};
use crate::settings::{PartitionMode, PartitionSettings};
use crate::tree::{Leaf, LeafId, NodeId, PartitionTree, SpatialNode};

/// Build a tree over `meshes`.
///
/// Settings are validated first. A mesh that cannot be read aborts the
/// build; no partial tree is returned. An empty mesh set yields a root-only
/// tree with one empty leaf.
pub fn build(
    meshes: &MeshSet,
    settings: &PartitionSettings,
    tolerance: Tolerance,
    progress: &mut impl ProgressSink,
) -> Result<PartitionTree, PartitionError> {
    let settings = settings.validate()?;
    let bounds = meshes.bounds();
    let bounds = if bounds.is_empty() {
        Aabb::new(Vec3::ZERO, Vec3::ZERO)
    } else {
        bounds
    };

    let available = MembershipMap::from_meshes(meshes)?;
    debug!(
        "Partitioning {} meshes, {} primitives, bounds {:?}..{:?}",
        meshes.len(),
        available.primitive_count(),
        bounds.min,
        bounds.max
    );

    let mut builder = Builder::new(meshes, settings, tolerance, bounds, progress);
    builder.partition(PartitionTree::ROOT, 0, 1.0, available)?;

    let Builder {
        nodes,
        leaves,
        mut cache,
        settings,
        progress,
        ..
    } = builder;

    progress.on_progress(BuildPhase::Optimizing, 0.0);
    cache.seal();
    progress.on_progress(BuildPhase::Optimizing, 100.0);

    let tree = PartitionTree::from_parts(nodes, leaves, cache, settings, tolerance);
    let stats = tree.stats();
    info!(
        "Built partition tree: {} nodes, {} leaves ({} empty), depth {}, {} batches",
        stats.nodes, stats.leaves, stats.empty_leaves, stats.max_depth, stats.batches
    );
    Ok(tree)
}

struct Builder<'a, P> {
    meshes: &'a MeshSet,
    settings: PartitionSettings,
    tolerance: Tolerance,
    nodes: Vec<SpatialNode>,
    leaves: Vec<Leaf>,
    cache: GeometryCache,
    progress: &'a mut P,
    /// Fraction of the root already materialized as leaves. Each child owns
    /// an equal share of its parent, so zero-thickness children still count.
    done_share: f64,
}

impl<'a, P: ProgressSink> Builder<'a, P> {
    fn new(
        meshes: &'a MeshSet,
        settings: PartitionSettings,
        tolerance: Tolerance,
        bounds: Aabb,
        progress: &'a mut P,
    ) -> Self {
        let root = SpatialNode {
            bounds,
            parent: None,
            children: Vec::new(),
            leaf: None,
        };
        Self {
            meshes,
            settings,
            tolerance,
            nodes: vec![root],
            leaves: Vec::new(),
            cache: GeometryCache::new(),
            progress,
            done_share: 0.0,
        }
    }

    /// Build the subtree at `id` from `available` and return what the next
    /// sibling should receive. `share` is the node's fraction of the root.
    fn partition(
        &mut self,
        id: NodeId,
        depth: u32,
        share: f64,
        available: MembershipMap,
    ) -> Result<MembershipMap, PartitionError> {
        if available.is_empty() {
            self.make_leaf(id, share, &MembershipMap::new())?;
            return Ok(MembershipMap::new());
        }

        let bounds = self.nodes[id.0 as usize].bounds;
        let (result, remainder) = if id == PartitionTree::ROOT {
            (available, MembershipMap::new())
        } else {
            available.filter(self.meshes, &bounds, &self.tolerance)?
        };

        if result.is_empty() || !self.should_subdivide(&bounds, depth, &result) {
            self.make_leaf(id, share, &result)?;
            return Ok(remainder);
        }

        let children = self.split(id, &bounds);
        debug!(
            "Subdividing {id} at depth {depth}: {} primitives into {} children",
            result.primitive_count(),
            children.len()
        );
        let child_share = share / children.len() as f64;
        let mut carried = result;
        for child in children {
            carried = self.partition(child, depth + 1, child_share, carried)?;
        }
        Ok(remainder)
    }

    fn should_subdivide(&self, bounds: &Aabb, depth: u32, map: &MembershipMap) -> bool {
        let s = &self.settings;
        if s.mode == PartitionMode::None || !s.has_limits() {
            return false;
        }

        let free = s.free_axes();
        let size = bounds.size();
        let size_trigger =
            s.max_leaf_size <= 0.0 || free.iter().any(|&axis| size[axis] > s.max_leaf_size);
        let count_trigger = s.max_primitives_per_leaf == 0
            || map.primitive_count() > s.max_primitives_per_leaf as usize;
        let depth_trigger = s.max_depth == 0 || depth < s.max_depth;

        size_trigger && count_trigger && depth_trigger && self.splittable(bounds)
    }

    /// Whether halving `bounds` shrinks it along at least one free axis.
    /// Keeps coincident primitives from recursing forever.
    fn splittable(&self, bounds: &Aabb) -> bool {
        let center = bounds.center();
        self.settings.free_axes().iter().any(|&axis| {
            let (lo, hi, mid) = (bounds.min[axis], bounds.max[axis], center[axis]);
            hi - lo > self.tolerance.tolerance && lo < mid && mid < hi
        })
    }

    /// Allocate the children of `id` and link them in.
    fn split(&mut self, id: NodeId, bounds: &Aabb) -> Vec<NodeId> {
        let free = self.settings.free_axes();
        let center = bounds.center();
        let first = self.nodes.len() as u32;

        for i in 0..self.settings.child_count() {
            let mut child = *bounds;
            for (bit, &axis) in free.iter().enumerate() {
                if i & (1 << bit) != 0 {
                    child.min[axis] = center[axis];
                } else {
                    child.max[axis] = center[axis];
                }
            }
            self.nodes.push(SpatialNode {
                bounds: child,
                parent: Some(id),
                children: Vec::new(),
                leaf: None,
            });
        }

        let children: Vec<NodeId> = (first..self.nodes.len() as u32).map(NodeId).collect();
        self.nodes[id.0 as usize].children = children.clone();
        children
    }

    fn make_leaf(
        &mut self,
        id: NodeId,
        share: f64,
        map: &MembershipMap,
    ) -> Result<(), PartitionError> {
        let batches = compile_leaf(map, self.meshes, &mut self.cache)?;
        let node = &mut self.nodes[id.0 as usize];
        let leaf = LeafId(self.leaves.len() as u32);
        node.leaf = Some(leaf);
        let bounds = node.bounds;
        self.leaves.push(Leaf { bounds, batches });

        self.done_share += share;
        let percent = (self.done_share * 100.0).min(100.0) as f32;
        self.progress.on_progress(BuildPhase::Partitioning, percent);
        Ok(())
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
