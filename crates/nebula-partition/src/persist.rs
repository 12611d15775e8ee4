//! Persisted tree layout and baked-world files.
//!
//! Nodes are written in pre-order as `{min, max, num_children, leaf_index,
//! parent_id, child_ids}`; leaves as `{min, max, batches}`. Batch geometry is
//! written as an external integer id resolved through a caller-supplied
//! [`GeometryIdMap`]. Baked files are postcard-encoded and lz4-compressed.

use std::path::Path;

use glam::Vec3;
use nebula_math::{Aabb, Tolerance};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::geometry_cache::{GeometryCache, GeometryId, OptimizedGeometry};
use crate::mesh::MeshId;
use crate::pvs::LeafVisibility;
use crate::settings::PartitionSettings;
use crate::tree::{Leaf, LeafId, NodeId, PartitionTree, RenderBatch, SpatialNode};

/// Current persisted tree format version.
pub const CURRENT_TREE_VERSION: u32 = 1;

/// Errors reading or writing persisted trees.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The data was written by a newer format version.
    #[error("tree version {found} is newer than max supported {max_supported}")]
    VersionTooNew {
        /// Version found in the data.
        found: u32,
        /// Maximum version this build supports.
        max_supported: u32,
    },
    /// I/O error reading or writing a baked file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding, decoding or decompression failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A batch refers to geometry the id map cannot externalize.
    #[error("geometry {0} has no external id")]
    UnmappedGeometry(GeometryId),
    /// A batch refers to an external id the map cannot resolve.
    #[error("external geometry id {0} does not resolve")]
    UnknownGeometry(u32),
    /// The node table is not a complete tree.
    #[error("node {node}: {reason}")]
    InvalidNode {
        /// Pre-order id of the offending node.
        node: u32,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Translates between in-memory geometry ids and the integer ids written to
/// disk.
pub trait GeometryIdMap {
    fn external_id(&self, geometry: GeometryId) -> Option<u32>;
    fn geometry_id(&self, external: u32) -> Option<GeometryId>;
}

/// Writes geometry ids unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityIds;

impl GeometryIdMap for IdentityIds {
    fn external_id(&self, geometry: GeometryId) -> Option<u32> {
        Some(geometry.0)
    }

    fn geometry_id(&self, external: u32) -> Option<GeometryId> {
        Some(GeometryId(external))
    }
}

/// Explicit two-way table of id pairs.
#[derive(Clone, Debug, Default)]
pub struct GeometryIdTable {
    to_external: FxHashMap<GeometryId, u32>,
    to_geometry: FxHashMap<u32, GeometryId>,
}

impl GeometryIdTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, geometry: GeometryId, external: u32) {
        self.to_external.insert(geometry, external);
        self.to_geometry.insert(external, geometry);
    }
}

impl GeometryIdMap for GeometryIdTable {
    fn external_id(&self, geometry: GeometryId) -> Option<u32> {
        self.to_external.get(&geometry).copied()
    }

    fn geometry_id(&self, external: u32) -> Option<GeometryId> {
        self.to_geometry.get(&external).copied()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersistedNode {
    pub min: Vec3,
    pub max: Vec3,
    pub num_children: u32,
    pub leaf_index: Option<u32>,
    pub parent_id: Option<u32>,
    pub child_ids: Vec<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PersistedBatch {
    pub order: i32,
    pub mesh: MeshId,
    /// External geometry id.
    pub geometry: u32,
    pub start: u32,
    pub count: u32,
    pub shading_id: Option<u32>,
    pub technique_id: u32,
    pub material_id: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersistedLeaf {
    pub min: Vec3,
    pub max: Vec3,
    pub batches: Vec<PersistedBatch>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersistedTree {
    pub version: u32,
    pub settings: PartitionSettings,
    pub tolerance: Tolerance,
    /// Pre-order; index is the node id and 0 is the root.
    pub nodes: Vec<PersistedNode>,
    pub leaves: Vec<PersistedLeaf>,
}

impl PersistedTree {
    /// Flatten `tree` into pre-order, externalizing geometry through `ids`.
    pub fn from_tree(tree: &PartitionTree, ids: &impl GeometryIdMap) -> Result<Self, PersistError> {
        let order = pre_order(tree);
        let mut renumber = vec![0u32; tree.nodes().len()];
        for (new, id) in order.iter().enumerate() {
            renumber[id.0 as usize] = new as u32;
        }

        let nodes = order
            .iter()
            .filter_map(|&id| tree.node(id))
            .map(|node| PersistedNode {
                min: node.bounds.min,
                max: node.bounds.max,
                num_children: node.children.len() as u32,
                leaf_index: node.leaf.map(|l| l.0),
                parent_id: node.parent.map(|p| renumber[p.0 as usize]),
                child_ids: node
                    .children
                    .iter()
                    .map(|c| renumber[c.0 as usize])
                    .collect(),
            })
            .collect();

        let leaves = tree
            .leaves()
            .iter()
            .map(|leaf| {
                let batches = leaf
                    .batches
                    .iter()
                    .map(|b| {
                        let geometry = ids
                            .external_id(b.geometry)
                            .ok_or(PersistError::UnmappedGeometry(b.geometry))?;
                        Ok(PersistedBatch {
                            order: b.order,
                            mesh: b.mesh,
                            geometry,
                            start: b.start,
                            count: b.count,
                            shading_id: b.shading_id,
                            technique_id: b.technique_id,
                            material_id: b.material_id,
                        })
                    })
                    .collect::<Result<Vec<_>, PersistError>>()?;
                Ok(PersistedLeaf {
                    min: leaf.bounds.min,
                    max: leaf.bounds.max,
                    batches,
                })
            })
            .collect::<Result<Vec<_>, PersistError>>()?;

        Ok(Self {
            version: CURRENT_TREE_VERSION,
            settings: tree.settings().clone(),
            tolerance: *tree.tolerance(),
            nodes,
            leaves,
        })
    }

    /// Rebuild the arena, checking that the node table is a complete tree
    /// and that every batch resolves to geometry in `geometry`.
    pub fn into_tree(
        self,
        geometry: GeometryCache,
        ids: &impl GeometryIdMap,
    ) -> Result<PartitionTree, PersistError> {
        check_version(self.version)?;
        self.validate_nodes()?;

        let nodes = self
            .nodes
            .into_iter()
            .map(|n| SpatialNode {
                bounds: Aabb { min: n.min, max: n.max },
                parent: n.parent_id.map(NodeId),
                children: n.child_ids.into_iter().map(NodeId).collect(),
                leaf: n.leaf_index.map(LeafId),
            })
            .collect();

        let leaves = self
            .leaves
            .into_iter()
            .map(|leaf| {
                let batches = leaf
                    .batches
                    .into_iter()
                    .map(|b| {
                        let id = ids
                            .geometry_id(b.geometry)
                            .filter(|&id| geometry.get(id).is_some())
                            .ok_or(PersistError::UnknownGeometry(b.geometry))?;
                        Ok(RenderBatch {
                            order: b.order,
                            mesh: b.mesh,
                            geometry: id,
                            start: b.start,
                            count: b.count,
                            shading_id: b.shading_id,
                            technique_id: b.technique_id,
                            material_id: b.material_id,
                        })
                    })
                    .collect::<Result<Vec<_>, PersistError>>()?;
                Ok(Leaf {
                    bounds: Aabb {
                        min: leaf.min,
                        max: leaf.max,
                    },
                    batches,
                })
            })
            .collect::<Result<Vec<_>, PersistError>>()?;

        Ok(PartitionTree::from_parts(
            nodes,
            leaves,
            geometry,
            self.settings,
            self.tolerance,
        ))
    }

    fn validate_nodes(&self) -> Result<(), PersistError> {
        let invalid = |node: usize, reason| PersistError::InvalidNode {
            node: node as u32,
            reason,
        };
        let count = self.nodes.len();
        let arity = self.settings.child_count();

        match self.nodes.first() {
            None => return Err(invalid(0, "tree has no root")),
            Some(root) if root.parent_id.is_some() => return Err(invalid(0, "root has a parent")),
            _ => {}
        }

        let mut referenced = vec![false; count];
        let mut leaf_used = vec![false; self.leaves.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            if node.num_children as usize != node.child_ids.len() {
                return Err(invalid(i, "child count does not match child ids"));
            }
            if !node.child_ids.is_empty() && node.child_ids.len() != arity {
                return Err(invalid(i, "partial set of children"));
            }
            for &child in &node.child_ids {
                let c = child as usize;
                if c <= i || c >= count {
                    return Err(invalid(i, "child id out of pre-order range"));
                }
                if referenced[c] || self.nodes[c].parent_id != Some(i as u32) {
                    return Err(invalid(c, "parent link is inconsistent"));
                }
                referenced[c] = true;
            }
            match (node.child_ids.is_empty(), node.leaf_index) {
                (true, Some(leaf)) => {
                    let slot = leaf_used
                        .get_mut(leaf as usize)
                        .ok_or(invalid(i, "leaf index out of range"))?;
                    if *slot {
                        return Err(invalid(i, "leaf shared by two nodes"));
                    }
                    *slot = true;
                }
                (true, None) => return Err(invalid(i, "terminal node without a leaf")),
                (false, Some(_)) => return Err(invalid(i, "internal node with a leaf")),
                (false, None) => {}
            }
        }

        if let Some(orphan) = (1..count).find(|&i| !referenced[i]) {
            return Err(invalid(orphan, "node is not reachable from the root"));
        }
        if leaf_used.iter().any(|used| !used) {
            return Err(invalid(0, "leaf not attached to any node"));
        }
        Ok(())
    }
}

/// Validates that the format version is supported.
pub fn check_version(version: u32) -> Result<(), PersistError> {
    if version > CURRENT_TREE_VERSION {
        return Err(PersistError::VersionTooNew {
            found: version,
            max_supported: CURRENT_TREE_VERSION,
        });
    }
    Ok(())
}

/// Node ids of `tree` in parent-then-children order.
fn pre_order(tree: &PartitionTree) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(tree.nodes().len());
    let mut stack = vec![PartitionTree::ROOT];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.node(id) else {
            continue;
        };
        order.push(id);
        stack.extend(node.children.iter().rev().copied());
    }
    order
}

/// A tree plus everything needed to draw it without the source meshes'
/// index buffers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BakedWorld {
    pub tree: PersistedTree,
    /// Optimized geometry in id order.
    pub geometries: Vec<OptimizedGeometry>,
    pub pvs: Option<Vec<LeafVisibility>>,
}

impl BakedWorld {
    pub fn from_tree(
        tree: &PartitionTree,
        pvs: Option<Vec<LeafVisibility>>,
    ) -> Result<Self, PersistError> {
        Ok(Self {
            tree: PersistedTree::from_tree(tree, &IdentityIds)?,
            geometries: tree.geometry().iter().map(|(_, g)| g.clone()).collect(),
            pvs,
        })
    }

    pub fn into_tree(self) -> Result<(PartitionTree, Option<Vec<LeafVisibility>>), PersistError> {
        let cache = GeometryCache::from_geometries(self.geometries);
        let tree = self.tree.into_tree(cache, &IdentityIds)?;
        Ok((tree, self.pvs))
    }

    /// Encode with postcard and compress with lz4.
    pub fn encode(&self) -> Result<Vec<u8>, PersistError> {
        let bytes =
            postcard::to_allocvec(self).map_err(|e| PersistError::Serialization(e.to_string()))?;
        Ok(lz4_flex::compress_prepend_size(&bytes))
    }

    pub fn decode(compressed: &[u8]) -> Result<Self, PersistError> {
        let bytes = lz4_flex::decompress_size_prepended(compressed)
            .map_err(|e| PersistError::Serialization(e.to_string()))?;
        let world: BakedWorld =
            postcard::from_bytes(&bytes).map_err(|e| PersistError::Serialization(e.to_string()))?;
        check_version(world.tree.version)?;
        Ok(world)
    }

    /// Write to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.encode()?)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, PersistError> {
        Self::decode(&std::fs::read(path)?)
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
