//! Construction-time bookkeeping of which primitives belong to a node.
//!
//! A [`MembershipMap`] is a flat table keyed by `(order, mesh, chunk)`. Each
//! entry holds index subsets: runs of vertex indices, a whole number of
//! primitives long, that came out of one classification pass. Maps are
//! created for the root by [`MembershipMap::from_meshes`] and split for every
//! child by [`MembershipMap::filter`], which also yields the remainder handed
//! on to the next sibling.

use std::collections::BTreeMap;

use glam::Vec3;
use nebula_math::{Aabb, Tolerance, Triangle};
use rustc_hash::FxHashMap;

use crate::error::{MeshAccessError, PartitionError};
use crate::mesh::{MeshGeometry, MeshId, MeshSet, Topology};

/// Ordered vertex indices for a whole number of primitives.
pub type IndexSubset = Vec<u32>;

/// Key of a membership entry. Ordering is by draw order, then mesh, then
/// chunk, which is the order batches are compiled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MembershipKey {
    pub order: i32,
    pub mesh: MeshId,
    pub chunk: u32,
}

/// Primitives of one source chunk that belong to a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipEntry {
    pub topology: Topology,
    pub subsets: Vec<IndexSubset>,
}

impl MembershipEntry {
    pub fn primitive_count(&self) -> usize {
        let per = self.topology.vertices_per_primitive();
        self.subsets.iter().map(|s| s.len() / per).sum()
    }
}

/// Which node a primitive is routed to by [`MembershipMap::filter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Fully inside the node: the node takes it, siblings never see it.
    Contained,
    /// Overlaps the node boundary: both the node and the remainder get it.
    Straddling,
    /// Outside the node: only the remainder gets it.
    Outside,
}

impl Placement {
    pub fn classify(triangle: &Triangle, bounds: &Aabb, tol: &Tolerance) -> Self {
        if triangle.contained_by(bounds, tol) {
            Placement::Contained
        } else if triangle.intersects_aabb_approx(bounds, tol) {
            Placement::Straddling
        } else {
            Placement::Outside
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipMap {
    entries: BTreeMap<MembershipKey, MembershipEntry>,
}

impl MembershipMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every chunk of every mesh into a map for the root node.
    ///
    /// No spatial test is made. Each chunk contributes one subset; trailing
    /// indices that do not form a whole primitive are dropped.
    pub fn from_meshes(meshes: &MeshSet) -> Result<Self, PartitionError> {
        let mut map = Self::new();
        for mesh in meshes.iter() {
            let id = mesh.id();
            let geometry = mesh
                .lock_geometry()
                .map_err(PartitionError::mesh_access(id))?;

            for (chunk_index, chunk) in mesh.chunks().iter().enumerate() {
                let indices = geometry
                    .chunk_indices(chunk)
                    .map_err(PartitionError::mesh_access(id))?;
                let per = chunk.topology.vertices_per_primitive();
                let whole = indices.len() - indices.len() % per;
                let subset = &indices[..whole];
                if subset.is_empty() {
                    continue;
                }
                check_indices(&geometry, subset).map_err(PartitionError::mesh_access(id))?;

                let key = MembershipKey {
                    order: chunk.order,
                    mesh: id,
                    chunk: chunk_index as u32,
                };
                map.push_subset(key, chunk.topology, subset.to_vec());
            }
        }
        Ok(map)
    }

    /// Split this map against `bounds`.
    ///
    /// Returns `(node, remainder)`: contained primitives go to `node` only,
    /// straddling primitives to both, everything else to `remainder` only.
    /// Each source subset produces at most one subset per destination. Each
    /// referenced mesh is locked once per call.
    pub fn filter(
        &self,
        meshes: &MeshSet,
        bounds: &Aabb,
        tol: &Tolerance,
    ) -> Result<(MembershipMap, MembershipMap), PartitionError> {
        let mut node = Self::new();
        let mut remainder = Self::new();
        let mut locked: FxHashMap<MeshId, MeshGeometry<'_>> = FxHashMap::default();

        for (key, entry) in &self.entries {
            let geometry = match locked.get(&key.mesh) {
                Some(geometry) => *geometry,
                None => {
                    let mesh = meshes
                        .get(key.mesh)
                        .ok_or(PartitionError::UnknownMesh(key.mesh))?;
                    let geometry = mesh
                        .lock_geometry()
                        .map_err(PartitionError::mesh_access(key.mesh))?;
                    locked.insert(key.mesh, geometry);
                    geometry
                }
            };

            let per = entry.topology.vertices_per_primitive();
            for subset in &entry.subsets {
                let mut inside = Vec::new();
                let mut rest = Vec::new();

                for primitive in subset.chunks_exact(per) {
                    let triangle = primitive_triangle(&geometry, primitive)
                        .map_err(PartitionError::mesh_access(key.mesh))?;
                    match Placement::classify(&triangle, bounds, tol) {
                        Placement::Contained => inside.extend_from_slice(primitive),
                        Placement::Straddling => {
                            inside.extend_from_slice(primitive);
                            rest.extend_from_slice(primitive);
                        }
                        Placement::Outside => rest.extend_from_slice(primitive),
                    }
                }

                if !inside.is_empty() {
                    node.push_subset(*key, entry.topology, inside);
                }
                if !rest.is_empty() {
                    remainder.push_subset(*key, entry.topology, rest);
                }
            }
        }

        Ok((node, remainder))
    }

    /// Append a subset to the entry for `key`, creating it if needed.
    pub fn push_subset(&mut self, key: MembershipKey, topology: Topology, subset: IndexSubset) {
        self.entries
            .entry(key)
            .or_insert_with(|| MembershipEntry {
                topology,
                subsets: Vec::new(),
            })
            .subsets
            .push(subset);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `(order, mesh, chunk)` entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total primitives across all entries. Straddling primitives are
    /// counted once per map that holds them.
    pub fn primitive_count(&self) -> usize {
        self.entries.values().map(MembershipEntry::primitive_count).sum()
    }

    /// Entries in `(order, mesh, chunk)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&MembershipKey, &MembershipEntry)> {
        self.entries.iter()
    }
}

/// Look up the corners of one primitive. Points and lines repeat their last
/// vertex to form a degenerate triangle.
pub(crate) fn primitive_triangle(
    geometry: &MeshGeometry<'_>,
    primitive: &[u32],
) -> Result<Triangle, MeshAccessError> {
    let corner = |i: usize| match primitive.get(i).or(primitive.last()) {
        Some(&index) => geometry.position(index),
        None => Ok(Vec3::ZERO),
    };
    Ok(Triangle::new(corner(0)?, corner(1)?, corner(2)?))
}

fn check_indices(geometry: &MeshGeometry<'_>, indices: &[u32]) -> Result<(), MeshAccessError> {
    let len = geometry.positions.len();
    match indices.iter().find(|&&i| i as usize >= len) {
        Some(&index) => Err(MeshAccessError::IndexOutOfRange { index, len }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Chunk, StaticMesh};

    fn two_triangle_set() -> MeshSet {
        let mut set = MeshSet::new();
        set.insert(StaticMesh::triangles(
            MeshId(1),
            vec![
                Vec3::new(0.1, 0.5, 0.1),
                Vec3::new(0.3, 0.5, 0.1),
                Vec3::new(0.1, 0.5, 0.3),
                Vec3::new(0.4, 0.5, 0.7),
                Vec3::new(0.6, 0.5, 0.7),
                Vec3::new(0.5, 0.5, 0.9),
            ],
            vec![0, 1, 2, 3, 4, 5],
        ))
        .unwrap();
        set
    }

    #[test]
    fn test_from_meshes_collects_every_chunk() {
        let map = MembershipMap::from_meshes(&two_triangle_set()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.primitive_count(), 2);
    }

    #[test]
    fn test_from_meshes_truncates_partial_primitives() {
        let mut set = MeshSet::new();
        set.insert(StaticMesh::new(
            MeshId(1),
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
            vec![0, 1, 2, 3],
            vec![Chunk::triangles(0, 4)],
        ))
        .unwrap();
        let map = MembershipMap::from_meshes(&set).unwrap();
        let (_, entry) = map.iter().next().unwrap();
        assert_eq!(entry.subsets, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_from_meshes_rejects_bad_index() {
        let mut set = MeshSet::new();
        set.insert(StaticMesh::triangles(
            MeshId(4),
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 9],
        ))
        .unwrap();
        let err = MembershipMap::from_meshes(&set).unwrap_err();
        assert!(matches!(
            err,
            PartitionError::MeshAccess {
                mesh: MeshId(4),
                source: MeshAccessError::IndexOutOfRange { index: 9, len: 3 }
            }
        ));
    }

    #[test]
    fn test_from_meshes_requires_indices() {
        let mut mesh = StaticMesh::triangles(MeshId(2), vec![Vec3::ZERO; 3], vec![0, 1, 2]);
        mesh.indices = None;
        let mut set = MeshSet::new();
        set.insert(mesh).unwrap();
        assert!(MembershipMap::from_meshes(&set).is_err());
    }

    #[test]
    fn test_filter_routes_contained_straddling_and_outside() {
        let set = two_triangle_set();
        let map = MembershipMap::from_meshes(&set).unwrap();

        // Low-x, low-z quarter of the unit square.
        let quarter = Aabb::new(Vec3::ZERO, Vec3::new(0.5, 1.0, 0.5));
        let (node, rest) = map.filter(&set, &quarter, &Tolerance::EXACT).unwrap();
        assert_eq!(node.primitive_count(), 1);
        assert_eq!(rest.primitive_count(), 1);
        let (_, entry) = node.iter().next().unwrap();
        assert_eq!(entry.subsets, vec![vec![0, 1, 2]]);

        // High-z half: the straddler goes to both sides.
        let half = Aabb::new(Vec3::new(0.0, 0.0, 0.5), Vec3::new(0.5, 1.0, 1.0));
        let (node, rest) = rest.filter(&set, &half, &Tolerance::EXACT).unwrap();
        assert_eq!(node.primitive_count(), 1);
        assert_eq!(rest.primitive_count(), 1);
    }

    #[test]
    fn test_filter_on_empty_map_is_empty() {
        let set = two_triangle_set();
        let (node, rest) = MembershipMap::new()
            .filter(&set, &Aabb::new(Vec3::ZERO, Vec3::ONE), &Tolerance::EXACT)
            .unwrap();
        assert!(node.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_filter_unknown_mesh() {
        let mut map = MembershipMap::new();
        let key = MembershipKey {
            order: 0,
            mesh: MeshId(99),
            chunk: 0,
        };
        map.push_subset(key, Topology::Points, vec![0]);
        let err = map
            .filter(&MeshSet::new(), &Aabb::new(Vec3::ZERO, Vec3::ONE), &Tolerance::EXACT)
            .unwrap_err();
        assert!(matches!(err, PartitionError::UnknownMesh(MeshId(99))));
    }

    #[test]
    fn test_keys_sort_by_order_first() {
        let mut map = MembershipMap::new();
        for (order, mesh) in [(2, 1), (0, 5), (1, 3), (0, 2)] {
            let key = MembershipKey {
                order,
                mesh: MeshId(mesh),
                chunk: 0,
            };
            map.push_subset(key, Topology::Points, vec![0]);
        }
        let keys: Vec<(i32, u32)> = map.iter().map(|(k, _)| (k.order, k.mesh.0)).collect();
        assert_eq!(keys, vec![(0, 2), (0, 5), (1, 3), (2, 1)]);
    }

    #[test]
    fn test_points_and_lines_classify_as_degenerate_triangles() {
        let mut set = MeshSet::new();
        set.insert(StaticMesh::new(
            MeshId(1),
            vec![
                Vec3::splat(0.2),
                Vec3::splat(0.8),
                Vec3::new(-1.0, 0.5, 0.5),
                Vec3::new(2.0, 0.5, 0.5),
            ],
            vec![0, 1, 2, 3],
            vec![
                Chunk {
                    topology: Topology::Points,
                    ..Chunk::triangles(0, 2)
                },
                Chunk {
                    topology: Topology::Lines,
                    ..Chunk::triangles(2, 2)
                },
            ],
        ))
        .unwrap();
        let map = MembershipMap::from_meshes(&set).unwrap();
        assert_eq!(map.primitive_count(), 3);

        let low = Aabb::new(Vec3::ZERO, Vec3::splat(0.5));
        let (node, rest) = map.filter(&set, &low, &Tolerance::EXACT).unwrap();
        // One point inside; the line crosses the box's x range at y = z = 0.5.
        assert_eq!(node.primitive_count(), 2);
        assert_eq!(rest.primitive_count(), 2);
    }
}
