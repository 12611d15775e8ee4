//! Ray intersection against the triangles referenced by the tree.

use nebula_math::{Ray, Triangle};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::mesh::{MeshGeometry, MeshId, MeshSet, Topology};
use crate::tree::PartitionTree;

/// How many hits a ray query collects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RayQuery {
    /// Stop at the first hit found in traversal order. This is not
    /// necessarily the nearest; use [`PartitionTree::nearest_ray_hit`] for
    /// that.
    FirstEncountered,
    /// Every hit along the ray.
    All,
}

/// A ray/triangle hit.
#[derive(Clone, Debug, PartialEq)]
pub struct RayHit {
    pub mesh: MeshId,
    /// Chunk index in the source mesh.
    pub chunk: u32,
    /// Source-mesh vertex indices of the triangle.
    pub vertex_ids: [u32; 3],
    /// Barycentric weight of the second vertex.
    pub u: f32,
    /// Barycentric weight of the third vertex.
    pub v: f32,
    pub distance: f32,
}

impl PartitionTree {
    /// Walk the tree depth first, pruning nodes the ray misses, and test
    /// every triangle referenced by the leaves reached.
    ///
    /// A triangle reached through several leaves is reported once. Meshes
    /// that are missing from `meshes` or cannot be read are skipped.
    pub fn query_ray(&self, meshes: &MeshSet, ray: &Ray, mode: RayQuery) -> Vec<RayHit> {
        let tol = self.tolerance();
        let mut hits = Vec::new();
        let mut tested: FxHashSet<(MeshId, u32, [u32; 3])> = FxHashSet::default();
        let mut locked: FxHashMap<MeshId, Option<MeshGeometry<'_>>> = FxHashMap::default();
        let mut stack = vec![PartitionTree::ROOT];

        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if ray.intersect_aabb(&node.bounds, tol).is_none() {
                continue;
            }

            if let Some(leaf) = self.leaf_of(node) {
                for primitive in self.leaf_primitives(leaf) {
                    let [a, b, c] = match (primitive.topology, primitive.vertices) {
                        (Topology::Triangles, &[a, b, c]) => [a, b, c],
                        _ => continue,
                    };
                    if !tested.insert((primitive.mesh, primitive.chunk, [a, b, c])) {
                        continue;
                    }

                    let geometry = locked
                        .entry(primitive.mesh)
                        .or_insert_with(|| lock_for_query(meshes, primitive.mesh));
                    let Some(geometry) = geometry else {
                        continue;
                    };
                    let corners = (
                        geometry.position(a),
                        geometry.position(b),
                        geometry.position(c),
                    );
                    let (Ok(pa), Ok(pb), Ok(pc)) = corners else {
                        warn!("Mesh {} has a triangle out of range, skipped", primitive.mesh);
                        continue;
                    };

                    if let Some(hit) = ray.intersect_triangle(&Triangle::new(pa, pb, pc), tol) {
                        hits.push(RayHit {
                            mesh: primitive.mesh,
                            chunk: primitive.chunk,
                            vertex_ids: [a, b, c],
                            u: hit.u,
                            v: hit.v,
                            distance: hit.distance,
                        });
                        if mode == RayQuery::FirstEncountered {
                            return hits;
                        }
                    }
                }
            }

            stack.extend(node.children.iter().rev().copied());
        }

        hits
    }

    /// The closest hit along the ray.
    pub fn nearest_ray_hit(&self, meshes: &MeshSet, ray: &Ray) -> Option<RayHit> {
        self.query_ray(meshes, ray, RayQuery::All)
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

fn lock_for_query(meshes: &MeshSet, mesh: MeshId) -> Option<MeshGeometry<'_>> {
    let Some(source) = meshes.get(mesh) else {
        warn!("Ray query skipped unknown mesh {mesh}");
        return None;
    };
    match source.lock_geometry() {
        Ok(geometry) => Some(geometry),
        Err(err) => {
            warn!("Ray query skipped mesh {mesh}: {err}");
            None
        }
    }
}
