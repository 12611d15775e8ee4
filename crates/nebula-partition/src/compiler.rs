//! Leaf materialization: turn a terminal node's membership map into
//! render batches backed by the optimized geometry cache.

use crate::error::PartitionError;
use crate::geometry_cache::GeometryCache;
use crate::membership::{MembershipKey, MembershipMap};
use crate::mesh::MeshSet;
use crate::tree::RenderBatch;

/// Compile the batches for one leaf.
///
/// Entries are visited in `(order, mesh, chunk)` order. Every source chunk
/// present in the map becomes one batch carrying that chunk's shading,
/// technique and material, so a batch never mixes render state. The batch
/// range covers the single chunk-index entry appended for it.
pub fn compile_leaf(
    map: &MembershipMap,
    meshes: &MeshSet,
    cache: &mut GeometryCache,
) -> Result<Vec<RenderBatch>, PartitionError> {
    let entries: Vec<_> = map.iter().collect();
    let mut batches = Vec::new();

    for group in entries.chunk_by(|(a, _), (b, _)| a.order == b.order && a.mesh == b.mesh) {
        let Some(&(&MembershipKey { order, mesh: mesh_id, .. }, _)) = group.first() else {
            continue;
        };
        let mesh = meshes
            .get(mesh_id)
            .ok_or(PartitionError::UnknownMesh(mesh_id))?;

        let geometry_id = cache.fetch_or_create(mesh_id);
        let Some(geometry) = cache.get_mut(geometry_id) else {
            continue;
        };

        for (key, entry) in group {
            let chunk = mesh
                .chunks()
                .get(key.chunk as usize)
                .ok_or(PartitionError::MissingChunk {
                    mesh: mesh_id,
                    chunk: key.chunk,
                })?;

            let start = geometry.chunk_indices().len() as u32;
            let position = geometry.add_contribution(key.chunk, chunk, entry.subsets.concat());
            geometry.push_chunk_index(position);

            batches.push(RenderBatch {
                order,
                mesh: mesh_id,
                geometry: geometry_id,
                start,
                count: 1,
                shading_id: chunk.shading_id,
                technique_id: chunk.technique_id,
                material_id: chunk.material_id,
            });
        }
    }

    Ok(batches)
}
