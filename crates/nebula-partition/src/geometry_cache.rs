//! Scene-wide cache of compacted per-mesh geometry.
//!
//! Every leaf that references a mesh appends its primitives to that mesh's
//! [`OptimizedGeometry`]. Batches address the geometry through two levels of
//! indirection: a batch range selects entries of the chunk-index array, each
//! entry names a compact chunk, and each compact chunk owns a disjoint range
//! of the vertex-index array.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::mesh::{Chunk, MeshId, Topology};

/// Index of an [`OptimizedGeometry`] within a [`GeometryCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeometryId(pub u32);

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compacted chunk: the non-positional state of its source chunk plus a
/// range of the owning geometry's vertex-index array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactChunk {
    /// Index of the chunk in the source mesh.
    pub source_chunk: u32,
    pub topology: Topology,
    pub order: i32,
    pub shading_id: Option<u32>,
    pub technique_id: u32,
    pub material_id: u32,
    /// First entry in the vertex-index array.
    pub start: u32,
    /// Number of vertex indices.
    pub count: u32,
}

impl CompactChunk {
    pub fn primitive_count(&self) -> u32 {
        self.count / self.topology.vertices_per_primitive() as u32
    }
}

/// Compacted geometry for one source mesh.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptimizedGeometry {
    pub mesh: MeshId,
    chunks: Vec<CompactChunk>,
    chunk_indices: Vec<u32>,
    indices: Vec<u32>,
    /// Source chunk -> contributed indices -> compact chunk. Dropped by
    /// [`OptimizedGeometry::seal`].
    #[serde(skip)]
    contributions: FxHashMap<u32, FxHashMap<Vec<u32>, u32>>,
}

impl PartialEq for OptimizedGeometry {
    fn eq(&self, other: &Self) -> bool {
        self.mesh == other.mesh
            && self.chunks == other.chunks
            && self.chunk_indices == other.chunk_indices
            && self.indices == other.indices
    }
}

impl OptimizedGeometry {
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            ..Self::default()
        }
    }

    /// Add the indices a leaf takes from `source_chunk` and return the
    /// position of the compact chunk holding them.
    ///
    /// An identical contribution (same source chunk, same indices) made by
    /// an earlier leaf is reused instead of being appended again.
    pub fn add_contribution(&mut self, source_chunk: u32, chunk: &Chunk, indices: Vec<u32>) -> u32 {
        if let Some(&position) = self
            .contributions
            .get(&source_chunk)
            .and_then(|by_indices| by_indices.get(indices.as_slice()))
        {
            return position;
        }

        let position = self.chunks.len() as u32;
        self.chunks.push(CompactChunk {
            source_chunk,
            topology: chunk.topology,
            order: chunk.order,
            shading_id: chunk.shading_id,
            technique_id: chunk.technique_id,
            material_id: chunk.material_id,
            start: self.indices.len() as u32,
            count: indices.len() as u32,
        });
        self.indices.extend_from_slice(&indices);
        self.contributions
            .entry(source_chunk)
            .or_default()
            .insert(indices, position);
        position
    }

    /// Append a reference to compact chunk `position` to the chunk-index
    /// array.
    pub fn push_chunk_index(&mut self, position: u32) {
        self.chunk_indices.push(position);
    }

    /// Drop construction-only lookup state.
    pub fn seal(&mut self) {
        self.contributions = FxHashMap::default();
    }

    pub fn chunks(&self) -> &[CompactChunk] {
        &self.chunks
    }

    pub fn chunk_indices(&self) -> &[u32] {
        &self.chunk_indices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// The compact chunk referenced by chunk-index entry `entry`.
    pub fn chunk_at(&self, entry: u32) -> Option<&CompactChunk> {
        let position = *self.chunk_indices.get(entry as usize)?;
        self.chunks.get(position as usize)
    }

    /// Vertex indices owned by `chunk`.
    pub fn chunk_vertices(&self, chunk: &CompactChunk) -> &[u32] {
        let start = chunk.start as usize;
        let end = start + chunk.count as usize;
        self.indices.get(start..end).unwrap_or(&[])
    }

    /// Rebuild a geometry from persisted arrays.
    pub fn from_parts(
        mesh: MeshId,
        chunks: Vec<CompactChunk>,
        chunk_indices: Vec<u32>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            mesh,
            chunks,
            chunk_indices,
            indices,
            contributions: FxHashMap::default(),
        }
    }
}

/// All optimized geometry of a tree, one entry per referenced mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryCache {
    geometries: Vec<OptimizedGeometry>,
    by_mesh: FxHashMap<MeshId, GeometryId>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the geometry for `mesh`, created empty on first use.
    pub fn fetch_or_create(&mut self, mesh: MeshId) -> GeometryId {
        if let Some(&id) = self.by_mesh.get(&mesh) {
            return id;
        }
        let id = GeometryId(self.geometries.len() as u32);
        self.geometries.push(OptimizedGeometry::new(mesh));
        self.by_mesh.insert(mesh, id);
        id
    }

    pub fn get(&self, id: GeometryId) -> Option<&OptimizedGeometry> {
        self.geometries.get(id.0 as usize)
    }

    pub(crate) fn get_mut(&mut self, id: GeometryId) -> Option<&mut OptimizedGeometry> {
        self.geometries.get_mut(id.0 as usize)
    }

    /// Geometry built for `mesh`, if any leaf referenced it.
    pub fn for_mesh(&self, mesh: MeshId) -> Option<GeometryId> {
        self.by_mesh.get(&mesh).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GeometryId, &OptimizedGeometry)> {
        self.geometries
            .iter()
            .enumerate()
            .map(|(i, g)| (GeometryId(i as u32), g))
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Seal every geometry once the tree is complete.
    pub fn seal(&mut self) {
        for geometry in &mut self.geometries {
            geometry.seal();
        }
    }

    /// Rebuild a cache from geometries in id order.
    pub fn from_geometries(geometries: Vec<OptimizedGeometry>) -> Self {
        let by_mesh = geometries
            .iter()
            .enumerate()
            .map(|(i, g)| (g.mesh, GeometryId(i as u32)))
            .collect();
        Self {
            geometries,
            by_mesh,
        }
    }

    pub fn into_geometries(self) -> Vec<OptimizedGeometry> {
        self.geometries
    }
}
