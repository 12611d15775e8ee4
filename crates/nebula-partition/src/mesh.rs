//! Mesh provider contract: the static geometry the partitioner consumes.
//!
//! Meshes are owned by the caller and only read during a build (and by ray
//! queries afterwards). [`StaticMesh`] is the plain in-memory provider used by
//! the bake tool and the tests.

use std::fmt;
use std::ops::Range;

use glam::Vec3;
use nebula_math::Aabb;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{MeshAccessError, PartitionError};

/// Opaque identity of a source mesh.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MeshId(pub u32);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a chunk's indices are grouped into primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    Triangles,
    Lines,
    Points,
}

impl Topology {
    /// Number of indices that make up one primitive.
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            Topology::Triangles => 3,
            Topology::Lines => 2,
            Topology::Points => 1,
        }
    }
}

/// A run of primitives within a mesh sharing topology and shading state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Primitive topology.
    pub topology: Topology,
    /// Shading-state id; `None` when the author assigned none.
    #[serde(default)]
    pub shading_id: Option<u32>,
    /// Authoring-time draw priority (lower draws first).
    #[serde(default)]
    pub order: i32,
    /// First index into the mesh's shared index buffer.
    pub start: u32,
    /// Number of indices in the chunk.
    pub count: u32,
    /// Technique used to draw the chunk.
    #[serde(default)]
    pub technique_id: u32,
    /// Material bound while drawing the chunk.
    #[serde(default)]
    pub material_id: u32,
}

impl Chunk {
    /// A triangle chunk covering `count` indices from `start`, with default
    /// shading and order.
    pub fn triangles(start: u32, count: u32) -> Self {
        Self {
            topology: Topology::Triangles,
            shading_id: None,
            order: 0,
            start,
            count,
            technique_id: 0,
            material_id: 0,
        }
    }

    /// Range of the chunk within the shared index buffer.
    pub fn index_range(&self) -> Range<usize> {
        self.start as usize..self.start as usize + self.count as usize
    }
}

/// Read access to a mesh's buffers, handed out by [`MeshSource::lock_geometry`].
#[derive(Clone, Copy, Debug)]
pub struct MeshGeometry<'a> {
    /// Vertex positions.
    pub positions: &'a [Vec3],
    /// Shared index buffer for every chunk.
    pub indices: &'a [u32],
}

impl<'a> MeshGeometry<'a> {
    /// Position of vertex `index`.
    pub fn position(&self, index: u32) -> Result<Vec3, MeshAccessError> {
        self.positions
            .get(index as usize)
            .copied()
            .ok_or(MeshAccessError::IndexOutOfRange {
                index,
                len: self.positions.len(),
            })
    }

    /// The slice of the index buffer belonging to `chunk`.
    pub fn chunk_indices(&self, chunk: &Chunk) -> Result<&'a [u32], MeshAccessError> {
        let range = chunk.index_range();
        self.indices
            .get(range.clone())
            .ok_or(MeshAccessError::ChunkOutOfRange {
                start: range.start,
                end: range.end,
                len: self.indices.len(),
            })
    }
}

/// A static mesh the partitioner can read.
///
/// Implementations must stay unchanged for the duration of a build.
pub trait MeshSource: Send + Sync {
    /// Stable identity of the mesh.
    fn id(&self) -> MeshId;

    /// Bounding box of the mesh's vertices.
    fn bounds(&self) -> Aabb;

    /// The mesh's primitive groups.
    fn chunks(&self) -> &[Chunk];

    /// Lock the vertex and index buffers for reading.
    fn lock_geometry(&self) -> Result<MeshGeometry<'_>, MeshAccessError>;

    /// Generate a default index buffer (`0..vertex_count`) if the mesh has none.
    fn ensure_indices(&mut self);

    /// Hidden meshes are skipped when building render lists.
    fn is_hidden(&self) -> bool {
        false
    }
}

/// In-memory mesh with owned buffers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaticMesh {
    pub id: MeshId,
    pub positions: Vec<Vec3>,
    /// `None` until [`MeshSource::ensure_indices`] generates one.
    #[serde(default)]
    pub indices: Option<Vec<u32>>,
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub hidden: bool,
}

impl StaticMesh {
    pub fn new(id: MeshId, positions: Vec<Vec3>, indices: Vec<u32>, chunks: Vec<Chunk>) -> Self {
        Self {
            id,
            positions,
            indices: Some(indices),
            chunks,
            hidden: false,
        }
    }

    /// A mesh holding a single triangle chunk over all of `indices`.
    pub fn triangles(id: MeshId, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let chunk = Chunk::triangles(0, indices.len() as u32);
        Self::new(id, positions, indices, vec![chunk])
    }
}

impl MeshSource for StaticMesh {
    fn id(&self) -> MeshId {
        self.id
    }

    fn bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().copied()).unwrap_or(Aabb::EMPTY)
    }

    fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn lock_geometry(&self) -> Result<MeshGeometry<'_>, MeshAccessError> {
        let indices = self
            .indices
            .as_deref()
            .ok_or(MeshAccessError::MissingIndices)?;
        Ok(MeshGeometry {
            positions: &self.positions,
            indices,
        })
    }

    fn ensure_indices(&mut self) {
        if self.indices.is_none() {
            self.indices = Some((0..self.positions.len() as u32).collect());
        }
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }
}

/// The set of meshes a tree is built from, addressable by [`MeshId`].
#[derive(Default)]
pub struct MeshSet {
    meshes: Vec<Box<dyn MeshSource>>,
    slots: FxHashMap<MeshId, usize>,
}

impl MeshSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh. Ids must be unique within the set.
    pub fn insert<M: MeshSource + 'static>(&mut self, mesh: M) -> Result<MeshId, PartitionError> {
        let id = mesh.id();
        if self.slots.contains_key(&id) {
            return Err(PartitionError::DuplicateMesh(id));
        }
        self.slots.insert(id, self.meshes.len());
        self.meshes.push(Box::new(mesh));
        Ok(id)
    }

    /// Look a mesh up by id.
    pub fn get(&self, id: MeshId) -> Option<&dyn MeshSource> {
        self.slots.get(&id).map(|&slot| self.meshes[slot].as_ref())
    }

    /// Meshes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn MeshSource> {
        self.meshes.iter().map(|m| m.as_ref())
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Union of every mesh's bounds ([`Aabb::EMPTY`] for an empty set).
    pub fn bounds(&self) -> Aabb {
        self.iter()
            .map(|m| m.bounds())
            .filter(|b| !b.is_empty())
            .fold(Aabb::EMPTY, |acc, b| acc.union(&b))
    }

    /// Ask every mesh to generate default index buffers where missing.
    pub fn ensure_indices(&mut self) {
        for mesh in &mut self.meshes {
            mesh.ensure_indices();
        }
    }
}

/// Answers "is this mesh hidden?" while building render lists.
pub trait MeshVisibility {
    fn is_hidden(&self, mesh: MeshId) -> bool;
}

impl MeshVisibility for MeshSet {
    fn is_hidden(&self, mesh: MeshId) -> bool {
        self.get(mesh).is_some_and(|m| m.is_hidden())
    }
}

impl MeshVisibility for FxHashSet<MeshId> {
    fn is_hidden(&self, mesh: MeshId) -> bool {
        self.contains(&mesh)
    }
}

/// Visibility source that hides nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllVisible;

impl MeshVisibility for AllVisible {
    fn is_hidden(&self, _mesh: MeshId) -> bool {
        false
    }
}
