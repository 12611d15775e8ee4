//! Error types for partition construction.

use crate::mesh::MeshId;
use crate::settings::SettingsError;

/// A mesh's vertex or index data could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshAccessError {
    /// The mesh has no index buffer yet (see `MeshSource::ensure_indices`).
    #[error("index buffer not available")]
    MissingIndices,
    /// The provider refused to hand out its buffers.
    #[error("geometry could not be locked: {0}")]
    Locked(String),
    /// An index points past the end of the vertex buffer.
    #[error("vertex index {index} out of range ({len} vertices)")]
    IndexOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of vertices available.
        len: usize,
    },
    /// A chunk's index range runs past the end of the index buffer.
    #[error("chunk index range {start}..{end} exceeds index buffer of {len}")]
    ChunkOutOfRange {
        /// First index of the chunk.
        start: usize,
        /// One past the last index of the chunk.
        end: usize,
        /// Length of the index buffer.
        len: usize,
    },
}

/// Errors that abort a partition build. A failed build leaves no tree
/// behind; the caller retries the whole build.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// Inconsistent settings, reported before any work starts.
    #[error("invalid partition settings: {0}")]
    Settings(#[from] SettingsError),

    /// A mesh's buffers could not be read during filtering or leaf
    /// materialization.
    #[error("mesh {mesh}: {source}")]
    MeshAccess {
        /// The mesh that failed.
        mesh: MeshId,
        /// What went wrong.
        #[source]
        source: MeshAccessError,
    },

    /// Two meshes in one set share an id.
    #[error("duplicate mesh id {0}")]
    DuplicateMesh(MeshId),

    /// The membership map refers to a mesh the set no longer contains.
    #[error("unknown mesh {0}")]
    UnknownMesh(MeshId),

    /// The membership map refers to a chunk the mesh does not have.
    #[error("mesh {mesh} has no chunk {chunk}")]
    MissingChunk {
        /// The mesh that was queried.
        mesh: MeshId,
        /// The chunk index that was requested.
        chunk: u32,
    },

    /// A PVS hook did not return one full-width set per leaf.
    #[error("pvs hook returned {sets} sets for {leaves} leaves")]
    PvsMismatch {
        /// Leaves in the tree.
        leaves: usize,
        /// Sets returned by the hook.
        sets: usize,
    },
}

impl PartitionError {
    pub(crate) fn mesh_access(mesh: MeshId) -> impl FnOnce(MeshAccessError) -> Self {
        move |source| Self::MeshAccess { mesh, source }
    }
}
