//! Static-world spatial partitioning and render-batch compilation.
//!
//! A [`PartitionTree`] is built once over a [`MeshSet`] of immutable meshes.
//! Space is split into a quadtree (around one up axis) or an octree until the
//! limits in [`PartitionSettings`] are met. Each terminal node owns a [`Leaf`]
//! whose [`RenderBatch`]es point into per-mesh [`OptimizedGeometry`]. Primitives
//! straddling a split are referenced from every leaf they touch.
//!
//! Per frame, [`PartitionTree::build_render_list`] collects the batches of the
//! leaves inside a view frustum, and [`RenderList::submit`] hands each physical
//! chunk to the renderer once. [`PartitionTree::query_ray`] answers picking
//! queries against the same tree.

mod builder;
mod compiler;
mod error;
mod geometry_cache;
mod membership;
mod mesh;
mod progress;
mod pvs;
mod ray_query;
mod render_list;
mod settings;
mod tree;
mod world;

pub mod persist;

pub use compiler::compile_leaf;
pub use error::{MeshAccessError, PartitionError};
pub use geometry_cache::{CompactChunk, GeometryCache, GeometryId, OptimizedGeometry};
pub use membership::{IndexSubset, MembershipEntry, MembershipKey, MembershipMap, Placement};
pub use mesh::{
    AllVisible, Chunk, MeshGeometry, MeshId, MeshSet, MeshSource, MeshVisibility, StaticMesh,
    Topology,
};
pub use persist::{BakedWorld, PersistError};
pub use progress::{BuildPhase, LogProgress, NoProgress, ProgressSink};
pub use pvs::{ConservativePvs, LeafVisibility, PvsHook, compute_pvs};
pub use ray_query::{RayHit, RayQuery};
pub use render_list::{DrawDeduper, RenderGroup, RenderGroupIter, RenderList};
pub use settings::{Axis, PartitionMode, PartitionSettings, SettingsError};
pub use tree::{
    Leaf, LeafId, NodeId, PartitionTree, PrimitiveRef, RenderBatch, SpatialNode, TreeStats,
};
pub use world::StaticWorld;
