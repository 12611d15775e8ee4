//! Structural properties every built tree must satisfy.

use std::collections::BTreeSet;

use glam::{Mat4, Vec3};
use nebula_math::{Aabb, Frustum, Ray, Tolerance, Triangle};
use nebula_partition::{
    AllVisible, Axis, Chunk, DrawDeduper, Leaf, MeshId, MeshSet, MeshSource, NoProgress,
    PartitionSettings, PartitionTree, RayQuery, StaticMesh,
};

type PrimitiveKey = (MeshId, u32, Vec<u32>);

/// Scattered triangles of mixed sizes over a 16 x 16 floor, split across two
/// meshes and several chunks with different shading ids.
fn scattered_world() -> MeshSet {
    let mut set = MeshSet::new();
    for (mesh, offset) in [(1u32, 0.0f32), (2, 0.37)] {
        let mut positions = Vec::new();
        let mut indices = Vec::new();
        for i in 0..48u32 {
            let x = ((i * 7) % 16) as f32 + offset;
            let z = ((i * 11) % 16) as f32 + offset;
            let size = 0.25 + (i % 5) as f32 * 0.9;
            let base = positions.len() as u32;
            positions.extend([
                Vec3::new(x, (i % 3) as f32, z),
                Vec3::new(x + size, (i % 3) as f32, z),
                Vec3::new(x, (i % 3) as f32 + 0.5, z + size),
            ]);
            indices.extend([base, base + 1, base + 2]);
        }
        let chunks = vec![
            Chunk {
                shading_id: Some(3),
                ..Chunk::triangles(0, 48)
            },
            Chunk {
                order: 1,
                ..Chunk::triangles(48, 48)
            },
            Chunk {
                shading_id: Some(1),
                material_id: 4,
                ..Chunk::triangles(96, 48)
            },
        ];
        set.insert(StaticMesh::new(MeshId(mesh), positions, indices, chunks))
            .unwrap();
    }
    set
}

fn settings() -> PartitionSettings {
    PartitionSettings::quad(Axis::Y)
        .with_max_primitives_per_leaf(6)
        .with_max_depth(4)
}

/// A single split of the root, whatever the primitive count.
fn depth_one() -> PartitionSettings {
    PartitionSettings::quad(Axis::Y)
        .with_max_primitives_per_leaf(0)
        .with_max_depth(1)
}

fn build(meshes: &MeshSet, settings: &PartitionSettings) -> PartitionTree {
    PartitionTree::build(meshes, settings, Tolerance::default(), &mut NoProgress).unwrap()
}

/// Every primitive of every mesh, with its bounds.
fn all_primitives(meshes: &MeshSet) -> Vec<(PrimitiveKey, Aabb)> {
    let mut out = Vec::new();
    for mesh in meshes.iter() {
        let geometry = mesh.lock_geometry().unwrap();
        for (c, chunk) in mesh.chunks().iter().enumerate() {
            for tri in geometry.chunk_indices(chunk).unwrap().chunks_exact(3) {
                let triangle = Triangle::new(
                    geometry.position(tri[0]).unwrap(),
                    geometry.position(tri[1]).unwrap(),
                    geometry.position(tri[2]).unwrap(),
                );
                out.push(((mesh.id(), c as u32, tri.to_vec()), triangle.bounds()));
            }
        }
    }
    out
}

fn leaf_keys(tree: &PartitionTree, leaf: &Leaf) -> BTreeSet<PrimitiveKey> {
    tree.leaf_primitives(leaf)
        .map(|p| (p.mesh, p.chunk, p.vertices.to_vec()))
        .collect()
}

fn contains_box(outer: &Aabb, inner: &Aabb) -> bool {
    outer.contains_point(inner.min) && outer.contains_point(inner.max)
}

fn see_everything() -> Frustum {
    let proj = Mat4::orthographic_rh(-50.0, 50.0, -50.0, 50.0, 0.1, 1000.0);
    let view = Mat4::look_at_rh(Vec3::new(8.0, 200.0, 8.0), Vec3::new(8.0, 0.0, 8.0), Vec3::NEG_Z);
    Frustum::from_view_projection(&(proj * view))
}

#[test]
fn every_primitive_lands_in_some_leaf() {
    let meshes = scattered_world();
    let tree = build(&meshes, &settings());
    assert!(tree.leaves().len() > 1);

    let referenced: BTreeSet<PrimitiveKey> = tree
        .leaves()
        .iter()
        .flat_map(|leaf| leaf_keys(&tree, leaf))
        .collect();
    for (key, _) in all_primitives(&meshes) {
        assert!(referenced.contains(&key), "{key:?} is in no leaf");
    }
}

#[test]
fn contained_primitives_are_never_lost() {
    let meshes = scattered_world();
    let tree = build(&meshes, &settings());
    let primitives = all_primitives(&meshes);

    for node in tree.nodes() {
        let Some(leaf) = tree.leaf_of(node) else {
            continue;
        };
        assert_eq!(leaf.bounds, node.bounds);
        let keys = leaf_keys(&tree, leaf);
        for (key, bounds) in &primitives {
            if contains_box(&node.bounds, bounds) {
                assert!(keys.contains(key), "{key:?} missing from {:?}", node.bounds);
            }
        }
    }
}

#[test]
fn straddling_primitive_is_duplicated_across_leaves() {
    let mut meshes = MeshSet::new();
    meshes
        .insert(StaticMesh::triangles(
            MeshId(9),
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(4.0, 0.0, 4.0),
                Vec3::new(1.9, 0.0, 2.1),
                Vec3::new(2.1, 0.0, 1.9),
                Vec3::new(2.0, 0.0, 2.0),
            ],
            vec![2, 3, 4],
        ))
        .unwrap();
    let settings = depth_one();
    let tree = build(&meshes, &settings);
    assert_eq!(tree.leaves().len(), 4);

    let holders: Vec<usize> = tree
        .leaves()
        .iter()
        .enumerate()
        .filter(|(_, leaf)| tree.leaf_primitives(leaf).next().is_some())
        .map(|(i, _)| i)
        .collect();

    // Siblings are visited in order: once a child fully contains the
    // triangle, later siblings never see it; before that, every child the
    // approximate test reports as overlapping holds a copy.
    let triangle = Triangle::new(
        Vec3::new(1.9, 0.0, 2.1),
        Vec3::new(2.1, 0.0, 1.9),
        Vec3::new(2.0, 0.0, 2.0),
    );
    let tol = Tolerance::default();
    let mut expected = Vec::new();
    for (i, leaf) in tree.leaves().iter().enumerate() {
        if triangle.contained_by(&leaf.bounds, &tol) {
            expected.push(i);
            break;
        }
        if triangle.intersects_aabb_approx(&leaf.bounds, &tol) {
            expected.push(i);
        }
    }
    assert!(expected.len() >= 2, "straddler overlaps {expected:?}");
    assert_eq!(holders, expected);
}

#[test]
fn tree_is_complete() {
    for settings in [
        settings(),
        PartitionSettings::oct().with_max_primitives_per_leaf(10).with_max_depth(3),
        PartitionSettings::unpartitioned(),
    ] {
        let tree = build(&scattered_world(), &settings);
        let arity = settings.child_count();
        let mut attached = BTreeSet::new();

        for (i, node) in tree.nodes().iter().enumerate() {
            assert!(node.children.is_empty() || node.children.len() == arity);
            assert_eq!(node.leaf.is_some(), node.children.is_empty());
            if let Some(leaf) = node.leaf {
                assert!(attached.insert(leaf));
            }
            for &child in &node.children {
                let child_node = tree.node(child).unwrap();
                assert_eq!(child_node.parent.map(|p| p.0 as usize), Some(i));
                assert!(contains_box(&node.bounds, &child_node.bounds));
            }
        }
        assert_eq!(attached.len(), tree.leaves().len());
    }
}

#[test]
fn rebuilding_is_idempotent() {
    let meshes = scattered_world();
    let first = build(&meshes, &settings());
    let second = build(&meshes, &settings());
    assert_eq!(first, second);
}

#[test]
fn submit_draws_each_physical_chunk_once() {
    let meshes = scattered_world();
    let tree = build(&meshes, &settings());
    let list = tree.build_render_list(&see_everything(), &AllVisible);
    assert!(!list.is_empty());

    let referenced: BTreeSet<(u32, u32)> = list
        .batches()
        .iter()
        .flat_map(|batch| {
            let geometry = tree.geometry().get(batch.geometry).unwrap();
            batch
                .chunk_index_range()
                .map(move |e| (batch.geometry.0, geometry.chunk_indices()[e as usize]))
        })
        .collect();

    let mut drawn = Vec::new();
    let mut dedup = DrawDeduper::new();
    let submitted = list.submit(tree.geometry(), &mut dedup, |batch, _, chunk| {
        drawn.push((batch.geometry.0, chunk.start));
    });
    assert_eq!(submitted, drawn.len());

    let unique: BTreeSet<_> = drawn.iter().copied().collect();
    assert_eq!(unique.len(), drawn.len(), "a chunk was drawn twice");
    assert_eq!(drawn.len(), referenced.len());

    // A second frame draws the same set again.
    let again = list.submit(tree.geometry(), &mut dedup, |_, _, _| {});
    assert_eq!(again, submitted);
}

#[test]
fn render_list_groups_follow_sort_order() {
    let meshes = scattered_world();
    let tree = build(&meshes, &settings());
    let list = tree.build_render_list(&see_everything(), &AllVisible);
    assert!(list.is_sorted());

    let orders: Vec<i32> = list.batches().iter().map(|b| b.order).collect();
    assert!(orders.windows(2).all(|w| w[0] <= w[1]));
    let grouped: usize = list.groups().map(|g| g.batches.len()).sum();
    assert_eq!(grouped, list.len());
}

#[test]
fn ray_query_on_empty_tree_finds_nothing() {
    let meshes = MeshSet::new();
    let tree = build(&meshes, &PartitionSettings::default());
    assert_eq!(tree.leaves().len(), 1);
    let ray = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y);
    assert!(tree.query_ray(&meshes, &ray, RayQuery::All).is_empty());
}

#[test]
fn box_containment_is_inclusive() {
    let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
    assert!(bounds.contains_point(Vec3::ZERO));
    assert!(bounds.contains_point(Vec3::ONE));
    assert!(bounds.contains_point(Vec3::new(1.0, 0.5, 0.0)));
    assert!(!bounds.contains_point(Vec3::new(1.0 + 1e-3, 0.5, 0.5)));
}

#[test]
fn primitive_on_split_plane_stays_with_first_child() {
    // A thin triangle lying exactly on x = 2, the first split of a 4 x 4
    // world. Boundaries are inclusive, so the low-x child contains it and
    // nothing is left over for its sibling.
    let mut meshes = MeshSet::new();
    meshes
        .insert(StaticMesh::new(
            MeshId(3),
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(4.0, 0.0, 4.0),
                Vec3::new(2.0, 0.0, 0.5),
                Vec3::new(2.0, 1.0, 0.5),
                Vec3::new(2.0, 0.0, 1.0),
            ],
            vec![2, 3, 4],
            vec![Chunk::triangles(0, 3)],
        ))
        .unwrap();
    let tree = build(&meshes, &depth_one());
    let holders: Vec<usize> = tree
        .leaves()
        .iter()
        .enumerate()
        .filter(|(_, leaf)| tree.leaf_primitives(leaf).next().is_some())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(holders, vec![0]);
}
