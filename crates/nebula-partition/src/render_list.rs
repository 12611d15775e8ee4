//! Per-frame render list assembly and draw-time deduplication.
//!
//! The tree is walked against a view frustum and the batches of every
//! visible leaf are collected, then sorted by order, geometry and shading
//! state so batches that share state become contiguous. A chunk straddling
//! several leaves is referenced by several batches; [`DrawDeduper`] makes sure
//! it is drawn once per frame.

use nebula_math::Frustum;

use crate::geometry_cache::{CompactChunk, GeometryCache, GeometryId, OptimizedGeometry};
use crate::mesh::MeshVisibility;
use crate::tree::{NodeId, PartitionTree, RenderBatch};

/// Batches collected for one frame.
#[derive(Clone, Debug, Default)]
pub struct RenderList {
    batches: Vec<RenderBatch>,
    sorted: bool,
}

impl RenderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            batches: Vec::with_capacity(capacity),
            sorted: false,
        }
    }

    pub fn push(&mut self, batch: RenderBatch) {
        self.batches.push(batch);
        self.sorted = false;
    }

    /// Stable sort by order, then geometry, shading, technique and material.
    pub fn sort(&mut self) {
        self.batches.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then(a.geometry.cmp(&b.geometry))
                .then(a.shading_id.cmp(&b.shading_id))
                .then(a.technique_id.cmp(&b.technique_id))
                .then(a.material_id.cmp(&b.material_id))
        });
        self.sorted = true;
    }

    /// Clear for reuse next frame, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.sorted = false;
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn batches(&self) -> &[RenderBatch] {
        &self.batches
    }

    /// Runs of batches sharing geometry and shading state.
    ///
    /// For correct grouping, call [`sort`](Self::sort) first.
    pub fn groups(&self) -> RenderGroupIter<'_> {
        RenderGroupIter {
            batches: &self.batches,
            cursor: 0,
        }
    }

    /// Hand every physical chunk referenced by the list to `draw`, once.
    ///
    /// Returns the number of chunks submitted.
    pub fn submit<F>(&self, cache: &GeometryCache, dedup: &mut DrawDeduper, mut draw: F) -> usize
    where
        F: FnMut(&RenderBatch, &OptimizedGeometry, &CompactChunk),
    {
        dedup.begin_frame();
        let mut submitted = 0;
        for batch in &self.batches {
            let Some(geometry) = cache.get(batch.geometry) else {
                continue;
            };
            dedup.bind(batch.geometry, geometry.chunk_indices().len());

            for entry in batch.chunk_index_range() {
                let Some(&position) = geometry.chunk_indices().get(entry as usize) else {
                    continue;
                };
                let Some(chunk) = geometry.chunks().get(position as usize) else {
                    continue;
                };
                if dedup.mark(position) {
                    draw(batch, geometry, chunk);
                    submitted += 1;
                }
            }
        }
        submitted
    }
}

/// Batches sharing geometry and shading state.
#[derive(Debug)]
pub struct RenderGroup<'a> {
    pub geometry: GeometryId,
    pub shading_id: Option<u32>,
    pub technique_id: u32,
    pub material_id: u32,
    pub batches: &'a [RenderBatch],
}

/// Iterator over [`RenderGroup`]s of a [`RenderList`].
pub struct RenderGroupIter<'a> {
    batches: &'a [RenderBatch],
    cursor: usize,
}

impl<'a> Iterator for RenderGroupIter<'a> {
    type Item = RenderGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let batches = self.batches;
        let first = batches.get(self.cursor)?;
        let start = self.cursor;
        let same_state = |b: &RenderBatch| {
            b.geometry == first.geometry
                && b.shading_id == first.shading_id
                && b.technique_id == first.technique_id
                && b.material_id == first.material_id
        };

        while self.cursor < batches.len() && same_state(&batches[self.cursor]) {
            self.cursor += 1;
        }

        Some(RenderGroup {
            geometry: first.geometry,
            shading_id: first.shading_id,
            technique_id: first.technique_id,
            material_id: first.material_id,
            batches: &batches[start..self.cursor],
        })
    }
}

/// Tracks which chunks of the bound geometry were already drawn this frame.
///
/// The flag array is sized to the bound geometry's chunk-index length and
/// cleared whenever a different geometry is bound.
#[derive(Clone, Debug, Default)]
pub struct DrawDeduper {
    bound: Option<GeometryId>,
    drawn: Vec<bool>,
}

impl DrawDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the bound geometry.
    pub fn begin_frame(&mut self) {
        self.bound = None;
    }

    /// Bind `geometry`; clears the flags if it differs from the bound one.
    pub fn bind(&mut self, geometry: GeometryId, chunk_index_len: usize) {
        if self.bound != Some(geometry) {
            self.bound = Some(geometry);
            self.drawn.clear();
            self.drawn.resize(chunk_index_len, false);
        }
    }

    /// Mark compact chunk `position` drawn. Returns `false` if it already
    /// was, or lies outside the flag array.
    pub fn mark(&mut self, position: u32) -> bool {
        match self.drawn.get_mut(position as usize) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }
}

impl PartitionTree {
    /// Collect the batches of every leaf intersecting `frustum`, skipping
    /// empty batches and hidden meshes, and sort them.
    pub fn build_render_list(
        &self,
        frustum: &Frustum,
        visibility: &impl MeshVisibility,
    ) -> RenderList {
        let mut list = RenderList::new();
        self.build_render_list_into(frustum, visibility, &mut list);
        list
    }

    /// Like [`build_render_list`](Self::build_render_list), reusing `list`.
    pub fn build_render_list_into(
        &self,
        frustum: &Frustum,
        visibility: &impl MeshVisibility,
        list: &mut RenderList,
    ) {
        list.clear();
        let mut stack = vec![PartitionTree::ROOT];

        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if !frustum.intersects_aabb(&node.bounds) {
                continue;
            }
            if let Some(leaf) = self.leaf_of(node) {
                for batch in &leaf.batches {
                    if batch.count > 0 && !visibility.is_hidden(batch.mesh) {
                        list.push(batch.clone());
                    }
                }
            }
            stack.extend(node.children.iter().rev().copied());
        }

        list.sort();
    }

    /// Leaves intersecting `frustum`, in depth-first order.
    pub fn visible_leaves(&self, frustum: &Frustum) -> Vec<NodeId> {
        let mut visible = Vec::new();
        let mut stack = vec![PartitionTree::ROOT];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if !frustum.intersects_aabb(&node.bounds) {
                continue;
            }
            if node.is_terminal() {
                visible.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshId;

    fn batch(
        order: i32,
        geometry: u32,
        shading: Option<u32>,
        start: u32,
        count: u32,
    ) -> RenderBatch {
        RenderBatch {
            order,
            mesh: MeshId(geometry),
            geometry: GeometryId(geometry),
            start,
            count,
            shading_id: shading,
            technique_id: 0,
            material_id: 0,
        }
    }

    #[test]
    fn test_empty_list_has_no_groups() {
        let list = RenderList::new();
        assert!(list.is_empty());
        assert_eq!(list.groups().count(), 0);
    }

    #[test]
    fn test_sort_is_order_then_geometry_then_shading() {
        let mut list = RenderList::new();
        list.push(batch(1, 0, None, 0, 1));
        list.push(batch(0, 2, Some(1), 0, 1));
        list.push(batch(0, 1, Some(3), 0, 1));
        list.push(batch(0, 1, None, 0, 1));
        list.sort();
        assert!(list.is_sorted());

        let keys: Vec<_> = list
            .batches()
            .iter()
            .map(|b| (b.order, b.geometry.0, b.shading_id))
            .collect();
        assert_eq!(
            keys,
            vec![(0, 1, None), (0, 1, Some(3)), (0, 2, Some(1)), (1, 0, None)]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let mut list = RenderList::new();
        list.push(batch(0, 1, None, 5, 1));
        list.push(batch(0, 1, None, 2, 1));
        list.push(batch(0, 1, None, 9, 1));
        list.sort();
        let starts: Vec<u32> = list.batches().iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![5, 2, 9]);
    }

    #[test]
    fn test_groups_share_geometry_and_shading() {
        let mut list = RenderList::new();
        list.push(batch(0, 1, None, 0, 1));
        list.push(batch(0, 1, None, 1, 1));
        list.push(batch(0, 1, Some(2), 2, 1));
        list.push(batch(1, 1, Some(2), 3, 1));
        list.sort();

        let groups: Vec<_> = list.groups().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].batches.len(), 2);
        assert_eq!(groups[1].shading_id, Some(2));
        assert_eq!(groups[1].batches.len(), 2);
    }

    #[test]
    fn test_clear_resets_list() {
        let mut list = RenderList::with_capacity(8);
        list.push(batch(0, 1, None, 0, 1));
        list.sort();
        list.clear();
        assert!(list.is_empty());
        assert!(!list.is_sorted());
    }

    #[test]
    fn test_deduper_clears_on_rebind() {
        let mut dedup = DrawDeduper::new();
        dedup.bind(GeometryId(0), 4);
        assert!(dedup.mark(2));
        assert!(!dedup.mark(2));
        assert!(!dedup.mark(10));

        dedup.bind(GeometryId(0), 4);
        assert!(!dedup.mark(2));

        dedup.bind(GeometryId(1), 4);
        assert!(dedup.mark(2));

        dedup.begin_frame();
        dedup.bind(GeometryId(1), 4);
        assert!(dedup.mark(2));
    }
}
