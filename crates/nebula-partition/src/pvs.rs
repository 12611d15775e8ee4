//! Potential-visibility-set hook.
//!
//! A PVS generator receives the finished leaves and returns one bit set per
//! leaf: bit `j` of leaf `i`'s set means leaf `j` may be visible from leaf
//! `i`. No real generator ships here; [`ConservativePvs`] marks every leaf
//! visible from every other.

use serde::{Deserialize, Serialize};

use crate::error::PartitionError;
use crate::progress::{BuildPhase, ProgressSink};
use crate::tree::{Leaf, LeafId, PartitionTree};

/// Fixed-size bit set over the leaves of a tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafVisibility {
    words: Vec<u64>,
    len: usize,
}

impl LeafVisibility {
    /// A set of `len` leaves with nothing visible.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// A set of `len` leaves with everything visible.
    pub fn all_visible(len: usize) -> Self {
        let mut set = Self::new(len);
        for leaf in 0..len {
            set.insert(LeafId(leaf as u32));
        }
        set
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark `leaf` visible. Out-of-range ids are ignored.
    pub fn insert(&mut self, leaf: LeafId) {
        let i = leaf.0 as usize;
        if i < self.len {
            self.words[i / 64] |= 1u64 << (i % 64);
        }
    }

    pub fn remove(&mut self, leaf: LeafId) {
        let i = leaf.0 as usize;
        if i < self.len {
            self.words[i / 64] &= !(1u64 << (i % 64));
        }
    }

    /// Out-of-range ids are never visible.
    pub fn contains(&self, leaf: LeafId) -> bool {
        let i = leaf.0 as usize;
        i < self.len && self.words[i / 64] & (1u64 << (i % 64)) != 0
    }

    /// Number of visible leaves.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = LeafId> + '_ {
        (0..self.len)
            .map(|i| LeafId(i as u32))
            .filter(|&leaf| self.contains(leaf))
    }
}

/// Computes per-leaf visibility once a tree is built.
pub trait PvsHook {
    fn compute(&mut self, leaves: &[Leaf]) -> Vec<LeafVisibility>;
}

/// Every leaf sees every leaf.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConservativePvs;

impl PvsHook for ConservativePvs {
    fn compute(&mut self, leaves: &[Leaf]) -> Vec<LeafVisibility> {
        vec![LeafVisibility::all_visible(leaves.len()); leaves.len()]
    }
}

/// Run `hook` over the leaves of `tree`, reporting the [`BuildPhase::Pvs`]
/// phase, and check that it produced one full-width set per leaf.
pub fn compute_pvs(
    tree: &PartitionTree,
    hook: &mut dyn PvsHook,
    progress: &mut impl ProgressSink,
) -> Result<Vec<LeafVisibility>, PartitionError> {
    progress.on_progress(BuildPhase::Pvs, 0.0);
    let leaves = tree.leaves();
    let sets = hook.compute(leaves);

    if sets.len() != leaves.len() || sets.iter().any(|s| s.len() != leaves.len()) {
        return Err(PartitionError::PvsMismatch {
            leaves: leaves.len(),
            sets: sets.len(),
        });
    }

    progress.on_progress(BuildPhase::Pvs, 100.0);
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use nebula_math::Tolerance;

    use super::*;
    use crate::mesh::MeshSet;
    use crate::progress::NoProgress;
    use crate::settings::PartitionSettings;

    #[test]
    fn test_bit_set_operations() {
        let mut set = LeafVisibility::new(130);
        assert_eq!(set.count(), 0);
        set.insert(LeafId(0));
        set.insert(LeafId(64));
        set.insert(LeafId(129));
        set.insert(LeafId(500));
        assert!(set.contains(LeafId(64)));
        assert!(!set.contains(LeafId(65)));
        assert!(!set.contains(LeafId(500)));
        assert_eq!(set.count(), 3);

        set.remove(LeafId(64));
        let visible: Vec<_> = set.iter().collect();
        assert_eq!(visible, vec![LeafId(0), LeafId(129)]);
    }

    #[test]
    fn test_all_visible() {
        let set = LeafVisibility::all_visible(70);
        assert_eq!(set.count(), 70);
        assert!(LeafVisibility::all_visible(0).is_empty());
    }

    #[test]
    fn test_conservative_pvs_over_tree() {
        let tree = PartitionTree::build(
            &MeshSet::new(),
            &PartitionSettings::default(),
            Tolerance::default(),
            &mut NoProgress,
        )
        .unwrap();

        let mut phases = Vec::new();
        let mut sink = |phase: BuildPhase, percent: f32| phases.push((phase, percent));
        let sets = compute_pvs(&tree, &mut ConservativePvs, &mut sink).unwrap();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].contains(LeafId(0)));
        assert_eq!(phases, vec![(BuildPhase::Pvs, 0.0), (BuildPhase::Pvs, 100.0)]);
    }

    struct ShortPvs;

    impl PvsHook for ShortPvs {
        fn compute(&mut self, _leaves: &[Leaf]) -> Vec<LeafVisibility> {
            Vec::new()
        }
    }

    #[test]
    fn test_hook_with_wrong_shape_is_rejected() {
        let tree = PartitionTree::build(
            &MeshSet::new(),
            &PartitionSettings::default(),
            Tolerance::default(),
            &mut NoProgress,
        )
        .unwrap();
        let err = compute_pvs(&tree, &mut ShortPvs, &mut NoProgress).unwrap_err();
        assert!(matches!(
            err,
            PartitionError::PvsMismatch { leaves: 1, sets: 0 }
        ));
    }
}
