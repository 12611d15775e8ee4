//! Partition settings and their validation.

use serde::{Deserialize, Serialize};

/// Shape of the spatial subdivision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionMode {
    /// Never subdivide; the root is the only leaf.
    None,
    /// Split into 4 children across the two axes other than the partition axis.
    Quad,
    /// Split into 8 children across all three axes.
    Oct,
}

/// A world axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Errors detected before a build starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("quadtree partitioning requires a partition axis")]
    MissingAxis,
    #[error("max leaf size must be finite and non-negative, got {0}")]
    InvalidLeafSize(f32),
}

/// Controls when and how the builder subdivides.
///
/// Each limit is disabled when zero. A node subdivides only if every enabled
/// limit asks for it and at least one limit is enabled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionSettings {
    pub mode: PartitionMode,
    /// Axis left unsplit in quadtree mode (the "up" axis).
    pub axis: Option<Axis>,
    /// Subdivide while any split-axis extent exceeds this size.
    pub max_leaf_size: f32,
    /// Subdivide while a node holds more primitives than this.
    pub max_primitives_per_leaf: u32,
    /// Subdivide while the node is shallower than this.
    pub max_depth: u32,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            mode: PartitionMode::Quad,
            axis: Some(Axis::Y),
            max_leaf_size: 0.0,
            max_primitives_per_leaf: 1024,
            max_depth: 8,
        }
    }
}

static X_Y_Z: [usize; 3] = [0, 1, 2];
static X_Z: [usize; 2] = [0, 2];

impl PartitionSettings {
    /// Settings that never subdivide.
    pub fn unpartitioned() -> Self {
        Self {
            mode: PartitionMode::None,
            axis: None,
            max_leaf_size: 0.0,
            max_primitives_per_leaf: 0,
            max_depth: 0,
        }
    }

    pub fn quad(axis: Axis) -> Self {
        Self {
            mode: PartitionMode::Quad,
            axis: Some(axis),
            ..Self::default()
        }
    }

    pub fn oct() -> Self {
        Self {
            mode: PartitionMode::Oct,
            axis: None,
            ..Self::default()
        }
    }

    pub fn with_max_leaf_size(mut self, size: f32) -> Self {
        self.max_leaf_size = size;
        self
    }

    pub fn with_max_primitives_per_leaf(mut self, count: u32) -> Self {
        self.max_primitives_per_leaf = count;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Whether any subdivision limit is enabled.
    pub fn has_limits(&self) -> bool {
        self.max_leaf_size > 0.0 || self.max_primitives_per_leaf > 0 || self.max_depth > 0
    }

    /// Check the settings and return the normalized copy the builder uses.
    ///
    /// With every limit disabled the mode is forced to [`PartitionMode::None`].
    pub fn validate(&self) -> Result<Self, SettingsError> {
        if !self.max_leaf_size.is_finite() || self.max_leaf_size < 0.0 {
            return Err(SettingsError::InvalidLeafSize(self.max_leaf_size));
        }
        if self.mode == PartitionMode::Quad && self.axis.is_none() {
            return Err(SettingsError::MissingAxis);
        }

        let mut normalized = self.clone();
        if !self.has_limits() {
            normalized.mode = PartitionMode::None;
        }
        Ok(normalized)
    }

    /// World axes that are split, in X, Y, Z order.
    pub fn free_axes(&self) -> &'static [usize] {
        match (self.mode, self.axis) {
            (PartitionMode::None, _) => &[],
            (PartitionMode::Oct, _) => &X_Y_Z[..],
            (PartitionMode::Quad, Some(Axis::X)) => &X_Y_Z[1..],
            (PartitionMode::Quad, Some(Axis::Y)) => &X_Z[..],
            (PartitionMode::Quad, Some(Axis::Z)) => &X_Y_Z[..2],
            (PartitionMode::Quad, None) => &[],
        }
    }

    /// Children per internal node (0 when the mode never subdivides).
    pub fn child_count(&self) -> usize {
        match self.free_axes().len() {
            0 => 0,
            n => 1 << n,
        }
    }
}
