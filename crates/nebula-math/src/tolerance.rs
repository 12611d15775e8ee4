//! Epsilons shared by the geometric predicates.

use serde::{Deserialize, Serialize};

/// Tunable epsilons for the geometric predicates.
///
/// Passed into every predicate that needs one instead of living in
/// process-wide state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Slack added around box faces for containment and overlap tests.
    pub tolerance: f32,
    /// Threshold below which a determinant or direction component is
    /// treated as zero (ray/triangle parallelism, ray/slab parallelism).
    pub precision: f32,
}

impl Tolerance {
    /// Exact predicates with no slack at all.
    pub const EXACT: Tolerance = Tolerance {
        tolerance: 0.0,
        precision: f32::EPSILON,
    };

    /// Create a tolerance pair.
    pub fn new(tolerance: f32, precision: f32) -> Self {
        Self {
            tolerance,
            precision,
        }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-4,
            precision: 1.0e-6,
        }
    }
}
