//! Triangle primitives and their classification against boxes.
//!
//! [`Triangle::intersects_aabb_approx`] is deliberately approximate: it runs a
//! 2D separating-axis test on each of the three principal-plane projections
//! and reports an intersection only if all three overlap. A triangle whose
//! plane slices past a box corner can overlap the box in every projection
//! without touching it in 3D, so the test can report a few false positives.
//! It never misses a real intersection. Callers accept those false
//! positives as a few duplicated primitives.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::{Aabb, Tolerance};

/// A triangle given by its three corners.
///
/// Lines and points are represented as degenerate triangles
/// (`[a, b, b]` and `[a, a, a]`), which classify the same way as the
/// segment or point they stand for.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Build a triangle from the 1, 2 or 3 vertices of a point, line or
    /// triangle primitive. Returns `None` for an empty slice.
    pub fn from_primitive(vertices: &[Vec3]) -> Option<Self> {
        match *vertices {
            [a] => Some(Self::new(a, a, a)),
            [a, b] => Some(Self::new(a, b, b)),
            [a, b, c, ..] => Some(Self::new(a, b, c)),
            [] => None,
        }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.a, self.b, self.c]
    }

    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: self.a.min(self.b).min(self.c),
            max: self.a.max(self.b).max(self.c),
        }
    }

    /// Exact containment: all three vertices lie inside the box. The box
    /// boundary counts as inside, widened by `tol.tolerance`.
    pub fn contained_by(&self, aabb: &Aabb, tol: &Tolerance) -> bool {
        self.vertices()
            .iter()
            .all(|v| aabb.contains_point_within(*v, tol.tolerance))
    }

    /// Approximate box/triangle overlap. See the module docs for the
    /// accepted imprecision.
    pub fn intersects_aabb_approx(&self, aabb: &Aabb, tol: &Tolerance) -> bool {
        ProjectionPlane::ALL
            .iter()
            .all(|plane| plane.projections_overlap(self, aabb, tol.tolerance))
    }
}

/// One of the three principal planes a shape can be projected onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionPlane {
    Xy,
    Xz,
    Yz,
}

impl ProjectionPlane {
    pub const ALL: [ProjectionPlane; 3] = [Self::Xy, Self::Xz, Self::Yz];

    /// Indices of the two world axes spanning this plane.
    pub fn axes(self) -> (usize, usize) {
        match self {
            Self::Xy => (0, 1),
            Self::Xz => (0, 2),
            Self::Yz => (1, 2),
        }
    }

    /// Drop the third coordinate of `p`.
    pub fn project(self, p: Vec3) -> Vec2 {
        let (u, v) = self.axes();
        Vec2::new(p[u], p[v])
    }

    /// 2D separating-axis test between the projected triangle and the
    /// projected box. Candidate axes are the box's two edge normals and the
    /// triangle's three edge normals.
    fn projections_overlap(self, tri: &Triangle, aabb: &Aabb, slack: f32) -> bool {
        let t = tri.vertices().map(|v| self.project(v));
        let lo = self.project(aabb.min);
        let hi = self.project(aabb.max);
        let rect = [lo, Vec2::new(hi.x, lo.y), hi, Vec2::new(lo.x, hi.y)];

        let axes = [
            Vec2::X,
            Vec2::Y,
            (t[1] - t[0]).perp(),
            (t[2] - t[1]).perp(),
            (t[0] - t[2]).perp(),
        ];

        axes.iter().all(|axis| {
            let (t_min, t_max) = interval(&t, *axis);
            let (r_min, r_max) = interval(&rect, *axis);
            let pad = slack * axis.length();
            t_min <= r_max + pad && r_min <= t_max + pad
        })
    }
}

/// Extreme projections of `points` along `axis`.
fn interval(points: &[Vec2], axis: Vec2) -> (f32, f32) {
    points.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}
