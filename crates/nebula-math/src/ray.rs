//! Rays and their intersection with boxes and triangles.

use glam::Vec3;

use crate::{Aabb, Tolerance, Triangle};

/// A half-line from `origin` along a normalized `direction`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// Result of a successful ray/triangle test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    /// Barycentric weight of the triangle's second vertex.
    pub u: f32,
    /// Barycentric weight of the triangle's third vertex.
    pub v: f32,
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
}

impl Ray {
    /// Create a ray. `direction` is normalized; a zero direction yields a
    /// ray that hits nothing.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Slab test. Returns the entry distance (0 when the origin is inside),
    /// or `None` when the box is missed or lies behind the origin.
    pub fn intersect_aabb(&self, aabb: &Aabb, tol: &Tolerance) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let o = self.origin[axis];
            let d = self.direction[axis];
            let lo = aabb.min[axis] - tol.tolerance;
            let hi = aabb.max[axis] + tol.tolerance;

            if d.abs() < tol.precision {
                // Parallel to this slab: must already be between its planes.
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let (t0, t1) = {
                let a = (lo - o) * inv;
                let b = (hi - o) * inv;
                if a <= b { (a, b) } else { (b, a) }
            };
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return None;
            }
        }

        Some(t_min)
    }

    /// Möller–Trumbore ray/triangle intersection. Both faces are hit;
    /// hits behind the origin are rejected.
    pub fn intersect_triangle(&self, tri: &Triangle, tol: &Tolerance) -> Option<TriangleHit> {
        let e1 = tri.b - tri.a;
        let e2 = tri.c - tri.a;
        let p = self.direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() < tol.precision {
            return None;
        }

        let inv_det = 1.0 / det;
        let t_vec = self.origin - tri.a;
        let u = t_vec.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = t_vec.cross(e1);
        let v = self.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let distance = e2.dot(q) * inv_det;
        if distance < 0.0 {
            return None;
        }

        Some(TriangleHit { u, v, distance })
    }
}
