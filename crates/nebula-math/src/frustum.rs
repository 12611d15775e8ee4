//! View-frustum tests against points and AABBs.
//!
//! Planes are extracted from a view-projection matrix with the
//! Gribb-Hartmann method for glam's `[0, 1]` clip-space depth.

use glam::{Mat4, Vec3, Vec4};

use crate::Aabb;

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Result of testing an AABB against the frustum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    /// The object is entirely inside the frustum.
    Inside,
    /// The object is entirely outside the frustum.
    Outside,
    /// The object straddles one or more frustum planes.
    Intersecting,
}

/// A view frustum defined by six inward-pointing planes.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    /// Each `Vec4(a, b, c, d)` where `(a,b,c)` is the normalized inward
    /// normal and `d` is the signed distance term.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined view-projection matrix.
    ///
    /// Each plane is a sum or difference of matrix rows:
    /// left `r3 + r0`, right `r3 - r0`, bottom `r3 + r1`, top `r3 - r1`,
    /// near `r2`, far `r3 - r2`.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        Self::from_planes(planes)
    }

    /// Build a frustum from six precomputed `(normal, d)` planes in the
    /// order left, right, bottom, top, near, far. Normals must point inward;
    /// they are normalized here.
    pub fn from_planes(mut planes: [Vec4; 6]) -> Self {
        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }
        Self { planes }
    }

    /// The six normalized planes.
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// A point is inside only if it is on the positive side of all six planes.
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(p) + plane.w >= 0.0)
    }

    /// Test whether an AABB is at least partially inside the frustum.
    ///
    /// Uses the p-vertex (positive vertex) method: for each plane, find
    /// the corner of the AABB furthest along the plane normal. If that
    /// corner is behind the plane, the entire AABB is outside.
    ///
    /// Conservative: may return `true` for some boxes that are fully
    /// outside near frustum corners, never `false` for visible ones.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            normal.dot(positive_vertex(aabb, normal)) + plane.w >= 0.0
        })
    }

    /// Three-way classification using both the p-vertex and n-vertex.
    pub fn classify_aabb(&self, aabb: &Aabb) -> Intersection {
        let mut all_inside = true;
        for plane in &self.planes {
            let normal = plane.truncate();
            if normal.dot(positive_vertex(aabb, normal)) + plane.w < 0.0 {
                return Intersection::Outside;
            }
            if normal.dot(negative_vertex(aabb, normal)) + plane.w < 0.0 {
                all_inside = false;
            }
        }
        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersecting
        }
    }
}

/// Corner of `aabb` furthest along `normal`.
fn positive_vertex(aabb: &Aabb, normal: Vec3) -> Vec3 {
    Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min)
}

/// Corner of `aabb` furthest against `normal`.
fn negative_vertex(aabb: &Aabb, normal: Vec3) -> Vec3 {
    Vec3::select(normal.cmpge(Vec3::ZERO), aabb.min, aabb.max)
}
