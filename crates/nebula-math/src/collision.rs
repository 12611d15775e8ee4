//! Static and swept collision tests between spheres, planes and AABBs.
//!
//! Swept tests take each shape at `t = 0` plus the displacement it covers by
//! `t = 1`, and report the first time of impact in `[0, 1]` with a contact
//! point at that time.

use glam::{Vec3, Vec4};

use crate::Aabb;

/// A sphere given by center and radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }
}

/// First contact found by a swept test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepHit {
    /// Normalized time of impact in `[0, 1]`.
    pub time: f32,
    /// World-space contact point at `time`.
    pub contact: Vec3,
}

/// Spheres overlap or touch.
pub fn sphere_sphere(a: &Sphere, b: &Sphere) -> bool {
    let r = a.radius + b.radius;
    a.center.distance_squared(b.center) <= r * r
}

/// Sphere touches the plane `(normal, d)`; `normal` must be unit length.
pub fn sphere_plane(sphere: &Sphere, plane: Vec4) -> bool {
    (plane.truncate().dot(sphere.center) + plane.w).abs() <= sphere.radius
}

/// Sphere overlaps the box (closest-point test).
pub fn aabb_sphere(aabb: &Aabb, sphere: &Sphere) -> bool {
    let closest = sphere.center.clamp(aabb.min, aabb.max);
    closest.distance_squared(sphere.center) <= sphere.radius * sphere.radius
}

/// Moving sphere against moving sphere.
///
/// Solves `|s + v t| = ra + rb` for the smallest `t`, where `s` is the
/// center offset at `t = 0` and `v` the relative displacement.
pub fn sweep_sphere_sphere(
    a: &Sphere,
    a_delta: Vec3,
    b: &Sphere,
    b_delta: Vec3,
) -> Option<SweepHit> {
    let s = b.center - a.center;
    let v = b_delta - a_delta;
    let r = a.radius + b.radius;

    let c = s.length_squared() - r * r;
    if c <= 0.0 {
        return Some(SweepHit {
            time: 0.0,
            contact: a.center + s.normalize_or_zero() * a.radius,
        });
    }

    let qa = v.length_squared();
    let qb = 2.0 * s.dot(v);
    if qa <= f32::EPSILON || qb >= 0.0 {
        // Not moving relative to each other, or moving apart.
        return None;
    }

    let disc = qb * qb - 4.0 * qa * c;
    if disc < 0.0 {
        return None;
    }

    let time = (-qb - disc.sqrt()) / (2.0 * qa);
    if !(0.0..=1.0).contains(&time) {
        return None;
    }

    let ca = a.center + a_delta * time;
    let cb = b.center + b_delta * time;
    Some(SweepHit {
        time,
        contact: ca + (cb - ca).normalize_or_zero() * a.radius,
    })
}

/// Moving box against moving box (per-axis entry/exit times).
pub fn sweep_aabb_aabb(a: &Aabb, a_delta: Vec3, b: &Aabb, b_delta: Vec3) -> Option<SweepHit> {
    if let Some(overlap) = a.intersection(b) {
        return Some(SweepHit {
            time: 0.0,
            contact: overlap.center(),
        });
    }

    // Treat `b` as static and move `a` by the relative displacement.
    let v = a_delta - b_delta;
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;

    for axis in 0..3 {
        let (a_min, a_max) = (a.min[axis], a.max[axis]);
        let (b_min, b_max) = (b.min[axis], b.max[axis]);
        let d = v[axis];

        if d == 0.0 {
            if a_max < b_min || a_min > b_max {
                return None;
            }
            continue;
        }

        let (enter, exit) = if d > 0.0 {
            ((b_min - a_max) / d, (b_max - a_min) / d)
        } else {
            ((b_max - a_min) / d, (b_min - a_max) / d)
        };
        t_enter = t_enter.max(enter);
        t_exit = t_exit.min(exit);
    }

    if t_enter > t_exit || !(0.0..=1.0).contains(&t_enter) {
        return None;
    }

    let moved_a = Aabb {
        min: a.min + a_delta * t_enter,
        max: a.max + a_delta * t_enter,
    };
    let moved_b = Aabb {
        min: b.min + b_delta * t_enter,
        max: b.max + b_delta * t_enter,
    };
    let contact = moved_a
        .intersection(&moved_b)
        .map_or_else(|| moved_a.center().lerp(moved_b.center(), 0.5), |o| o.center());

    Some(SweepHit {
        time: t_enter,
        contact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_sphere() {
        let a = Sphere::new(Vec3::ZERO, 1.0);
        assert!(sphere_sphere(&a, &Sphere::new(Vec3::new(1.5, 0.0, 0.0), 1.0)));
        assert!(sphere_sphere(&a, &Sphere::new(Vec3::new(2.0, 0.0, 0.0), 1.0))); // touching
        assert!(!sphere_sphere(&a, &Sphere::new(Vec3::new(3.0, 0.0, 0.0), 1.0)));
    }

    #[test]
    fn test_sphere_plane() {
        let ground = Vec4::new(0.0, 1.0, 0.0, 0.0);
        assert!(sphere_plane(&Sphere::new(Vec3::new(0.0, 0.5, 0.0), 1.0), ground));
        assert!(sphere_plane(&Sphere::new(Vec3::new(0.0, -0.5, 0.0), 1.0), ground));
        assert!(!sphere_plane(&Sphere::new(Vec3::new(0.0, 3.0, 0.0), 1.0), ground));
    }

    #[test]
    fn test_aabb_sphere() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb_sphere(&aabb, &Sphere::new(Vec3::splat(0.5), 0.1)));
        assert!(aabb_sphere(&aabb, &Sphere::new(Vec3::new(1.5, 0.5, 0.5), 0.6)));
        // Near the corner: inside the bounding box of the sphere but not the sphere.
        assert!(!aabb_sphere(&aabb, &Sphere::new(Vec3::splat(1.5), 0.8)));
    }

    #[test]
    fn test_sweep_spheres_head_on() {
        let a = Sphere::new(Vec3::ZERO, 1.0);
        let b = Sphere::new(Vec3::new(10.0, 0.0, 0.0), 1.0);
        let hit = sweep_sphere_sphere(&a, Vec3::new(10.0, 0.0, 0.0), &b, Vec3::ZERO).unwrap();
        // Contact when centers are 2 apart: a has moved 8 of 10.
        assert!((hit.time - 0.8).abs() < 1e-5);
        assert!((hit.contact - Vec3::new(9.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_sweep_spheres_miss() {
        let a = Sphere::new(Vec3::ZERO, 1.0);
        let b = Sphere::new(Vec3::new(10.0, 5.0, 0.0), 1.0);
        assert!(sweep_sphere_sphere(&a, Vec3::new(10.0, 0.0, 0.0), &b, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_sweep_spheres_too_short() {
        let a = Sphere::new(Vec3::ZERO, 1.0);
        let b = Sphere::new(Vec3::new(10.0, 0.0, 0.0), 1.0);
        assert!(sweep_sphere_sphere(&a, Vec3::new(5.0, 0.0, 0.0), &b, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_sweep_spheres_initially_overlapping() {
        let a = Sphere::new(Vec3::ZERO, 1.0);
        let b = Sphere::new(Vec3::new(1.0, 0.0, 0.0), 1.0);
        let hit = sweep_sphere_sphere(&a, Vec3::ZERO, &b, Vec3::ZERO).unwrap();
        assert_eq!(hit.time, 0.0);
    }

    #[test]
    fn test_sweep_aabbs() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 1.0, 1.0));
        let hit = sweep_aabb_aabb(&a, Vec3::new(8.0, 0.0, 0.0), &b, Vec3::ZERO).unwrap();
        assert!((hit.time - 0.5).abs() < 1e-6);
        assert!((hit.contact.x - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_sweep_aabbs_both_moving() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 1.0, 1.0));
        let hit = sweep_aabb_aabb(&a, Vec3::new(4.0, 0.0, 0.0), &b, Vec3::new(-4.0, 0.0, 0.0))
            .unwrap();
        assert!((hit.time - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sweep_aabbs_parallel_miss() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(5.0, 3.0, 0.0), Vec3::new(6.0, 4.0, 1.0));
        assert!(sweep_aabb_aabb(&a, Vec3::new(8.0, 0.0, 0.0), &b, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_sweep_aabbs_initial_overlap() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(2.0));
        let hit = sweep_aabb_aabb(&a, Vec3::ZERO, &b, Vec3::ZERO).unwrap();
        assert_eq!(hit.time, 0.0);
        assert_eq!(hit.contact, Vec3::splat(0.75));
    }
}
