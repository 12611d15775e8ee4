//! f32 geometric predicates for the Nebula world partitioner.
//!
//! Boxes, triangles, rays and frustums, plus the sphere/box collision tests
//! consumed by physics. Every predicate that needs an epsilon takes an
//! explicit [`Tolerance`] so differently-tuned trees can coexist.

mod aabb;
mod collision;
mod frustum;
mod ray;
mod tolerance;
mod triangle;

pub use aabb::Aabb;
pub use collision::{
    Sphere, SweepHit, aabb_sphere, sphere_plane, sphere_sphere, sweep_aabb_aabb,
    sweep_sphere_sphere,
};
pub use frustum::{Frustum, Intersection};
pub use ray::{Ray, TriangleHit};
pub use tolerance::Tolerance;
pub use triangle::{ProjectionPlane, Triangle};
