//! Shapes and the algorithms that find out whether and how they touch.

mod aabb;
pub use aabb::{ray_aabb, Ray, AABB};

pub mod broadphase;
pub use broadphase::{BroadPhase, BruteForce, FatAabbParams, PairUpdate, ProxyKey, ProxyOwner, SweepAndPrune};

pub mod manifold;
pub use manifold::{
    get_point_states, ContactId, Feature, Manifold, ManifoldKind, ManifoldPoint, PointState,
};

pub mod narrowphase;
pub use narrowphase::collide;

pub mod query;

pub mod shape;
pub use shape::{
    Chain, Circle, Edge, MassData, Polygon, Shape, ShapeChild, DEFAULT_POLYGON_SKIN,
    MAX_POLYGON_VERTICES,
};
