/// Open a Tracy profiling span that lasts until the returned value is dropped.
/// Does nothing unless the `tracy` feature is on and a profiler is connected.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {
        tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0))
    };
}

pub mod error;
pub use error::{PhysicsError, ShapeError};

pub mod math;
pub use math::{uv, Angle, Pose, PoseBuilder, Rotor2, Unit, Vec2};

pub mod physics;
pub use physics::{
    collision::{self, BroadPhase, BruteForce, Ray, Shape, SweepAndPrune, AABB},
    forcefield, joint, Body, BodyBuilder, BodyKey, BodyType, CollisionFilter, Contact,
    ContactFilter, ContactKey, Controller, ControllerKey, Event, Fixture, FixtureBuilder,
    FixtureKey, Joint, JointBuilder, JointKey, Mass, Material, MixPolicy, PhysicsWorld, RayHit,
    SleepParams, SolverParams, StepDiagnostics, TimestepScaling, Velocity, WorldParams,
};
