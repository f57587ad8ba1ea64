use super::{BodyKey, FixtureKey, JointKey};

/// Things that happened during a step, in the order they happened.
///
/// Events accumulate in the world until taken out with
/// [`PhysicsWorld::drain_events`][super::PhysicsWorld::drain_events].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    /// A joint exceeded its breakpoint and was disabled.
    JointBroke { joint: JointKey, error: f64 },
    /// Two fixtures started touching.
    ContactBegan {
        fixtures: [FixtureKey; 2],
        bodies: [BodyKey; 2],
    },
    /// Two fixtures stopped touching, or one of them was removed while touching.
    ContactEnded {
        fixtures: [FixtureKey; 2],
        bodies: [BodyKey; 2],
    },
    /// A body entered a fluid.
    FluidEntered { body: BodyKey },
    /// A body left a fluid, or the fluid controller was removed.
    FluidLeft { body: BodyKey },
}
