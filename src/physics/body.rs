use super::{Fixture, FixtureKey};
use crate::math as m;

/// Velocity of a body.
///
// Equivalent to a Vec3 but with names for the translational and rotational part.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Velocity {
    /// Linear velocity of the center of mass in metres per second.
    pub linear: m::Vec2,
    /// Angular velocity in radians per second.
    pub angular: f64,
}

impl Velocity {
    /// Get the linear velocity of a point offset from the center of mass.
    #[inline]
    pub fn point_velocity(&self, offset: m::Vec2) -> m::Vec2 {
        self.linear + m::cross_sv(self.angular, offset)
    }
}

impl std::ops::Add for Velocity {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            linear: self.linear + other.linear,
            angular: self.angular + other.angular,
        }
    }
}

impl std::ops::Mul<f64> for Velocity {
    type Output = Velocity;

    fn mul(self, rhs: f64) -> Self::Output {
        Velocity {
            linear: self.linear * rhs,
            angular: self.angular * rhs,
        }
    }
}

/// How a body moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyType {
    /// Never moves.
    Static,
    /// Moves according to its velocity but is not affected by forces or collisions.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        if mass > 0.0 && mass.is_finite() {
            Mass::Finite {
                mass,
                inverse: 1.0 / mass,
            }
        } else {
            Mass::Infinite
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }

    /// Get the mass, which is infinity if the mass is infinite.
    #[inline]
    pub fn value(&self) -> f64 {
        match self {
            Mass::Finite { mass, .. } => *mass,
            Mass::Infinite => f64::INFINITY,
        }
    }
}

/// A rigid body. Attach fixtures to a body to give it a shape and mass.
///
/// The body's position is its origin, which shapes are placed relative to.
/// Motion is simulated at the center of mass: linear velocity is the velocity of the
/// center of mass and the body rotates around it.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) position: m::Vec2,
    pub(crate) angle: f64,
    pub(crate) velocity: Velocity,
    pub(crate) mass: Mass,
    pub(crate) moment_of_inertia: Mass,
    pub(crate) local_centroid: m::Vec2,
    // center of mass in world space, the point that is integrated
    pub(crate) centroid: m::Vec2,
    mass_override: Option<f64>,
    pub(crate) force: m::Vec2,
    pub(crate) torque: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
    pub gravity_scale: f64,
    pub(crate) fixed_rotation: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) awake: bool,
    pub(crate) sleep_time: f64,
    pub(crate) fixtures: Vec<FixtureKey>,
    pub(crate) disposed: bool,
    // position at the end of the previous step, used to extend fat bounding boxes
    pub(crate) prev_position: m::Vec2,
}

impl Body {
    fn new(body_type: BodyType) -> Self {
        let (mass, moment_of_inertia) = match body_type {
            BodyType::Dynamic => (Mass::from(1.0), Mass::Infinite),
            _ => (Mass::Infinite, Mass::Infinite),
        };
        Self {
            body_type,
            position: m::Vec2::zero(),
            angle: 0.0,
            velocity: Velocity::default(),
            mass,
            moment_of_inertia,
            local_centroid: m::Vec2::zero(),
            centroid: m::Vec2::zero(),
            mass_override: None,
            force: m::Vec2::zero(),
            torque: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            fixed_rotation: false,
            allow_sleep: true,
            awake: true,
            sleep_time: 0.0,
            fixtures: Vec::new(),
            disposed: false,
            prev_position: m::Vec2::zero(),
        }
    }

    /// Dynamic bodies respond to forces and collisions.
    /// Mass and moment of inertia are computed from the attached fixtures.
    pub fn new_dynamic() -> BodyBuilder {
        BodyBuilder::new(BodyType::Dynamic)
    }

    /// Kinematic bodies move with their velocity but are not affected by collision forces.
    pub fn new_kinematic() -> BodyBuilder {
        BodyBuilder::new(BodyType::Kinematic)
    }

    /// Static bodies never move.
    pub fn new_static() -> BodyBuilder {
        BodyBuilder::new(BodyType::Static)
    }

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn position(&self) -> m::Vec2 {
        self.position
    }

    /// Rotation of the body in radians.
    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    #[inline]
    pub fn pose(&self) -> m::Pose {
        m::pose(self.position, self.angle)
    }

    /// Teleport the body. Wakes it up.
    pub fn set_pose(&mut self, position: m::Vec2, angle: f64) {
        self.position = position;
        self.angle = angle;
        self.centroid = self.world_point(self.local_centroid);
        self.wake_up();
    }

    /// Place the origin according to the center of mass and the angle.
    pub(crate) fn sync_origin(&mut self) {
        self.position = self.centroid - m::Rotor2::from_angle(self.angle) * self.local_centroid;
    }

    #[inline]
    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    #[inline]
    pub fn linear_velocity(&self) -> m::Vec2 {
        self.velocity.linear
    }

    #[inline]
    pub fn angular_velocity(&self) -> f64 {
        self.velocity.angular
    }

    /// Set the velocity of the body. Static bodies ignore this.
    pub fn set_velocity(&mut self, velocity: Velocity) {
        if self.body_type == BodyType::Static {
            return;
        }
        self.velocity = velocity;
        if self.fixed_rotation {
            self.velocity.angular = 0.0;
        }
        if velocity != Velocity::default() {
            self.wake_up();
        }
    }

    #[inline]
    pub fn mass(&self) -> Mass {
        self.mass
    }

    /// Moment of inertia about the center of mass.
    #[inline]
    pub fn moment_of_inertia(&self) -> Mass {
        self.moment_of_inertia
    }

    /// Center of mass in local coordinates.
    #[inline]
    pub fn local_centroid(&self) -> m::Vec2 {
        self.local_centroid
    }

    #[inline]
    pub fn world_centroid(&self) -> m::Vec2 {
        self.centroid
    }

    #[inline]
    pub fn fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    /// Fixtures attached to this body in the order they were added.
    #[inline]
    pub fn fixtures(&self) -> &[FixtureKey] {
        &self.fixtures
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Whether the body has been removed and is waiting to be swept out at the next step.
    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    #[inline]
    pub fn is_sleeping_allowed(&self) -> bool {
        self.allow_sleep
    }

    pub fn set_sleeping_allowed(&mut self, allow: bool) {
        self.allow_sleep = allow;
        if !allow {
            self.wake_up();
        }
    }

    pub fn wake_up(&mut self) {
        if self.body_type != BodyType::Static {
            self.awake = true;
            self.sleep_time = 0.0;
        }
    }

    pub(crate) fn put_to_sleep(&mut self) {
        self.awake = false;
        self.sleep_time = 0.0;
        self.velocity = Velocity::default();
        self.force = m::Vec2::zero();
        self.torque = 0.0;
    }

    /// Check whether the body has finite mass or moment of inertia, allowing forces to have an
    /// effect on it.
    #[inline]
    pub fn sees_forces(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    //
    // forces and impulses
    //

    /// Apply a force at the center of mass. Wakes the body.
    pub fn apply_force(&mut self, force: m::Vec2) {
        if !self.sees_forces() {
            return;
        }
        self.wake_up();
        self.force += force;
    }

    /// Apply a force at a point given in world coordinates. Wakes the body.
    pub fn apply_force_at_point(&mut self, force: m::Vec2, point: m::Vec2) {
        if !self.sees_forces() {
            return;
        }
        self.wake_up();
        self.force += force;
        self.torque += m::cross(point - self.centroid, force);
    }

    pub fn apply_torque(&mut self, torque: f64) {
        if !self.sees_forces() {
            return;
        }
        self.wake_up();
        self.torque += torque;
    }

    /// Immediately change the velocity by an impulse applied at the center of mass.
    pub fn apply_linear_impulse(&mut self, impulse: m::Vec2) {
        if !self.sees_forces() {
            return;
        }
        self.wake_up();
        self.velocity.linear += self.mass.inv() * impulse;
    }

    /// Immediately change the velocity by an impulse applied at a point in world coordinates.
    pub fn apply_linear_impulse_at_point(&mut self, impulse: m::Vec2, point: m::Vec2) {
        if !self.sees_forces() {
            return;
        }
        self.wake_up();
        self.velocity.linear += self.mass.inv() * impulse;
        self.velocity.angular +=
            self.moment_of_inertia.inv() * m::cross(point - self.centroid, impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f64) {
        if !self.sees_forces() {
            return;
        }
        self.wake_up();
        self.velocity.angular += self.moment_of_inertia.inv() * impulse;
    }

    //
    // coordinate conversions
    //

    #[inline]
    pub fn world_point(&self, local: m::Vec2) -> m::Vec2 {
        self.pose() * local
    }

    #[inline]
    pub fn local_point(&self, world: m::Vec2) -> m::Vec2 {
        self.pose().inversed() * world
    }

    #[inline]
    pub fn world_vector(&self, local: m::Vec2) -> m::Vec2 {
        m::Rotor2::from_angle(self.angle) * local
    }

    #[inline]
    pub fn local_vector(&self, world: m::Vec2) -> m::Vec2 {
        m::Rotor2::from_angle(-self.angle) * world
    }

    /// Velocity of a point attached to the body, given in world coordinates.
    #[inline]
    pub fn linear_velocity_at_world_point(&self, point: m::Vec2) -> m::Vec2 {
        self.velocity.point_velocity(point - self.centroid)
    }

    #[inline]
    pub fn linear_velocity_at_local_point(&self, point: m::Vec2) -> m::Vec2 {
        self.linear_velocity_at_world_point(self.world_point(point))
    }

    /// Recompute mass properties from the attached fixtures.
    /// The origin stays in place and the center of mass moves.
    pub(crate) fn reset_mass_data<'a>(&mut self, fixtures: impl Iterator<Item = &'a Fixture>) {
        self.local_centroid = m::Vec2::zero();
        if self.body_type != BodyType::Dynamic {
            self.centroid = self.position;
            self.mass = Mass::Infinite;
            self.moment_of_inertia = Mass::Infinite;
            return;
        }

        let mut mass = 0.0;
        let mut inertia = 0.0;
        let mut weighted_centroid = m::Vec2::zero();
        for fixture in fixtures.filter(|f| !f.disposed) {
            let data = fixture.mass_data();
            mass += data.mass;
            inertia += data.inertia;
            weighted_centroid += data.mass * data.centroid;
        }
        if mass > 0.0 {
            self.local_centroid = weighted_centroid / mass;
            // fixture inertias are about the origin, move them to the center of mass
            inertia -= mass * self.local_centroid.mag_sq();
        }
        self.centroid = self.world_point(self.local_centroid);

        match self.mass_override {
            Some(target) if mass > 0.0 => {
                inertia *= target / mass;
                mass = target;
            }
            Some(target) => mass = target,
            // bodies without solid fixtures still need to react to forces somehow
            None if mass <= 0.0 => mass = 1.0,
            None => {}
        }

        self.mass = Mass::from(mass);
        self.moment_of_inertia = if self.fixed_rotation || inertia <= 0.0 {
            Mass::Infinite
        } else {
            Mass::from(inertia)
        };
    }
}

/// A builder to create [`Body`][self::Body]s.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BodyBuilder {
    pub body_type: BodyType,
    pub position: [f64; 2],
    pub angle: f64,
    pub velocity: Velocity,
    pub mass: Option<f64>,
    pub linear_damping: f64,
    pub angular_damping: f64,
    pub gravity_scale: f64,
    pub fixed_rotation: bool,
    pub allow_sleep: bool,
    pub awake: bool,
}

impl Default for BodyBuilder {
    fn default() -> Self {
        Self::new(BodyType::Dynamic)
    }
}

impl BodyBuilder {
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            position: [0.0, 0.0],
            angle: 0.0,
            velocity: Velocity::default(),
            mass: None,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            fixed_rotation: false,
            allow_sleep: true,
            awake: true,
        }
    }

    #[inline]
    pub fn with_position(mut self, pos: impl Into<[f64; 2]>) -> Self {
        self.position = pos.into();
        self
    }

    /// Set the rotation in radians.
    #[inline]
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    #[inline]
    pub fn with_pose(self, pose: m::PoseBuilder) -> Self {
        let pose = pose.build();
        self.with_position(pose.translation)
            .with_angle(m::Angle::from(pose.rotation).rad())
    }

    #[inline]
    pub fn with_velocity(mut self, vel: Velocity) -> Self {
        self.velocity = vel;
        self
    }

    /// Use a fixed mass instead of computing it from fixture densities.
    /// Moment of inertia is scaled to match.
    #[inline]
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = Some(mass);
        self
    }

    #[inline]
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    #[inline]
    pub fn with_gravity_scale(mut self, scale: f64) -> Self {
        self.gravity_scale = scale;
        self
    }

    /// Prevent the body from rotating.
    #[inline]
    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    #[inline]
    pub fn with_sleeping_allowed(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    #[inline]
    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn build(self) -> Body {
        let mut body = Body::new(self.body_type);
        body.position = m::Vec2::new(self.position[0], self.position[1]);
        body.prev_position = body.position;
        body.centroid = body.position;
        body.angle = self.angle;
        if self.body_type != BodyType::Static {
            body.velocity = self.velocity;
            if self.fixed_rotation {
                body.velocity.angular = 0.0;
            }
        }
        body.mass_override = self.mass.filter(|m| *m > 0.0);
        body.linear_damping = self.linear_damping;
        body.angular_damping = self.angular_damping;
        body.gravity_scale = self.gravity_scale;
        body.fixed_rotation = self.fixed_rotation;
        body.allow_sleep = self.allow_sleep;
        body.awake = self.awake && self.body_type != BodyType::Static;
        body.reset_mass_data(std::iter::empty());
        body
    }
}

impl From<BodyBuilder> for Body {
    fn from(b: BodyBuilder) -> Body {
        b.build()
    }
}
