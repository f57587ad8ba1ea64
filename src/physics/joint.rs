//! Joints restrict the relative motion of two bodies,
//! or the motion of a single body in the world.
//!
//! [`JointBuilder`][self::JointBuilder] is the preferred
//! way to create these, but the variant structs have public parameters
//! to allow in-place editing.

use super::{
    solver::{ConstraintRow, Jacobian, SolverBody, SolverStep},
    BodyKey,
};
use crate::math as m;

mod angle_limit;
pub use angle_limit::AngleLimitJoint;
mod distance;
pub use distance::{DistanceJoint, DistanceLimit};
mod friction;
pub use friction::FrictionJoint;
mod gear;
pub use gear::GearJoint;
mod motor;
pub use motor::MotorJoint;
mod prismatic;
pub use prismatic::PrismaticJoint;
mod pulley;
pub use pulley::PulleyJoint;
mod revolute;
pub use revolute::RevoluteJoint;
mod weld;
pub use weld::WeldJoint;
mod wheel;
pub use wheel::{WheelJoint, WheelMotor, WheelSpring};

/// How strongly a joint corrects positional error.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct JointTuning {
    /// Fraction of the positional error corrected per step.
    pub bias_factor: f64,
    /// Makes the joint springy. Zero is fully rigid.
    pub softness: f64,
    /// Error tolerated without any correction.
    pub slop: f64,
}

impl Default for JointTuning {
    fn default() -> Self {
        Self {
            bias_factor: 0.2,
            softness: 0.0,
            slop: 0.005,
        }
    }
}

impl JointTuning {
    /// Baumgarte bias velocity for a signed positional error, ignoring the slop band.
    #[inline]
    pub(crate) fn bias(&self, inv_dt: f64, error: f64) -> f64 {
        let corrected = (error.abs() - self.slop).max(0.0);
        self.bias_factor * inv_dt * corrected.copysign(error)
    }
}

/// Type-specific data of a joint.
#[derive(Clone, Debug)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Weld(WeldJoint),
    Friction(FrictionJoint),
    Motor(MotorJoint),
    Pulley(PulleyJoint),
    Wheel(WheelJoint),
    Gear(GearJoint),
    AngleLimit(AngleLimitJoint),
}

/// A joint between two bodies, or between a body and the world.
///
/// A joint without a second body is fixed: its second anchor is a point in world space.
#[derive(Clone, Debug)]
pub struct Joint {
    pub kind: JointKind,
    bodies: (BodyKey, Option<BodyKey>),
    enabled: bool,
    broken: bool,
    pub(crate) initialized: bool,
    /// The joint breaks when its error exceeds this.
    pub breakpoint: f64,
    pub tuning: JointTuning,
    /// Whether the joined bodies still collide with each other.
    pub collide_connected: bool,
    last_error: f64,
}

impl Joint {
    /// The bodies the joint connects. `None` represents the world.
    #[inline]
    pub fn bodies(&self) -> (BodyKey, Option<BodyKey>) {
        self.bodies
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.bodies.1.is_none()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the joint was disabled by exceeding its breakpoint.
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Turn the joint back on, also after it has broken.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.broken = false;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// The error measured at the start of the last step the joint was solved in.
    #[inline]
    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    #[inline]
    pub(crate) fn involves(&self, body: BodyKey) -> bool {
        self.bodies.0 == body || self.bodies.1 == Some(body)
    }

    #[inline]
    pub(crate) fn connects(&self, a: BodyKey, b: BodyKey) -> bool {
        (self.bodies.0 == a && self.bodies.1 == Some(b))
            || (self.bodies.0 == b && self.bodies.1 == Some(a))
    }

    /// Detach the second body, leaving the second anchor at a point in the world.
    pub(crate) fn set_world_anchor(&mut self, point: m::Vec2) {
        self.bodies.1 = None;
        match &mut self.kind {
            JointKind::Distance(j) => j.local_anchors[1] = point,
            JointKind::Revolute(j) => j.local_anchors[1] = point,
            JointKind::Prismatic(j) => {
                j.local_anchors[1] = point;
                j.reference_angle = None;
            }
            JointKind::Weld(j) => {
                j.local_anchors[1] = point;
                j.reference_angle = None;
            }
            JointKind::Friction(j) => j.local_anchors[1] = point,
            JointKind::Pulley(j) => {
                j.local_anchors[1] = point;
                j.total_length = None;
            }
            JointKind::Wheel(j) => j.local_anchors[1] = point,
            JointKind::Gear(j) => j.constant = None,
            JointKind::Motor(_) | JointKind::AngleLimit(_) => {}
        }
        self.initialized = false;
    }

    /// Fill in rest values that weren't given explicitly from the current body poses.
    pub(crate) fn initialize(&mut self, bodies: &[SolverBody], pair: [usize; 2]) {
        match &mut self.kind {
            JointKind::Prismatic(j) => j.initialize(bodies, pair),
            JointKind::Weld(j) => j.initialize(bodies, pair),
            JointKind::Pulley(j) => j.initialize(bodies, pair),
            JointKind::Gear(j) => j.initialize(bodies, pair),
            _ => {}
        }
        self.initialized = true;
    }

    /// Current positional error of the joint.
    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        match &self.kind {
            JointKind::Distance(j) => j.error(bodies, pair),
            JointKind::Revolute(j) => j.error(bodies, pair),
            JointKind::Prismatic(j) => j.error(bodies, pair),
            JointKind::Weld(j) => j.error(bodies, pair),
            JointKind::Friction(_) | JointKind::Motor(_) => 0.0,
            JointKind::Pulley(j) => j.error(bodies, pair),
            JointKind::Wheel(j) => j.error(bodies, pair),
            JointKind::Gear(j) => j.error(bodies, pair),
            JointKind::AngleLimit(j) => j.error(bodies, pair),
        }
    }

    /// Measure the error and break the joint if it's too large,
    /// then compute mass terms and apply the warm start impulse.
    ///
    /// Returns the error if the joint broke.
    pub(crate) fn pre_step(
        &mut self,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) -> Option<f64> {
        let error = self.error(bodies, pair);
        self.last_error = error;
        if error > self.breakpoint {
            self.enabled = false;
            self.broken = true;
            return Some(error);
        }

        let tuning = &self.tuning;
        match &mut self.kind {
            JointKind::Distance(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Revolute(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Prismatic(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Weld(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Friction(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Motor(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Pulley(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Wheel(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::Gear(j) => j.pre_step(tuning, step, bodies, pair),
            JointKind::AngleLimit(j) => j.pre_step(tuning, step, bodies, pair),
        }
        None
    }

    /// One sequential impulse pass.
    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        match &mut self.kind {
            JointKind::Distance(j) => j.solve(bodies, pair),
            JointKind::Revolute(j) => j.solve(bodies, pair),
            JointKind::Prismatic(j) => j.solve(bodies, pair),
            JointKind::Weld(j) => j.solve(bodies, pair),
            JointKind::Friction(j) => j.solve(bodies, pair),
            JointKind::Motor(j) => j.solve(bodies, pair),
            JointKind::Pulley(j) => j.solve(bodies, pair),
            JointKind::Wheel(j) => j.solve(bodies, pair),
            JointKind::Gear(j) => j.solve(bodies, pair),
            JointKind::AngleLimit(j) => j.solve(bodies, pair),
        }
    }
}

//
// shared machinery
//

/// World positions of two local anchors and their offsets from the centers of mass.
#[inline]
pub(crate) fn world_anchors(
    local: &[m::Vec2; 2],
    bodies: &[SolverBody],
    pair: [usize; 2],
) -> ([m::Vec2; 2], [m::Vec2; 2]) {
    let p = [
        bodies[pair[0]].position + bodies[pair[0]].rotation() * local[0],
        bodies[pair[1]].position + bodies[pair[1]].rotation() * local[1],
    ];
    (p, [p[0] - bodies[pair[0]].centroid, p[1] - bodies[pair[1]].centroid])
}

/// Relative angle of body B with respect to body A.
#[inline]
pub(crate) fn relative_angle(bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
    bodies[pair[1]].angle - bodies[pair[0]].angle
}

/// Keeps two anchor points together, solved as a 2x2 block.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PointConstraint {
    r: [m::Vec2; 2],
    mass: m::Mat22,
    bias: m::Vec2,
    softness: f64,
    pub impulse: m::Vec2,
}

impl Default for PointConstraint {
    fn default() -> Self {
        Self {
            r: [m::Vec2::zero(); 2],
            mass: m::Mat22::zero(),
            bias: m::Vec2::zero(),
            softness: 0.0,
            impulse: m::Vec2::zero(),
        }
    }
}

impl PointConstraint {
    /// Set up for a step. Without `correct_position` only relative velocity is resisted.
    pub fn prepare(
        &mut self,
        local_anchors: &[m::Vec2; 2],
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &[SolverBody],
        pair: [usize; 2],
        correct_position: bool,
    ) {
        let (p, r) = world_anchors(local_anchors, bodies, pair);
        self.r = r;
        let [a, b] = [&bodies[pair[0]], &bodies[pair[1]]];

        let lin = a.inv_mass + b.inv_mass;
        let k1 = m::Mat22::new(m::Vec2::new(lin, 0.0), m::Vec2::new(0.0, lin));
        let k2 = m::Mat22::new(
            m::Vec2::new(a.inv_inertia * r[0].y * r[0].y, -a.inv_inertia * r[0].x * r[0].y),
            m::Vec2::new(-a.inv_inertia * r[0].x * r[0].y, a.inv_inertia * r[0].x * r[0].x),
        );
        let k3 = m::Mat22::new(
            m::Vec2::new(b.inv_inertia * r[1].y * r[1].y, -b.inv_inertia * r[1].x * r[1].y),
            m::Vec2::new(-b.inv_inertia * r[1].x * r[1].y, b.inv_inertia * r[1].x * r[1].x),
        );
        let mut k = k1 + k2 + k3;
        k.col1.x += tuning.softness;
        k.col2.y += tuning.softness;
        self.mass = k.inversed();
        self.softness = tuning.softness;

        self.bias = if correct_position {
            let dp = p[1] - p[0];
            let dist = dp.mag();
            if dist > m::EPSILON {
                -tuning.bias(step.inv_dt, dist) * (dp / dist)
            } else {
                m::Vec2::zero()
            }
        } else {
            m::Vec2::zero()
        };
    }

    pub fn warm_start(&mut self, bodies: &mut [SolverBody], pair: [usize; 2], enabled: bool) {
        if enabled {
            self.apply(bodies, pair, self.impulse);
        } else {
            self.impulse = m::Vec2::zero();
        }
    }

    pub fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        let impulse = self.compute(bodies, pair);
        self.impulse += impulse;
        self.apply(bodies, pair, impulse);
    }

    /// Solve with the accumulated impulse limited in magnitude.
    pub fn solve_clamped(&mut self, bodies: &mut [SolverBody], pair: [usize; 2], max_impulse: f64) {
        let old = self.impulse;
        self.impulse += self.compute(bodies, pair);
        if self.impulse.mag_sq() > max_impulse * max_impulse {
            self.impulse = max_impulse * m::normalize_or_zero(self.impulse);
        }
        self.apply(bodies, pair, self.impulse - old);
    }

    fn compute(&self, bodies: &[SolverBody], pair: [usize; 2]) -> m::Vec2 {
        let dv = bodies[pair[1]].velocity.point_velocity(self.r[1])
            - bodies[pair[0]].velocity.point_velocity(self.r[0]);
        self.mass * (self.bias - dv - self.softness * self.impulse)
    }

    fn apply(&self, bodies: &mut [SolverBody], pair: [usize; 2], impulse: m::Vec2) {
        bodies[pair[0]].apply(-impulse, -m::cross(self.r[0], impulse));
        bodies[pair[1]].apply(impulse, m::cross(self.r[1], impulse));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LimitSide {
    Lower,
    Upper,
}

/// Keeps a scalar measure of the joint within `[lower, upper]`.
///
/// Only the nearer limit is enforced, as a one-sided constraint that lets the value
/// approach the limit exactly within a step and corrects violations beyond the slop.
/// The accumulated impulse is dropped whenever the enforced side flips.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LimitConstraint {
    row: ConstraintRow,
    side: Option<LimitSide>,
}

impl LimitConstraint {
    /// `jacobian` gives the rate of change of `value`.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        &mut self,
        jacobian: Jacobian,
        value: f64,
        (lower, upper): (f64, f64),
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &[SolverBody],
        pair: [usize; 2],
    ) {
        let side = if value - lower < upper - value {
            LimitSide::Lower
        } else {
            LimitSide::Upper
        };
        if self.side != Some(side) {
            self.row.impulse = 0.0;
            self.side = Some(side);
        }

        // distance to the limit, positive when inside
        let (sign, gap) = match side {
            LimitSide::Lower => (1.0, value - lower),
            LimitSide::Upper => (-1.0, upper - value),
        };
        let bias = if gap > 0.0 {
            gap * step.inv_dt
        } else {
            tuning.bias(step.inv_dt, gap)
        };
        self.row.bounds = (0.0, f64::INFINITY);
        self.row
            .prepare(jacobian.scaled(sign), bodies, pair, tuning.softness, bias);
    }

    pub fn warm_start(&mut self, bodies: &mut [SolverBody], pair: [usize; 2], enabled: bool) {
        self.row.warm_start(bodies, pair, enabled);
    }

    pub fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        self.row.solve(bodies, pair);
    }

    /// The accumulated impulse pushing the value back inside, signed along the value.
    pub fn impulse(&self) -> f64 {
        match self.side {
            Some(LimitSide::Upper) => -self.row.impulse,
            _ => self.row.impulse,
        }
    }
}

/// How far a value is outside of `[lower, upper]`.
#[inline]
pub(crate) fn limit_violation(value: f64, (lower, upper): (f64, f64)) -> f64 {
    (lower - value).max(value - upper).max(0.0)
}

//
// builder
//

/// A builder that allows ergonomic construction of different joints.
#[derive(Clone, Copy, Debug)]
pub struct JointBuilder {
    owner: BodyKey,
    target: Option<BodyKey>,
    anchors: [m::Vec2; 2],
    breakpoint: f64,
    tuning: JointTuning,
    collide_connected: bool,
}

impl JointBuilder {
    /// Start building a joint.
    ///
    /// An owning body is required.
    /// If you don't connect the joint to another body with
    /// `with_target`, it will be connected to the world.
    pub fn new(owner: BodyKey) -> Self {
        Self {
            owner,
            target: None,
            anchors: [m::Vec2::zero(); 2],
            breakpoint: f64::INFINITY,
            tuning: JointTuning::default(),
            collide_connected: false,
        }
    }

    /// Attach the joint to another body.
    pub fn with_target(mut self, target: BodyKey) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the anchor point on the owning body in its local coordinates.
    pub fn with_anchor(mut self, point: m::Vec2) -> Self {
        self.anchors[0] = point;
        self
    }

    /// Set the anchor point on the target body in its local coordinates,
    /// or in the world if there is no target.
    pub fn with_target_anchor(mut self, point: m::Vec2) -> Self {
        self.anchors[1] = point;
        self
    }

    /// Break the joint when its error grows larger than this.
    pub fn with_breakpoint(mut self, breakpoint: f64) -> Self {
        self.breakpoint = breakpoint;
        self
    }

    pub fn with_tuning(mut self, tuning: JointTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_bias_factor(mut self, bias_factor: f64) -> Self {
        self.tuning.bias_factor = bias_factor;
        self
    }

    pub fn with_softness(mut self, softness: f64) -> Self {
        self.tuning.softness = softness;
        self
    }

    pub fn with_slop(mut self, slop: f64) -> Self {
        self.tuning.slop = slop;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    /// Keep the anchors at a distance from each other.
    pub fn build_distance(self, length: f64, limit: DistanceLimit) -> Joint {
        let anchors = self.anchors;
        self.build(JointKind::Distance(DistanceJoint::new(anchors, length, limit)))
    }

    /// Keep the anchors together while letting the bodies rotate freely.
    pub fn build_revolute(self) -> Joint {
        let anchors = self.anchors;
        self.build(JointKind::Revolute(RevoluteJoint::new(anchors)))
    }

    /// Let the bodies slide along an axis fixed in the owner's frame, without rotating.
    pub fn build_prismatic(self, local_axis: m::Vec2, limits: Option<(f64, f64)>) -> Joint {
        let anchors = self.anchors;
        self.build(JointKind::Prismatic(PrismaticJoint::new(anchors, local_axis, limits)))
    }

    /// Glue the bodies together.
    pub fn build_weld(self) -> Joint {
        let anchors = self.anchors;
        self.build(JointKind::Weld(WeldJoint::new(anchors)))
    }

    /// Resist relative motion with a limited force and torque.
    pub fn build_friction(self, max_force: f64, max_torque: f64) -> Joint {
        let anchors = self.anchors;
        self.build(JointKind::Friction(FrictionJoint::new(anchors, max_force, max_torque)))
    }

    /// Drive the angular velocity of the owner relative to the target with a limited torque.
    pub fn build_motor(self, speed: f64, max_torque: f64) -> Joint {
        self.build(JointKind::Motor(MotorJoint::new(speed, max_torque)))
    }

    /// Hang the bodies from two ground points so that
    /// `length_a + ratio * length_b` stays constant.
    pub fn build_pulley(self, ground_anchors: [m::Vec2; 2], ratio: f64) -> Joint {
        let anchors = self.anchors;
        self.build(JointKind::Pulley(PulleyJoint::new(anchors, ground_anchors, ratio)))
    }

    /// Keep the target's anchor on a line through the owner's anchor,
    /// with an optional spring along the line and a motor turning the target.
    pub fn build_wheel(
        self,
        local_axis: m::Vec2,
        spring: Option<WheelSpring>,
        motor: Option<WheelMotor>,
    ) -> Joint {
        let anchors = self.anchors;
        self.build(JointKind::Wheel(WheelJoint::new(anchors, local_axis, spring, motor)))
    }

    /// Couple the rotations so that `angle_a + ratio * angle_b` stays constant.
    pub fn build_gear(self, ratio: f64) -> Joint {
        self.build(JointKind::Gear(GearJoint::new(ratio)))
    }

    /// Keep the angle of the owner relative to the target within `[lower, upper]`.
    pub fn build_angle_limit(self, lower: f64, upper: f64) -> Joint {
        self.build(JointKind::AngleLimit(AngleLimitJoint::new(lower, upper)))
    }

    fn build(self, kind: JointKind) -> Joint {
        Joint {
            kind,
            bodies: (self.owner, self.target),
            enabled: true,
            broken: false,
            initialized: false,
            breakpoint: self.breakpoint,
            tuning: self.tuning,
            collide_connected: self.collide_connected,
            last_error: 0.0,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::physics::Velocity;

    pub(crate) fn body_at(position: m::Vec2, angle: f64) -> SolverBody {
        SolverBody {
            position,
            centroid: position,
            angle,
            velocity: Velocity::default(),
            inv_mass: 1.0,
            inv_inertia: 1.0,
        }
    }

    /// Run a joint for some steps with the given bodies, integrating positions like the world does.
    pub(crate) fn simulate(joint: &mut Joint, bodies: &mut [SolverBody], steps: usize) {
        let step = SolverStep::new(1.0 / 60.0, true);
        let pair = [0, bodies.len() - 1];
        if !joint.initialized {
            joint.initialize(bodies, pair);
        }
        for _ in 0..steps {
            if joint.pre_step(&step, bodies, pair).is_none() {
                for _ in 0..10 {
                    joint.solve(bodies, pair);
                }
            }
            for b in bodies.iter_mut() {
                let offset = b.centroid - b.position;
                let rotation = b.velocity.angular * step.dt;
                b.centroid += b.velocity.linear * step.dt;
                b.angle += rotation;
                b.position = b.centroid - m::Rotor2::from_angle(rotation) * offset;
            }
        }
    }

    fn keys<const N: usize>() -> [BodyKey; N] {
        let mut arena = thunderdome::Arena::new();
        [(); N].map(|_| BodyKey(arena.insert(())))
    }

    #[test]
    fn bias_ignores_slop_band() {
        let tuning = JointTuning::default();
        assert_eq!(tuning.bias(60.0, 0.004), 0.0);
        assert!((tuning.bias(60.0, -0.105) + 0.2 * 60.0 * 0.1).abs() < 1e-12);
    }

    #[test]
    fn breaking_disables_until_enabled() {
        let [a] = keys();
        let mut joint = JointBuilder::new(a)
            .with_target_anchor(m::Vec2::new(0.0, 1.0))
            .with_breakpoint(1.0)
            .build_distance(1.0, DistanceLimit::Exact);
        let step = SolverStep::new(1.0 / 60.0, true);
        let mut bodies = [body_at(m::Vec2::new(0.0, -2.0), 0.0), SolverBody::ground()];

        let broke = joint.pre_step(&step, &mut bodies, [0, 1]);
        assert_eq!(broke, Some(2.0));
        assert!(joint.is_broken() && !joint.is_enabled());
        assert_eq!(bodies[0].velocity, Velocity::default());

        joint.enable();
        assert!(joint.is_enabled() && !joint.is_broken());
    }

    #[test]
    fn world_anchor_detaches_target() {
        let [a, b] = keys();
        let mut joint = JointBuilder::new(a).with_target(b).build_weld();
        assert!(joint.connects(b, a));
        assert!(!joint.is_fixed());
        joint.set_world_anchor(m::Vec2::new(3.0, 0.0));
        assert!(joint.is_fixed());
        assert!(!joint.involves(b));
        match &joint.kind {
            JointKind::Weld(w) => assert_eq!(w.local_anchors[1], m::Vec2::new(3.0, 0.0)),
            _ => unreachable!(),
        }
    }
}
