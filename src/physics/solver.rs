//! Sequential impulse solver shared by contacts and joints.
//!
//! Every body taking part in a step gets a [`SolverBody`] in a buffer indexed by
//! the body's arena slot, with one extra static body at the end standing in for
//! the world. Constraints refer to bodies by index into that buffer.

use super::{
    body::{Body, BodyType},
    contact::ContactKey,
    joint::Joint,
    joint_set::JointKey,
    Velocity,
};
use crate::math as m;

use itertools::izip;

/// Parameters of the velocity solver.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SolverParams {
    /// Number of passes over all constraints per step.
    pub iterations: usize,
    /// Fraction of contact penetration corrected per step.
    pub bias_factor: f64,
    /// Penetration allowed without any correction.
    pub slop: f64,
    /// Contacts approaching slower than this don't bounce.
    pub restitution_threshold: f64,
    /// Start each step from the impulses of the previous one.
    pub warm_starting: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            iterations: 10,
            bias_factor: 0.2,
            slop: 0.01,
            restitution_threshold: 1.0,
            warm_starting: true,
        }
    }
}

/// Timing of the step being solved.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverStep {
    pub dt: f64,
    pub inv_dt: f64,
    pub warm_starting: bool,
}

impl SolverStep {
    pub fn new(dt: f64, warm_starting: bool) -> Self {
        Self {
            dt,
            inv_dt: 1.0 / dt,
            warm_starting,
        }
    }
}

/// Working copy of a body's state during the solve.
///
/// Velocities are those of the center of mass, and lever arms are measured from it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverBody {
    pub position: m::Vec2,
    pub centroid: m::Vec2,
    pub angle: f64,
    pub velocity: Velocity,
    pub inv_mass: f64,
    pub inv_inertia: f64,
}

impl SolverBody {
    /// The static world frame that fixed joints attach to.
    pub fn ground() -> Self {
        Self {
            position: m::Vec2::zero(),
            centroid: m::Vec2::zero(),
            angle: 0.0,
            velocity: Velocity::default(),
            inv_mass: 0.0,
            inv_inertia: 0.0,
        }
    }

    /// Sleeping bodies take part as if they were static.
    pub fn from_body(body: &Body) -> Self {
        let mut sb = Self {
            position: body.position,
            centroid: body.centroid,
            angle: body.angle,
            velocity: Velocity::default(),
            inv_mass: 0.0,
            inv_inertia: 0.0,
        };
        match body.body_type {
            BodyType::Dynamic if body.awake => {
                sb.velocity = body.velocity;
                sb.inv_mass = body.mass.inv();
                sb.inv_inertia = body.moment_of_inertia.inv();
            }
            BodyType::Kinematic => sb.velocity = body.velocity,
            _ => {}
        }
        sb
    }

    #[inline]
    pub fn rotation(&self) -> m::Rotor2 {
        m::Rotor2::from_angle(self.angle)
    }

    #[inline]
    pub fn apply(&mut self, linear_impulse: m::Vec2, angular_impulse: f64) {
        self.velocity.linear += self.inv_mass * linear_impulse;
        self.velocity.angular += self.inv_inertia * angular_impulse;
    }
}

/// One row of a constraint Jacobian:
/// `Cdot = dot(linear_a, v_a) + angular_a * w_a + dot(linear_b, v_b) + angular_b * w_b`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Jacobian {
    pub linear: [m::Vec2; 2],
    pub angular: [f64; 2],
}

impl Default for Jacobian {
    fn default() -> Self {
        Self::angular(0.0, 0.0)
    }
}

impl Jacobian {
    /// Relative velocity along `dir` of two points offset by `r` from their bodies.
    #[inline]
    pub fn linear(dir: m::Vec2, r_a: m::Vec2, r_b: m::Vec2) -> Self {
        Self {
            linear: [-dir, dir],
            angular: [-m::cross(r_a, dir), m::cross(r_b, dir)],
        }
    }

    #[inline]
    pub fn angular(a: f64, b: f64) -> Self {
        Self {
            linear: [m::Vec2::zero(); 2],
            angular: [a, b],
        }
    }

    #[inline]
    pub fn scaled(self, s: f64) -> Self {
        Self {
            linear: [s * self.linear[0], s * self.linear[1]],
            angular: [s * self.angular[0], s * self.angular[1]],
        }
    }

    pub fn velocity(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        izip!(&pair, &self.linear, &self.angular)
            .map(|(&b, lin, ang)| lin.dot(bodies[b].velocity.linear) + ang * bodies[b].velocity.angular)
            .sum()
    }

    pub fn inv_effective_mass(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        izip!(&pair, &self.linear, &self.angular)
            .map(|(&b, lin, ang)| bodies[b].inv_mass * lin.mag_sq() + bodies[b].inv_inertia * ang * ang)
            .sum()
    }

    pub fn apply(&self, bodies: &mut [SolverBody], pair: [usize; 2], lambda: f64) {
        for (&b, lin, ang) in izip!(&pair, &self.linear, &self.angular) {
            bodies[b].apply(lambda * *lin, lambda * ang);
        }
    }
}

/// A scalar velocity constraint with an accumulated, optionally bounded impulse.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConstraintRow {
    pub jacobian: Jacobian,
    pub mass: f64,
    pub bias: f64,
    pub softness: f64,
    pub impulse: f64,
    pub bounds: (f64, f64),
}

impl Default for ConstraintRow {
    fn default() -> Self {
        Self {
            jacobian: Jacobian::default(),
            mass: 0.0,
            bias: 0.0,
            softness: 0.0,
            impulse: 0.0,
            bounds: (f64::NEG_INFINITY, f64::INFINITY),
        }
    }
}

impl ConstraintRow {
    /// Set up the row for a step. A positive `bias` drives the constraint velocity negative.
    pub fn prepare(
        &mut self,
        jacobian: Jacobian,
        bodies: &[SolverBody],
        pair: [usize; 2],
        softness: f64,
        bias: f64,
    ) {
        self.jacobian = jacobian;
        let k = jacobian.inv_effective_mass(bodies, pair) + softness;
        self.mass = if k > m::EPSILON { 1.0 / k } else { 0.0 };
        self.softness = softness;
        self.bias = bias;
    }

    pub fn warm_start(&mut self, bodies: &mut [SolverBody], pair: [usize; 2], enabled: bool) {
        if !enabled {
            self.impulse = 0.0;
            return;
        }
        self.impulse = self.impulse.clamp(self.bounds.0, self.bounds.1);
        self.jacobian.apply(bodies, pair, self.impulse);
    }

    pub fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        let cdot = self.jacobian.velocity(bodies, pair);
        let lambda = -self.mass * (cdot + self.bias + self.softness * self.impulse);
        let old = self.impulse;
        self.impulse = (old + lambda).clamp(self.bounds.0, self.bounds.1);
        self.jacobian.apply(bodies, pair, self.impulse - old);
    }
}

//
// contacts
//

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ContactConstraintPoint {
    pub r: [m::Vec2; 2],
    pub separation: f64,
    pub normal_mass: f64,
    pub tangent_mass: f64,
    pub velocity_bias: f64,
    pub normal_impulse: f64,
    pub tangent_impulse: f64,
}

/// A touching contact prepared for solving.
#[derive(Clone, Debug)]
pub(crate) struct ContactConstraint {
    pub key: ContactKey,
    pub pair: [usize; 2],
    pub normal: m::Vec2,
    pub friction: f64,
    pub restitution: f64,
    pub points: [ContactConstraintPoint; 2],
    pub point_count: usize,
}

impl ContactConstraint {
    #[inline]
    pub fn points(&self) -> &[ContactConstraintPoint] {
        &self.points[..self.point_count]
    }
}

#[inline]
fn relative_velocity(bodies: &[SolverBody], pair: [usize; 2], r: [m::Vec2; 2]) -> m::Vec2 {
    bodies[pair[1]].velocity.point_velocity(r[1]) - bodies[pair[0]].velocity.point_velocity(r[0])
}

#[inline]
fn apply_contact_impulse(
    bodies: &mut [SolverBody],
    pair: [usize; 2],
    r: [m::Vec2; 2],
    impulse: m::Vec2,
) {
    bodies[pair[0]].apply(-impulse, -m::cross(r[0], impulse));
    bodies[pair[1]].apply(impulse, m::cross(r[1], impulse));
}

fn prepare_contacts(
    params: &SolverParams,
    step: &SolverStep,
    bodies: &mut [SolverBody],
    contacts: &mut [ContactConstraint],
) {
    let _span = tracy_span!("prepare contacts", "prepare_contacts");

    for contact in contacts.iter_mut() {
        let pair = contact.pair;
        let normal = contact.normal;
        let tangent = m::right_normal(normal);
        let inv_masses = [bodies[pair[0]].inv_mass, bodies[pair[1]].inv_mass];
        let inv_inertias = [bodies[pair[0]].inv_inertia, bodies[pair[1]].inv_inertia];

        for point in &mut contact.points[..contact.point_count] {
            let [r_a, r_b] = point.r;
            let rn = [m::cross(r_a, normal), m::cross(r_b, normal)];
            let k_normal = inv_masses[0]
                + inv_masses[1]
                + inv_inertias[0] * rn[0] * rn[0]
                + inv_inertias[1] * rn[1] * rn[1];
            point.normal_mass = if k_normal > m::EPSILON { 1.0 / k_normal } else { 0.0 };

            let rt = [m::cross(r_a, tangent), m::cross(r_b, tangent)];
            let k_tangent = inv_masses[0]
                + inv_masses[1]
                + inv_inertias[0] * rt[0] * rt[0]
                + inv_inertias[1] * rt[1] * rt[1];
            point.tangent_mass = if k_tangent > m::EPSILON { 1.0 / k_tangent } else { 0.0 };

            let penetration = -point.separation;
            point.velocity_bias =
                params.bias_factor * step.inv_dt * (penetration - params.slop).max(0.0);

            // restitution is measured before warm starting changes the velocities
            let vn = relative_velocity(bodies, pair, point.r).dot(normal);
            if vn < -params.restitution_threshold {
                point.velocity_bias = point.velocity_bias.max(-contact.restitution * vn);
            }
        }

        for point in &mut contact.points[..contact.point_count] {
            if step.warm_starting {
                let impulse = point.normal_impulse * normal + point.tangent_impulse * tangent;
                apply_contact_impulse(bodies, pair, point.r, impulse);
            } else {
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
            }
        }
    }
}

fn solve_contacts(bodies: &mut [SolverBody], contacts: &mut [ContactConstraint]) {
    for contact in contacts.iter_mut() {
        let pair = contact.pair;
        let normal = contact.normal;
        let tangent = m::right_normal(normal);

        for point in &mut contact.points[..contact.point_count] {
            // normal impulse, accumulated value clamped so contacts only push
            let vn = relative_velocity(bodies, pair, point.r).dot(normal);
            let lambda = point.normal_mass * (point.velocity_bias - vn);
            let old = point.normal_impulse;
            point.normal_impulse = (old + lambda).max(0.0);
            apply_contact_impulse(bodies, pair, point.r, (point.normal_impulse - old) * normal);

            // friction bounded by the normal impulse
            let vt = relative_velocity(bodies, pair, point.r).dot(tangent);
            let lambda = -point.tangent_mass * vt;
            let max_friction = contact.friction * point.normal_impulse;
            let old = point.tangent_impulse;
            point.tangent_impulse = (old + lambda).clamp(-max_friction, max_friction);
            apply_contact_impulse(bodies, pair, point.r, (point.tangent_impulse - old) * tangent);
        }
    }
}

//
// joints
//

/// A joint taking part in the solve, with the solver indices of its bodies.
pub(crate) struct ActiveJoint<'a> {
    pub key: JointKey,
    pub joint: &'a mut Joint,
    pub pair: [usize; 2],
}

/// Run the solver over all joints and contacts, joints first.
///
/// Returns the joints that broke during the pre-step, along with their errors.
pub(crate) fn solve(
    params: &SolverParams,
    step: &SolverStep,
    bodies: &mut [SolverBody],
    joints: &mut [ActiveJoint<'_>],
    contacts: &mut [ContactConstraint],
) -> Vec<(JointKey, f64)> {
    let mut broken = Vec::new();

    {
        let _span = tracy_span!("prepare joints", "solve");
        for active in joints.iter_mut() {
            if let Some(error) = active.joint.pre_step(step, bodies, active.pair) {
                broken.push((active.key, error));
            }
        }
    }

    prepare_contacts(params, step, bodies, contacts);

    let _span = tracy_span!("solve constraints", "solve");
    for _iter in 0..params.iterations {
        for active in joints.iter_mut() {
            if active.joint.is_enabled() {
                active.joint.solve(bodies, active.pair);
            }
        }
        solve_contacts(bodies, contacts);
    }

    broken
}
