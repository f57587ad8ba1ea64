use super::{
    limit_violation, relative_angle, world_anchors, JointTuning, LimitConstraint,
};
use crate::{
    math as m,
    physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep},
};

/// Lets two bodies slide along an axis fixed in the first body's frame
/// while keeping their relative rotation locked.
#[derive(Clone, Debug)]
pub struct PrismaticJoint {
    pub local_anchors: [m::Vec2; 2],
    /// Unit axis of motion in the first body's local coordinates.
    pub local_axis: m::Vec2,
    /// Taken from the bodies when the joint enters the world if not set.
    pub reference_angle: Option<f64>,
    /// Optional lower and upper bounds for the translation along the axis.
    pub limits: Option<(f64, f64)>,
    perpendicular: ConstraintRow,
    angular: ConstraintRow,
    limit: LimitConstraint,
}

/// Position of the second anchor relative to the first, and the axis in world space.
struct Frame {
    r: [m::Vec2; 2],
    d: m::Vec2,
    axis: m::Vec2,
}

impl PrismaticJoint {
    pub(crate) fn new(
        local_anchors: [m::Vec2; 2],
        local_axis: m::Vec2,
        limits: Option<(f64, f64)>,
    ) -> Self {
        let local_axis = match m::normalize_or_zero(local_axis) {
            axis if axis == m::Vec2::zero() => m::Vec2::unit_x(),
            axis => axis,
        };
        Self {
            local_anchors,
            local_axis,
            reference_angle: None,
            limits: limits.map(|(a, b)| (a.min(b), a.max(b))),
            perpendicular: ConstraintRow::default(),
            angular: ConstraintRow::default(),
            limit: LimitConstraint::default(),
        }
    }

    pub(crate) fn initialize(&mut self, bodies: &[SolverBody], pair: [usize; 2]) {
        if self.reference_angle.is_none() {
            self.reference_angle = Some(relative_angle(bodies, pair));
        }
    }

    fn frame(&self, bodies: &[SolverBody], pair: [usize; 2]) -> Frame {
        let (p, r) = world_anchors(&self.local_anchors, bodies, pair);
        Frame {
            r,
            d: p[1] - p[0],
            axis: bodies[pair[0]].rotation() * self.local_axis,
        }
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        let f = self.frame(bodies, pair);
        let perp = m::left_normal(f.axis).dot(f.d).abs();
        let angle =
            (relative_angle(bodies, pair) - self.reference_angle.unwrap_or(0.0)).abs();
        let limit = self
            .limits
            .map(|l| limit_violation(f.axis.dot(f.d), l))
            .unwrap_or(0.0);
        perp.max(angle).max(limit)
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        let f = self.frame(bodies, pair);
        let perp = m::left_normal(f.axis);
        // the first body's anchor arm reaches to the second anchor, since the axis turns with it
        let arm_a = f.d + f.r[0];

        self.perpendicular.prepare(
            Jacobian::linear(perp, arm_a, f.r[1]),
            bodies,
            pair,
            tuning.softness,
            tuning.bias(step.inv_dt, perp.dot(f.d)),
        );
        let angle_error = relative_angle(bodies, pair) - self.reference_angle.unwrap_or(0.0);
        self.angular.prepare(
            Jacobian::angular(-1.0, 1.0),
            bodies,
            pair,
            tuning.softness,
            tuning.bias(step.inv_dt, angle_error),
        );
        if let Some(limits) = self.limits {
            self.limit.prepare(
                Jacobian::linear(f.axis, arm_a, f.r[1]),
                f.axis.dot(f.d),
                limits,
                tuning,
                step,
                bodies,
                pair,
            );
            self.limit.warm_start(bodies, pair, step.warm_starting);
        }

        self.perpendicular
            .warm_start(bodies, pair, step.warm_starting);
        self.angular.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        if self.limits.is_some() {
            self.limit.solve(bodies, pair);
        }
        self.perpendicular.solve(bodies, pair);
        self.angular.solve(bodies, pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{
        joint::{
            tests::{body_at, simulate},
            JointBuilder,
        },
        BodyKey,
    };

    #[test]
    fn slides_along_axis_within_limits() {
        let mut arena = thunderdome::Arena::new();
        let mut joint = JointBuilder::new(BodyKey(arena.insert(())))
            .build_prismatic(m::Vec2::new(1.0, 0.0), Some((-1.0, 1.0)));
        let mut bodies = [body_at(m::Vec2::zero(), 0.0), SolverBody::ground()];
        bodies[0].velocity.linear = m::Vec2::new(2.0, 1.0);
        bodies[0].velocity.angular = 1.0;

        simulate(&mut joint, &mut bodies, 20);
        // sideways motion and rotation are removed, motion along the axis remains
        assert!(bodies[0].position.y.abs() < 0.01);
        assert!(bodies[0].angle.abs() < 0.01);
        assert!(bodies[0].position.x > 0.5);

        simulate(&mut joint, &mut bodies, 60);
        // the ground anchor sits at the world origin, so the translation is minus the position
        assert!(bodies[0].position.x <= 1.0 + 0.01, "x = {}", bodies[0].position.x);
        assert!(bodies[0].velocity.linear.x.abs() < 1e-6);
        assert!(joint.error(&bodies, [0, 1]) < 0.01);
    }
}
